//! Document Abstraction
//!
//! The hiding engine works against [`Document`], implemented by the live
//! browser DOM in the wasm bindings and by [`PageTree`] everywhere else.

#[cfg(feature = "html")]
mod parse;
pub mod selector;
mod tree;

#[cfg(feature = "html")]
pub use parse::parse_html;
pub use selector::{SelectorError, SelectorList};
pub use tree::{NodeId, PageTree, ToastState};

/// A text node seen by the tree walker, with its parent element.
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode<E> {
    pub text: String,
    pub parent: Option<E>,
}

/// DOM operations the engine and the page session need.
pub trait Document {
    /// Handle to an element.
    type Element: Clone + PartialEq;

    /// All elements matching `selector`, in document order.
    fn query_selector_all(&self, selector: &str) -> Result<Vec<Self::Element>, SelectorError>;

    /// Nearest ancestor-or-self whose `role` attribute equals `role`.
    fn closest_with_role(&self, element: &Self::Element, role: &str) -> Option<Self::Element>;

    fn parent_element(&self, element: &Self::Element) -> Option<Self::Element>;

    /// Rendered text of the element.
    fn inner_text(&self, element: &Self::Element) -> String;

    /// Every text node under the body, depth-first in document order.
    fn text_nodes(&self) -> Vec<TextNode<Self::Element>>;

    /// True if the element carries the hidden marker.
    fn has_marker(&self, element: &Self::Element) -> bool;

    /// True if the element carries the marker or an inline `display: none`.
    fn is_hidden(&self, element: &Self::Element) -> bool;

    /// Set `display: none` and the hidden marker.
    fn hide(&mut self, element: &Self::Element);

    /// Clear the display override and the hidden marker.
    fn unhide(&mut self, element: &Self::Element);

    /// Every element currently carrying the hidden marker.
    fn marked_elements(&self) -> Vec<Self::Element>;

    /// Add or remove a class on the body element.
    fn set_body_class(&mut self, class: &str, present: bool);

    fn show_toast(&mut self, message: &str);

    /// Start the toast's fade-out.
    fn fade_toast(&mut self);

    fn remove_toast(&mut self);
}
