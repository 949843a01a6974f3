//! Live DOM behind the [`Document`] trait.

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, HtmlElement};

use ps_core::config::{
    HIDDEN_MARKER_ATTR, TOAST_CONTENT_CLASS, TOAST_ELEMENT_ID, TOAST_HIDE_CLASS, TOAST_SHOW_CLASS,
};
use ps_core::dom::{Document, SelectorError, TextNode};

use crate::bridge::describe;

/// `NodeFilter.SHOW_TEXT`
const SHOW_TEXT: u32 = 0x4;

pub struct WebDocument {
    document: web_sys::Document,
}

impl WebDocument {
    pub fn new(document: web_sys::Document) -> Self {
        Self { document }
    }

    pub fn body(&self) -> Option<HtmlElement> {
        self.document.body()
    }

    fn toast(&self) -> Option<Element> {
        self.document.get_element_by_id(TOAST_ELEMENT_ID)
    }

    fn create(&self, tag: &str) -> Option<Element> {
        self.document.create_element(tag).ok()
    }
}

fn style_display(element: &Element) -> Option<String> {
    element
        .dyn_ref::<HtmlElement>()
        .and_then(|html| html.style().get_property_value("display").ok())
}

impl Document for WebDocument {
    type Element = Element;

    fn query_selector_all(&self, selector: &str) -> Result<Vec<Element>, SelectorError> {
        if selector.trim().is_empty() {
            return Err(SelectorError::Empty);
        }
        let list = self
            .document
            .query_selector_all(selector)
            .map_err(|e| SelectorError::Rejected {
                selector: selector.to_string(),
                message: describe(&e),
            })?;
        Ok((0..list.length())
            .filter_map(|i| list.item(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect())
    }

    fn closest_with_role(&self, element: &Element, role: &str) -> Option<Element> {
        element
            .closest(&format!("[role=\"{}\"]", role))
            .ok()
            .flatten()
    }

    fn parent_element(&self, element: &Element) -> Option<Element> {
        element.parent_element()
    }

    fn inner_text(&self, element: &Element) -> String {
        match element.dyn_ref::<HtmlElement>() {
            Some(html) => html.inner_text(),
            None => element.text_content().unwrap_or_default(),
        }
    }

    fn text_nodes(&self) -> Vec<TextNode<Element>> {
        let Some(body) = self.document.body() else {
            return Vec::new();
        };
        let walker = match self.document.create_tree_walker_with_what_to_show(&body, SHOW_TEXT) {
            Ok(walker) => walker,
            Err(e) => {
                log::warn!("Failed to walk text nodes: {}", describe(&e));
                return Vec::new();
            }
        };

        let mut nodes = Vec::new();
        while let Ok(Some(node)) = walker.next_node() {
            let text = node.text_content().unwrap_or_default();
            if text.trim().is_empty() {
                continue;
            }
            nodes.push(TextNode {
                text,
                parent: node.parent_element(),
            });
        }
        nodes
    }

    fn has_marker(&self, element: &Element) -> bool {
        element.has_attribute(HIDDEN_MARKER_ATTR)
    }

    fn is_hidden(&self, element: &Element) -> bool {
        self.has_marker(element) || style_display(element).as_deref() == Some("none")
    }

    fn hide(&mut self, element: &Element) {
        if let Some(html) = element.dyn_ref::<HtmlElement>() {
            let _ = html.style().set_property("display", "none");
        }
        let _ = element.set_attribute(HIDDEN_MARKER_ATTR, "true");
    }

    fn unhide(&mut self, element: &Element) {
        if let Some(html) = element.dyn_ref::<HtmlElement>() {
            let _ = html.style().remove_property("display");
        }
        let _ = element.remove_attribute(HIDDEN_MARKER_ATTR);
    }

    fn marked_elements(&self) -> Vec<Element> {
        self.query_selector_all(&format!("[{}]", HIDDEN_MARKER_ATTR))
            .unwrap_or_default()
    }

    fn set_body_class(&mut self, class: &str, present: bool) {
        if let Some(body) = self.document.body() {
            let classes = body.class_list();
            let _ = if present {
                classes.add_1(class)
            } else {
                classes.remove_1(class)
            };
        }
    }

    fn show_toast(&mut self, message: &str) {
        let (Some(body), Some(toast), Some(content), Some(label)) = (
            self.document.body(),
            self.create("div"),
            self.create("div"),
            self.create("span"),
        ) else {
            return;
        };
        toast.set_id(TOAST_ELEMENT_ID);
        content.set_class_name(TOAST_CONTENT_CLASS);
        label.set_text_content(Some(message));
        let _ = content.append_child(&label);
        let _ = toast.append_child(&content);
        if body.append_child(&toast).is_err() {
            return;
        }

        // Add the show class on the next frame so the transition runs.
        let shown = toast.clone();
        let reveal = Closure::once_into_js(move || {
            let _ = shown.class_list().add_1(TOAST_SHOW_CLASS);
        });
        let scheduled = web_sys::window()
            .map(|window| window.request_animation_frame(reveal.unchecked_ref()).is_ok())
            .unwrap_or(false);
        if !scheduled {
            let _ = toast.class_list().add_1(TOAST_SHOW_CLASS);
        }
    }

    fn fade_toast(&mut self) {
        if let Some(toast) = self.toast() {
            let classes = toast.class_list();
            let _ = classes.remove_1(TOAST_SHOW_CLASS);
            let _ = classes.add_1(TOAST_HIDE_CLASS);
        }
    }

    fn remove_toast(&mut self) {
        if let Some(toast) = self.toast() {
            toast.remove();
        }
    }
}
