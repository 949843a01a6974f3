//! In-memory page tree
//!
//! Arena-backed DOM used off the browser: by the CLI (after parsing a saved
//! page) and by tests. Detached nodes stay in the arena but are unreachable
//! from the document root.

use super::selector::{ElementAdapter, SelectorList};
use super::{Document, SelectorError, TextNode};
use crate::config::{
    HIDDEN_MARKER_ATTR, TOAST_CONTENT_CLASS, TOAST_ELEMENT_ID, TOAST_HIDE_CLASS, TOAST_SHOW_CLASS,
};

/// Index of a node in a [`PageTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeData {
    Document,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Visible state of the protection toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToastState {
    Showing(String),
    Fading(String),
}

/// Elements whose text is never rendered.
const NON_RENDERED: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Clone)]
pub struct PageTree {
    nodes: Vec<Node>,
    body: NodeId,
}

impl Default for PageTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PageTree {
    /// An empty `html > (head, body)` document.
    pub fn new() -> Self {
        let mut tree = Self::with_document();
        let html = tree.append_element(tree.root(), "html", &[]);
        tree.append_element(html, "head", &[]);
        tree.body = tree.append_element(html, "body", &[]);
        tree
    }

    /// Only the document node; the parser fills in the rest.
    pub(crate) fn with_document() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            body: NodeId(0),
        }
    }

    /// Point `body` at the first `<body>` element, creating one if missing.
    pub(crate) fn locate_body(&mut self) {
        if let Some(body) = self
            .descendants(self.root())
            .into_iter()
            .find(|&id| self.tag_name(id) == Some("body"))
        {
            self.body = body;
            return;
        }
        let parent = self
            .descendants(self.root())
            .into_iter()
            .find(|&id| self.tag_name(id) == Some("html"))
            .unwrap_or(self.root());
        self.body = self.append_element(parent, "body", &[]);
    }

    pub(crate) fn append_node(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    // =========================================================================
    // Building
    // =========================================================================

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Append a new element under `parent`. Tag and attribute names are
    /// lowercased.
    pub fn append_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.append_node(
            parent,
            NodeData::Element {
                tag: tag.to_ascii_lowercase(),
                attrs: attrs
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                    .collect(),
            },
        )
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.append_node(parent, NodeData::Text(text.to_string()))
    }

    pub fn append_comment(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.append_node(parent, NodeData::Comment(text.to_string()))
    }

    /// Detach a node (and its subtree) from its parent.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&child| child != id);
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(id.0).map(|n| &n.data),
            Some(NodeData::Element { .. })
        )
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id.0)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(id.0)?.data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(NodeData::Element { attrs, .. }) = self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            match attrs.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(NodeData::Element { attrs, .. }) = self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            attrs.retain(|(k, _)| k != name);
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attribute(id, "class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }

    fn set_class(&mut self, id: NodeId, class: &str, present: bool) {
        let mut classes: Vec<String> = self
            .attribute(id, "class")
            .map(|c| c.split_ascii_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let had = classes.iter().any(|c| c == class);
        match (had, present) {
            (false, true) => classes.push(class.to_string()),
            (true, false) => classes.retain(|c| c != class),
            _ => return,
        }
        if classes.is_empty() {
            self.remove_attribute(id, "class");
        } else {
            self.set_attribute(id, "class", &classes.join(" "));
        }
    }

    /// Value of one inline style property.
    pub fn style_property(&self, id: NodeId, name: &str) -> Option<String> {
        parse_style(self.attribute(id, "style")?)
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    fn set_style_property(&mut self, id: NodeId, name: &str, value: Option<&str>) {
        let mut decls = self
            .attribute(id, "style")
            .map(parse_style)
            .unwrap_or_default();
        decls.retain(|(k, _)| k != name);
        if let Some(value) = value {
            decls.push((name.to_string(), value.to_string()));
        }
        if decls.is_empty() {
            self.remove_attribute(id, "style");
        } else {
            let style = decls
                .iter()
                .map(|(k, v)| format!("{}: {};", k, v))
                .collect::<Vec<_>>()
                .join(" ");
            self.set_attribute(id, "style", &style);
        }
    }

    /// Attached descendants of `id`, depth-first in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Attached descendant elements of the document.
    pub fn elements(&self) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|&id| self.is_element(id))
            .collect()
    }

    pub fn element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|&id| self.attribute(id, "id") == Some(element_id))
    }

    /// Concatenated text of every text node under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(NodeData::Text(text)) = self.nodes.get(id.0).map(|n| &n.data) {
            out.push_str(text);
        }
        for node in self.descendants(id) {
            if let NodeData::Text(text) = &self.nodes[node.0].data {
                out.push_str(text);
            }
        }
        out
    }

    fn collect_rendered_text(&self, id: NodeId, out: &mut String) {
        for &child in self.children(id) {
            match &self.nodes[child.0].data {
                NodeData::Text(text) => out.push_str(text),
                NodeData::Element { tag, .. } => {
                    if NON_RENDERED.contains(&tag.as_str()) || self.has_display_none(child) {
                        continue;
                    }
                    self.collect_rendered_text(child, out);
                }
                _ => {}
            }
        }
    }

    fn has_display_none(&self, id: NodeId) -> bool {
        self.style_property(id, "display").as_deref() == Some("none")
    }

    /// Current toast, if one is attached.
    pub fn toast(&self) -> Option<ToastState> {
        let id = self.element_by_id(TOAST_ELEMENT_ID)?;
        let message = self.text_content(id);
        if self.has_class(id, TOAST_HIDE_CLASS) {
            Some(ToastState::Fading(message))
        } else {
            Some(ToastState::Showing(message))
        }
    }
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return None;
            }
            Some((name, value.trim().to_string()))
        })
        .collect()
}

impl ElementAdapter for PageTree {
    type Handle = NodeId;

    fn parent(&self, element: NodeId) -> Option<NodeId> {
        self.parent(element).filter(|&p| self.is_element(p))
    }

    fn tag_name(&self, element: NodeId) -> &str {
        PageTree::tag_name(self, element).unwrap_or("")
    }

    fn attr(&self, element: NodeId, name: &str) -> Option<&str> {
        self.attribute(element, name)
    }
}

impl Document for PageTree {
    type Element = NodeId;

    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        let list = SelectorList::parse(selector)?;
        Ok(self
            .elements()
            .into_iter()
            .filter(|&id| list.matches(self, id))
            .collect())
    }

    fn closest_with_role(&self, element: &NodeId, role: &str) -> Option<NodeId> {
        let mut current = Some(*element);
        while let Some(id) = current.filter(|&id| self.is_element(id)) {
            if self.attribute(id, "role") == Some(role) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    fn parent_element(&self, element: &NodeId) -> Option<NodeId> {
        ElementAdapter::parent(self, *element)
    }

    fn inner_text(&self, element: &NodeId) -> String {
        let mut out = String::new();
        self.collect_rendered_text(*element, &mut out);
        out
    }

    fn text_nodes(&self) -> Vec<TextNode<NodeId>> {
        self.descendants(self.body)
            .into_iter()
            .filter_map(|id| match &self.nodes[id.0].data {
                NodeData::Text(text) => Some(TextNode {
                    text: text.clone(),
                    parent: self.parent(id).filter(|&p| self.is_element(p)),
                }),
                _ => None,
            })
            .collect()
    }

    fn has_marker(&self, element: &NodeId) -> bool {
        self.attribute(*element, HIDDEN_MARKER_ATTR).is_some()
    }

    fn is_hidden(&self, element: &NodeId) -> bool {
        self.has_marker(element) || self.has_display_none(*element)
    }

    fn hide(&mut self, element: &NodeId) {
        self.set_style_property(*element, "display", Some("none"));
        self.set_attribute(*element, HIDDEN_MARKER_ATTR, "true");
    }

    fn unhide(&mut self, element: &NodeId) {
        self.set_style_property(*element, "display", None);
        self.remove_attribute(*element, HIDDEN_MARKER_ATTR);
    }

    fn marked_elements(&self) -> Vec<NodeId> {
        self.elements()
            .into_iter()
            .filter(|id| self.has_marker(id))
            .collect()
    }

    fn set_body_class(&mut self, class: &str, present: bool) {
        let body = self.body;
        self.set_class(body, class, present);
    }

    fn show_toast(&mut self, message: &str) {
        if self.element_by_id(TOAST_ELEMENT_ID).is_some() {
            return;
        }
        let body = self.body;
        let toast = self.append_element(
            body,
            "div",
            &[("id", TOAST_ELEMENT_ID), ("class", TOAST_SHOW_CLASS)],
        );
        let content = self.append_element(toast, "div", &[("class", TOAST_CONTENT_CLASS)]);
        let span = self.append_element(content, "span", &[]);
        self.append_text(span, message);
    }

    fn fade_toast(&mut self) {
        if let Some(toast) = self.element_by_id(TOAST_ELEMENT_ID) {
            self.set_class(toast, TOAST_SHOW_CLASS, false);
            self.set_class(toast, TOAST_HIDE_CLASS, true);
        }
    }

    fn remove_toast(&mut self) {
        if let Some(toast) = self.element_by_id(TOAST_ELEMENT_ID) {
            self.remove(toast);
        }
    }
}
