//! HTML5 parsing into a [`PageTree`] using html5ever.

use std::io;

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

use super::tree::{NodeData, NodeId, PageTree};

/// Parse a saved page. The result always has a body element.
pub fn parse_html(html: &str) -> Result<PageTree, io::Error> {
    let dom: RcDom = parse_document(RcDom::default(), ParseOpts::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())?;

    let mut tree = PageTree::with_document();
    let root = tree.root();
    convert_node(&mut tree, &dom.document, root);
    tree.locate_body();
    Ok(tree)
}

fn convert_node(tree: &mut PageTree, rc_node: &Handle, parent: NodeId) {
    match &rc_node.data {
        RcNodeData::Document => {
            for child in rc_node.children.borrow().iter() {
                convert_node(tree, child, parent);
            }
        }

        RcNodeData::Doctype { .. } | RcNodeData::ProcessingInstruction { .. } => {}

        RcNodeData::Text { contents } => {
            let text = contents.borrow().to_string();
            // Whitespace between tags never matches a rule.
            if text.trim().is_empty() {
                return;
            }
            tree.append_node(parent, NodeData::Text(text));
        }

        RcNodeData::Comment { contents } => {
            tree.append_node(parent, NodeData::Comment(contents.to_string()));
        }

        RcNodeData::Element { name, attrs, .. } => {
            let attrs = attrs
                .borrow()
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect();
            let node = tree.append_node(
                parent,
                NodeData::Element {
                    tag: name.local.to_string(),
                    attrs,
                },
            );
            for child in rc_node.children.borrow().iter() {
                convert_node(tree, child, node);
            }
        }
    }
}
