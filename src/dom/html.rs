use crate::dom::{Document, NodeId, NodeKind};
use crate::error::Result;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

/// Parse an HTML string into a new [`Document`].
pub fn parse_html(input: &str) -> Result<Document> {
    let dom: RcDom = parse_document(RcDom::default(), Default::default()).one(input);

    let document = Document::new();
    copy_children(&document, document.root(), &dom.document)?;
    Ok(document)
}

fn copy_children(document: &Document, parent: NodeId, handle: &Handle) -> Result<()> {
    for child in handle.children.borrow().iter() {
        let id = match child.data {
            NodeData::Doctype { ref name, .. } => document.create_doctype(name),
            NodeData::Text { ref contents } => document.create_text(&contents.borrow()),
            NodeData::Comment { ref contents } => document.create_comment(contents),
            NodeData::Element {
                ref name,
                ref attrs,
                ..
            } => {
                let attrs = attrs
                    .borrow()
                    .iter()
                    .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                    .collect();
                document.create_element_with_attrs(&name.local, attrs)
            }
            NodeData::Document | NodeData::ProcessingInstruction { .. } => continue,
        };

        document.append_child(parent, id)?;
        copy_children(document, id, child)?;
    }
    Ok(())
}

/// Serialize the whole document as HTML.
pub fn to_html(document: &Document) -> String {
    let mut out = String::new();
    for child in document.children(document.root()) {
        write_node(document, child, false, &mut out);
    }
    out
}

fn write_node(document: &Document, node: NodeId, raw_text: bool, out: &mut String) {
    let Some(kind) = document.kind(node) else {
        return;
    };

    match kind {
        NodeKind::Document => {
            for child in document.children(node) {
                write_node(document, child, false, out);
            }
        }
        NodeKind::Doctype(name) => {
            out.push_str(&format!("<!DOCTYPE {}>", name));
        }
        NodeKind::Comment(text) => {
            out.push_str(&format!("<!--{}-->", text));
        }
        NodeKind::Text(text) => {
            if raw_text {
                out.push_str(&text);
            } else {
                out.push_str(&escape_text(&text));
            }
        }
        NodeKind::Element { name, attrs } => {
            out.push('<');
            out.push_str(&name);
            for (attr, value) in &attrs {
                out.push_str(&format!(" {}=\"{}\"", attr, escape_attr(value)));
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&name.as_str()) {
                return;
            }

            let raw = RAW_TEXT_ELEMENTS.contains(&name.as_str());
            for child in document.children(node) {
                write_node(document, child, raw, out);
            }
            out.push_str(&format!("</{}>", name));
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('\u{a0}', "&nbsp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('\u{a0}', "&nbsp;")
        .replace('"', "&quot;")
}
