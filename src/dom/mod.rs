//! In-memory live document with structural change notification.
//!
//! Nodes live in an arena owned by the [`Document`]; everything else refers
//! to them by [`NodeId`], which never keeps a node alive or moves ownership.
//! Observers registered with [`Document::observe`] receive mutation records
//! after the document has released its internal borrow, so a callback may
//! freely read or mutate the document again.

pub mod html;

use crate::error::{Result, TranslateError};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Doctype(String),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// Children were inserted into or removed from `target`.
    ChildList {
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    /// The content of text or comment node `target` changed.
    CharacterData { target: NodeId },
}

pub type MutationCallback = Rc<dyn Fn(&Document, &[MutationRecord])>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

struct Tree {
    nodes: Vec<Node>,
    observers: Vec<(ObserverId, MutationCallback)>,
    next_observer: u64,
}

impl Tree {
    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| TranslateError::Document(format!("unknown node {}", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| TranslateError::Document(format!("unknown node {}", id)))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(node.0).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(id.0)?.parent.take()?;
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.retain(|&c| c != id);
        }
        Some(parent)
    }
}

/// Shared handle to a live document tree. Clones refer to the same tree.
#[derive(Clone)]
pub struct Document {
    tree: Rc<RefCell<Tree>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.tree.borrow();
        f.debug_struct("Document")
            .field("nodes", &tree.nodes.len())
            .field("observers", &tree.observers.len())
            .finish()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut tree = Tree {
            nodes: Vec::new(),
            observers: Vec::new(),
            next_observer: 0,
        };
        tree.push(NodeKind::Document);
        Self {
            tree: Rc::new(RefCell::new(tree)),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn create_element(&self, name: &str) -> NodeId {
        self.create_element_with_attrs(name, Vec::new())
    }

    pub fn create_element_with_attrs(&self, name: &str, attrs: Vec<(String, String)>) -> NodeId {
        self.tree.borrow_mut().push(NodeKind::Element {
            name: name.to_ascii_lowercase(),
            attrs,
        })
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.tree.borrow_mut().push(NodeKind::Text(text.to_string()))
    }

    pub fn create_comment(&self, text: &str) -> NodeId {
        self.tree.borrow_mut().push(NodeKind::Comment(text.to_string()))
    }

    pub fn create_doctype(&self, name: &str) -> NodeId {
        self.tree.borrow_mut().push(NodeKind::Doctype(name.to_string()))
    }

    /// Append `child` as the last child of `parent`, moving it if it is
    /// already attached elsewhere.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let mut records = Vec::new();
        {
            let mut tree = self.tree.borrow_mut();
            match tree.node(parent)?.kind {
                NodeKind::Document | NodeKind::Element { .. } => {}
                _ => {
                    return Err(TranslateError::Document(format!(
                        "node {} cannot have children",
                        parent
                    )))
                }
            }
            tree.node(child)?;
            if tree.is_ancestor(child, parent) {
                return Err(TranslateError::Document(format!(
                    "appending {} to {} would create a cycle",
                    child, parent
                )));
            }

            if let Some(old_parent) = tree.detach(child) {
                records.push(MutationRecord::ChildList {
                    target: old_parent,
                    added: Vec::new(),
                    removed: vec![child],
                });
            }
            tree.node_mut(child)?.parent = Some(parent);
            tree.node_mut(parent)?.children.push(child);
            records.push(MutationRecord::ChildList {
                target: parent,
                added: vec![child],
                removed: Vec::new(),
            });
        }
        self.notify(&records);
        Ok(())
    }

    /// Detach `node` from its parent. Its subtree stays intact.
    pub fn remove(&self, node: NodeId) -> Result<()> {
        let parent = {
            let mut tree = self.tree.borrow_mut();
            tree.node(node)?;
            tree.detach(node)
        };
        if let Some(target) = parent {
            self.notify(&[MutationRecord::ChildList {
                target,
                added: Vec::new(),
                removed: vec![node],
            }]);
        }
        Ok(())
    }

    /// Replace the content of a text or comment node.
    pub fn set_text(&self, node: NodeId, text: &str) -> Result<()> {
        {
            let mut tree = self.tree.borrow_mut();
            match tree.node_mut(node)?.kind {
                NodeKind::Text(ref mut content) | NodeKind::Comment(ref mut content) => {
                    *content = text.to_string();
                }
                _ => {
                    return Err(TranslateError::Document(format!(
                        "node {} does not carry text",
                        node
                    )))
                }
            }
        }
        self.notify(&[MutationRecord::CharacterData { target: node }]);
        Ok(())
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.tree.borrow().nodes.get(node.0).map(|n| n.kind.clone())
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.kind(node), Some(NodeKind::Text(_)))
    }

    /// Content of a text node.
    pub fn text(&self, node: NodeId) -> Option<String> {
        match self.tree.borrow().nodes.get(node.0)?.kind {
            NodeKind::Text(ref text) => Some(text.clone()),
            _ => None,
        }
    }

    /// Lowercase tag name of an element.
    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        match self.tree.borrow().nodes.get(node.0)?.kind {
            NodeKind::Element { ref name, .. } => Some(name.clone()),
            _ => None,
        }
    }

    pub fn attribute(&self, node: NodeId, attr: &str) -> Option<String> {
        match self.tree.borrow().nodes.get(node.0)?.kind {
            NodeKind::Element { ref attrs, .. } => attrs
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(attr))
                .map(|(_, value)| value.clone()),
            _ => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.borrow().nodes.get(node.0)?.parent
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .borrow()
            .nodes
            .get(node.0)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Whether `node` is connected to the document root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        let tree = self.tree.borrow();
        tree.nodes.get(node.0).is_some() && tree.is_ancestor(self.root(), node)
    }

    /// All text nodes in the subtree of `node`, in document order.
    pub fn text_nodes_under(&self, node: NodeId) -> Vec<NodeId> {
        self.descendants(node)
            .into_iter()
            .filter(|&id| self.is_text(id))
            .collect()
    }

    /// `node` and its descendants in document (pre-)order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let tree = self.tree.borrow();
        let mut out = Vec::new();
        if tree.nodes.get(node.0).is_none() {
            return out;
        }

        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(tree.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    /// Concatenated text of all text nodes under `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        self.text_nodes_under(node)
            .into_iter()
            .filter_map(|id| self.text(id))
            .collect()
    }

    /// First element with the given tag name, in document order.
    pub fn find_element(&self, name: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&id| self.tag_name(id).is_some_and(|tag| tag.eq_ignore_ascii_case(name)))
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&node| self.attribute(node, "id").as_deref() == Some(id))
    }

    /// Register a callback for every subsequent mutation of this document.
    pub fn observe(&self, callback: MutationCallback) -> ObserverId {
        let mut tree = self.tree.borrow_mut();
        let id = ObserverId(tree.next_observer);
        tree.next_observer += 1;
        tree.observers.push((id, callback));
        id
    }

    pub fn disconnect(&self, observer: ObserverId) -> bool {
        let mut tree = self.tree.borrow_mut();
        let before = tree.observers.len();
        tree.observers.retain(|(id, _)| *id != observer);
        tree.observers.len() != before
    }

    fn notify(&self, records: &[MutationRecord]) {
        if records.is_empty() {
            return;
        }
        let callbacks: Vec<MutationCallback> = self
            .tree
            .borrow()
            .observers
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(self, records);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn sample() -> (Document, NodeId, NodeId) {
        let doc = Document::new();
        let html = doc.create_element("HTML");
        let body = doc.create_element("body");
        doc.append_child(doc.root(), html).unwrap();
        doc.append_child(html, body).unwrap();
        (doc, html, body)
    }

    #[test]
    fn test_tree_building() {
        let (doc, html, body) = sample();
        let p = doc.create_element("p");
        let text = doc.create_text("Hello");
        doc.append_child(body, p).unwrap();
        doc.append_child(p, text).unwrap();

        assert_eq!(doc.tag_name(html).as_deref(), Some("html"));
        assert_eq!(doc.parent(text), Some(p));
        assert_eq!(doc.children(body), vec![p]);
        assert!(doc.is_attached(text));
        assert_eq!(doc.text_content(body), "Hello");
        assert_eq!(doc.find_element("P"), Some(p));
    }

    #[test]
    fn test_text_nodes_in_document_order() {
        let (doc, _, body) = sample();
        let a = doc.create_text("a");
        let div = doc.create_element("div");
        let b = doc.create_text("b");
        let c = doc.create_text("c");
        doc.append_child(body, a).unwrap();
        doc.append_child(body, div).unwrap();
        doc.append_child(div, b).unwrap();
        doc.append_child(body, c).unwrap();

        assert_eq!(doc.text_nodes_under(doc.root()), vec![a, b, c]);
    }

    #[test]
    fn test_append_rejects_text_parent_and_cycles() {
        let (doc, html, body) = sample();
        let text = doc.create_text("x");
        assert!(doc.append_child(text, doc.create_text("y")).is_err());
        assert!(doc.append_child(body, html).is_err());
        assert!(doc.append_child(body, body).is_err());
    }

    #[test]
    fn test_set_text_only_on_character_data() {
        let (doc, _, body) = sample();
        let text = doc.create_text("before");
        doc.append_child(body, text).unwrap();

        doc.set_text(text, "after").unwrap();
        assert_eq!(doc.text(text).as_deref(), Some("after"));
        assert!(doc.set_text(body, "nope").is_err());
    }

    #[test]
    fn test_remove_detaches_subtree() {
        let (doc, _, body) = sample();
        let p = doc.create_element("p");
        let text = doc.create_text("gone");
        doc.append_child(body, p).unwrap();
        doc.append_child(p, text).unwrap();

        doc.remove(p).unwrap();
        assert!(!doc.is_attached(text));
        assert_eq!(doc.parent(text), Some(p));
        assert!(doc.children(body).is_empty());
    }

    #[test]
    fn test_observers_receive_records() {
        let (doc, _, body) = sample();
        let seen: Rc<RefCell<Vec<MutationRecord>>> = Rc::default();

        let sink = Rc::clone(&seen);
        let observer = doc.observe(Rc::new(move |_: &Document, records: &[MutationRecord]| {
            sink.borrow_mut().extend_from_slice(records);
        }));

        let text = doc.create_text("Hi");
        doc.append_child(body, text).unwrap();
        doc.set_text(text, "Hey").unwrap();

        assert!(doc.disconnect(observer));
        doc.append_child(body, doc.create_text("unseen")).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                MutationRecord::ChildList {
                    target: body,
                    added: vec![text],
                    removed: vec![],
                },
                MutationRecord::CharacterData { target: text },
            ]
        );
    }

    #[test]
    fn test_callback_may_mutate_document() {
        let (doc, _, body) = sample();
        doc.observe(Rc::new(|doc: &Document, records: &[MutationRecord]| {
            for record in records {
                if let MutationRecord::ChildList { added, .. } = record {
                    for &node in added {
                        if doc.text(node).as_deref() == Some("Hello") {
                            doc.set_text(node, "Сайн байна уу").unwrap();
                        }
                    }
                }
            }
        }));

        let text = doc.create_text("Hello");
        doc.append_child(body, text).unwrap();
        assert_eq!(doc.text(text).as_deref(), Some("Сайн байна уу"));
    }
}
