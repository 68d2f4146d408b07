use crate::dom::NodeId;
use std::collections::HashMap;

/// One distinct text waiting for translation, with every node that shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUnit {
    /// Trimmed text as it was when first offered.
    pub text: String,
    pub nodes: Vec<NodeId>,
}

/// Units collected since the last drain, deduplicated by text.
#[derive(Debug, Default)]
pub struct PendingQueue {
    units: Vec<PendingUnit>,
    by_text: HashMap<String, usize>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `node` under `text`. Returns `false` if the text was already
    /// pending and the node joined the existing unit.
    pub fn push(&mut self, text: &str, node: NodeId) -> bool {
        if let Some(&slot) = self.by_text.get(text) {
            let unit = &mut self.units[slot];
            if !unit.nodes.contains(&node) {
                unit.nodes.push(node);
            }
            return false;
        }

        self.by_text.insert(text.to_string(), self.units.len());
        self.units.push(PendingUnit {
            text: text.to_string(),
            nodes: vec![node],
        });
        true
    }

    /// Take every pending unit, leaving an empty queue behind.
    pub fn take(&mut self) -> Vec<PendingUnit> {
        self.by_text.clear();
        std::mem::take(&mut self.units)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
