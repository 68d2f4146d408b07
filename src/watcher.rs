use crate::dom::{Document, MutationRecord, NodeId, ObserverId};
use crate::engine::{Disposition, TextSink};
use std::rc::Rc;
use tracing::{debug, trace};

/// Subscription to a document's structural changes.
///
/// Only inserted nodes matter here: character data changes are ignored, which
/// keeps the engine's own text writes from being fed back to it.
pub struct DomWatcher {
    document: Document,
    observer: Option<ObserverId>,
}

impl DomWatcher {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            observer: None,
        }
    }

    /// Start forwarding inserted text to `sink`. Does nothing if already started.
    pub fn start<S: TextSink + 'static>(&mut self, sink: S) {
        if self.observer.is_some() {
            return;
        }

        let sink = Rc::new(sink);
        let id = self.document.observe(Rc::new(move |document: &Document, records: &[MutationRecord]| {
            for record in records {
                if let MutationRecord::ChildList { added, .. } = record {
                    for &node in added {
                        offer_subtree(document, sink.as_ref(), node);
                    }
                }
            }
        }));

        debug!("Watching document for inserted text");
        self.observer = Some(id);
    }

    /// Stop watching. Returns `false` if the watcher was not running.
    pub fn stop(&mut self) -> bool {
        match self.observer.take() {
            Some(id) => {
                debug!("Stopped watching document");
                self.document.disconnect(id)
            }
            None => false,
        }
    }

    pub fn is_observing(&self) -> bool {
        self.observer.is_some()
    }
}

impl Drop for DomWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn offer_subtree<S: TextSink + ?Sized>(document: &Document, sink: &S, node: NodeId) {
    // A node can be inserted and removed again before the record is seen.
    if !document.is_attached(node) {
        trace!("Ignoring detached node {}", node);
        return;
    }

    let targets = if document.is_text(node) {
        vec![node]
    } else {
        document.text_nodes_under(node)
    };

    for text in targets {
        let disposition = sink.offer(text);
        if disposition != Disposition::Queued {
            trace!("{} -> {:?}", text, disposition);
        }
    }
}
