// Shared page handle: a document behind a lock plus an event broadcast,
// standing in for the mutation observer, click and history events.

use super::{Document, NodeId};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

/// What changed on a mutated node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Children were added or removed
    ChildList,
    /// An attribute or inline style was written
    Attributes,
}

/// Event emitted by the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Mutation { target: NodeId, kind: MutationKind },
    Click { target: NodeId },
    /// History navigation back (leaving a detail view)
    PopState,
}

/// Cloneable handle to a live page
#[derive(Clone)]
pub struct Page {
    doc: Arc<RwLock<Document>>,
    events: broadcast::Sender<PageEvent>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Document::new())
    }
}

impl Page {
    pub fn new(doc: Document) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            doc: Arc::new(RwLock::new(doc)),
            events,
        }
    }

    /// Subscribe to page events. Dropping the receiver detaches the subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    /// Read access to the document
    pub fn read(&self) -> RwLockReadGuard<'_, Document> {
        // Poisoning is ignored; writers never leave the arena half-linked
        self.doc.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Document> {
        self.doc.write().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: PageEvent) {
        // No subscribers is the normal state while idle
        let _ = self.events.send(event);
    }

    /// Run a batch of edits, then notify a single child-list mutation on `target`
    pub fn mutate<R>(&self, target: NodeId, edit: impl FnOnce(&mut Document) -> R) -> R {
        let result = {
            let mut doc = self.write();
            edit(&mut doc)
        };
        self.emit(PageEvent::Mutation {
            target,
            kind: MutationKind::ChildList,
        });
        result
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> bool {
        let appended = self.write().append_child(parent, child);
        if appended {
            self.emit(PageEvent::Mutation {
                target: parent,
                kind: MutationKind::ChildList,
            });
        }
        appended
    }

    pub fn remove(&self, id: NodeId) -> bool {
        let parent = self.write().remove(id);
        if let Some(parent) = parent {
            self.emit(PageEvent::Mutation {
                target: parent,
                kind: MutationKind::ChildList,
            });
        }
        parent.is_some()
    }

    /// Write an inline style property; notifies only when the value changed
    pub fn set_style(&self, id: NodeId, property: &str, value: &str) -> bool {
        let changed = self.write().set_style(id, property, value);
        if changed {
            self.emit(PageEvent::Mutation {
                target: id,
                kind: MutationKind::Attributes,
            });
        }
        changed
    }

    /// Clear an inline style property; notifies only when it was set
    pub fn remove_style(&self, id: NodeId, property: &str) -> bool {
        let removed = self.write().remove_style(id, property);
        if removed {
            self.emit(PageEvent::Mutation {
                target: id,
                kind: MutationKind::Attributes,
            });
        }
        removed
    }

    pub fn click(&self, target: NodeId) {
        self.emit(PageEvent::Click { target });
    }

    pub fn pop_state(&self) {
        self.emit(PageEvent::PopState);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let page = Page::default();
        let mut rx = page.subscribe();

        let root = page.read().root();
        let div = page.mutate(root, |doc| {
            let div = doc.create_element("div", &[]);
            doc.append_child(root, div);
            div
        });
        page.set_style(div, "color", "red");
        page.set_style(div, "color", "red");
        page.pop_state();

        assert_eq!(
            rx.recv().await.unwrap(),
            PageEvent::Mutation {
                target: root,
                kind: MutationKind::ChildList
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            PageEvent::Mutation {
                target: div,
                kind: MutationKind::Attributes
            }
        );
        // Second identical style write is silent
        assert_eq!(rx.recv().await.unwrap(), PageEvent::PopState);
    }

    #[tokio::test]
    async fn test_remove_style_notifies_once() {
        let page = Page::default();
        let root = page.read().root();
        let div = page.mutate(root, |doc| {
            let div = doc.create_element("div", &[]);
            doc.append_child(root, div);
            div
        });
        page.set_style(div, "display", "none");

        let mut rx = page.subscribe();
        assert!(page.remove_style(div, "display"));
        assert!(!page.remove_style(div, "display"));
        assert_eq!(
            rx.recv().await.unwrap(),
            PageEvent::Mutation {
                target: div,
                kind: MutationKind::Attributes
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remove_stale_handle() {
        let page = Page::default();
        let root = page.read().root();
        let div = page.mutate(root, |doc| {
            let div = doc.create_element("div", &[]);
            doc.append_child(root, div);
            div
        });
        assert!(page.remove(div));
        assert!(!page.remove(div));
    }
}
