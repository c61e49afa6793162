use crate::element::AIElementRecord;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Immutable view of the index at one point in time.
pub type Snapshot = Arc<Vec<AIElementRecord>>;

/// The current set of discovered elements.
///
/// Every update builds a fresh vector and swaps it in under the write lock, so
/// a reader holding a [`Snapshot`] never sees a half-applied update.
#[derive(Debug, Default)]
pub struct ElementIndex {
    current: RwLock<Snapshot>,
}

impl ElementIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elements(elements: Vec<AIElementRecord>) -> Self {
        Self {
            current: RwLock::new(Arc::new(elements)),
        }
    }

    /// The elements as of now. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Snapshot {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the whole index.
    pub fn replace(&self, elements: Vec<AIElementRecord>) {
        debug!(count = elements.len(), "Replacing element index");
        self.swap(Arc::new(elements));
    }

    /// Insert or replace a single element by id, keeping its position.
    pub fn upsert(&self, element: AIElementRecord) {
        self.modify(|elements| {
            match elements.iter_mut().find(|e| e.id == element.id) {
                Some(slot) => *slot = element,
                None => elements.push(element),
            }
            true
        });
    }

    /// Remove an element by id. Returns whether anything was removed.
    pub fn remove(&self, id: &str) -> bool {
        self.modify(|elements| {
            let before = elements.len();
            elements.retain(|e| e.id != id);
            elements.len() != before
        })
    }

    pub fn get(&self, id: &str) -> Option<AIElementRecord> {
        self.snapshot().iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn swap(&self, next: Snapshot) {
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Copy-on-write edit under the write lock.
    /// The new snapshot is published only when `edit` returns true.
    fn modify(&self, edit: impl FnOnce(&mut Vec<AIElementRecord>) -> bool) -> bool {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = guard.as_ref().clone();
        let changed = edit(&mut next);
        if changed {
            *guard = Arc::new(next);
        }
        changed
    }
}
