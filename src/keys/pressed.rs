//! Ordered, de-duplicated set of currently held keys.

use super::identity::KeyId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Held {
    /// Ids in press order
    order: Vec<KeyId>,
    /// Label for every id in `order`
    labels: HashMap<KeyId, String>,
}

impl Held {
    fn apply(&mut self, change: KeyChange) -> bool {
        match change {
            KeyChange::Press(id, label) => {
                if self.labels.contains_key(&id) {
                    return false;
                }
                self.order.push(id.clone());
                self.labels.insert(id, label);
                true
            }
            KeyChange::Release(id) => {
                if self.labels.remove(&id).is_none() {
                    return false;
                }
                self.order.retain(|k| k != &id);
                true
            }
            KeyChange::Clear => {
                if self.order.is_empty() {
                    return false;
                }
                self.order.clear();
                self.labels.clear();
                true
            }
        }
    }

    fn snapshot(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|id| self.labels.get(id).cloned().unwrap_or_else(|| "?".to_string()))
            .collect()
    }
}

/// One mutation of the held-key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChange {
    Press(KeyId, String),
    Release(KeyId),
    Clear,
}

/// The live "currently held keys" state.
///
/// Both the press order and the label map sit behind one mutex so they can
/// never disagree: every id in the order has a label and vice versa.
#[derive(Debug, Default)]
pub struct PressedKeySet {
    inner: Mutex<Held>,
}

impl PressedKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Held> {
        // A panic elsewhere cannot leave `Held` half-updated, so a poisoned
        // lock is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `change` and, if the set changed, pass the new snapshot to
    /// `on_change` before the lock is released.
    ///
    /// Callers that publish snapshots do it from `on_change`, so snapshots
    /// from different threads are published in the order they were taken.
    pub fn apply_then(&self, change: KeyChange, on_change: impl FnOnce(Vec<String>)) -> bool {
        let mut held = self.lock();
        if !held.apply(change) {
            return false;
        }
        on_change(held.snapshot());
        true
    }

    /// Record a key press. Returns `false` for a key that is already held,
    /// which is how OS auto-repeat is absorbed.
    pub fn press(&self, id: KeyId, label: impl Into<String>) -> bool {
        self.lock().apply(KeyChange::Press(id, label.into()))
    }

    /// Record a key release. Returns `false` if the key was not held.
    pub fn release(&self, id: &KeyId) -> bool {
        self.lock().apply(KeyChange::Release(id.clone()))
    }

    /// Drop every held key. Returns `true` only if something was held.
    pub fn clear(&self) -> bool {
        self.lock().apply(KeyChange::Clear)
    }

    /// Labels of the held keys, earliest press first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().order.is_empty()
    }
}
