//! Trigger registry and activation index, updated together.

use std::collections::HashMap;
use std::sync::Arc;

use crate::index::ActivationIndex;
use crate::processor::TriggerHandle;

/// The in-memory set of active triggers for a workspace plus its routing
/// index.
///
/// Shared as `Arc<parking_lot::RwLock<TriggerCache>>`. Structural mutation
/// happens only on the reconciliation path, which the dispatch loop runs
/// inline, so there is a single writer at any time.
#[derive(Debug, Default)]
pub struct TriggerCache {
    triggers: HashMap<String, Arc<TriggerHandle>>,
    index: ActivationIndex,
}

impl TriggerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a trigger into the registry and every index entry it declares.
    ///
    /// Returns `false` and leaves both structures untouched when a trigger
    /// with the same id is already present.
    pub fn admit(&mut self, handle: Arc<TriggerHandle>) -> bool {
        if self.triggers.contains_key(handle.id()) {
            return false;
        }
        for activation in handle.activation_events() {
            self.index.insert(activation, &handle);
        }
        self.triggers.insert(handle.id().to_string(), handle);
        true
    }

    pub fn contains(&self, trigger_id: &str) -> bool {
        self.triggers.contains_key(trigger_id)
    }

    pub fn get(&self, trigger_id: &str) -> Option<Arc<TriggerHandle>> {
        self.triggers.get(trigger_id).cloned()
    }

    /// Handles routed for `(subject, event_type)`, cloned out of the lock.
    pub fn route(&self, subject: &str, event_type: &str) -> Option<Vec<Arc<TriggerHandle>>> {
        self.index.lookup(subject, event_type).map(<[_]>::to_vec)
    }

    pub fn index(&self) -> &ActivationIndex {
        &self.index
    }

    /// Registered trigger ids, sorted.
    pub fn trigger_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.triggers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn handles(&self) -> Vec<Arc<TriggerHandle>> {
        self.triggers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Drop every handle, closing the private queue of each processor.
    pub(crate) fn clear(&mut self) {
        self.index.clear();
        self.triggers.clear();
    }
}
