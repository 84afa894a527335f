//! Two-level routing table: subject → event type → interested triggers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::processor::TriggerHandle;
use crate::types::ActivationEvent;

/// Routes `(subject, type)` pairs to trigger handles in constant average time.
///
/// Entries are only ever added through
/// [`TriggerCache::admit`](crate::cache::TriggerCache::admit), which keeps the
/// index and the registry in step.
#[derive(Default)]
pub struct ActivationIndex {
    by_subject: HashMap<String, HashMap<String, Vec<Arc<TriggerHandle>>>>,
}

impl ActivationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers interested in `(subject, event_type)`, or `None` on a miss.
    pub fn lookup(&self, subject: &str, event_type: &str) -> Option<&[Arc<TriggerHandle>]> {
        self.by_subject
            .get(subject)
            .and_then(|types| types.get(event_type))
            .map(Vec::as_slice)
    }

    /// Ids of the triggers interested in `(subject, event_type)`.
    pub fn trigger_ids(&self, subject: &str, event_type: &str) -> Vec<String> {
        self.lookup(subject, event_type)
            .map(|handles| handles.iter().map(|h| h.id().to_string()).collect())
            .unwrap_or_default()
    }

    /// Add `handle` under `activation`. A trigger appears at most once per pair.
    pub(crate) fn insert(&mut self, activation: &ActivationEvent, handle: &Arc<TriggerHandle>) {
        let entry = self
            .by_subject
            .entry(activation.subject.clone())
            .or_default()
            .entry(activation.event_type.clone())
            .or_default();
        if !entry.iter().any(|existing| existing.id() == handle.id()) {
            entry.push(Arc::clone(handle));
        }
    }

    /// Number of distinct `(subject, type)` pairs.
    pub fn len(&self) -> usize {
        self.by_subject.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_subject.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.by_subject.clear();
    }
}

impl std::fmt::Debug for ActivationIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationIndex")
            .field("subjects", &self.by_subject.len())
            .field("pairs", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::TriggerHandle;

    #[test]
    fn lookup_distinguishes_subject_and_type() {
        let (t1, _rx1) = TriggerHandle::detached("t1", &[("orders", "created")]);
        let (t2, _rx2) = TriggerHandle::detached("t2", &[("orders", "deleted")]);
        let mut index = ActivationIndex::new();
        for handle in [&t1, &t2] {
            for activation in handle.activation_events() {
                index.insert(activation, handle);
            }
        }

        assert_eq!(index.trigger_ids("orders", "created"), vec!["t1"]);
        assert_eq!(index.trigger_ids("orders", "deleted"), vec!["t2"]);
        assert!(index.lookup("orders", "shipped").is_none());
        assert!(index.lookup("users", "created").is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn duplicate_insert_keeps_one_entry() {
        let (t1, _rx) = TriggerHandle::detached("t1", &[("a", "b"), ("a", "b")]);
        let mut index = ActivationIndex::new();
        for activation in t1.activation_events() {
            index.insert(activation, &t1);
        }
        index.insert(&ActivationEvent::new("a", "b"), &t1);
        assert_eq!(index.lookup("a", "b").unwrap().len(), 1);
    }

    #[test]
    fn shared_activation_event_lists_both_triggers() {
        let (t1, _rx1) = TriggerHandle::detached("t1", &[("orders", "created")]);
        let (t2, _rx2) = TriggerHandle::detached("t2", &[("orders", "created")]);
        let mut index = ActivationIndex::new();
        index.insert(&t1.activation_events()[0], &t1);
        index.insert(&t2.activation_events()[0], &t2);
        assert_eq!(index.trigger_ids("orders", "created"), vec!["t1", "t2"]);
    }
}
