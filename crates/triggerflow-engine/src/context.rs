//! Per-trigger execution context and the workspace-wide global context.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::cache::TriggerCache;
use crate::errors::TriggerError;
use crate::processor::ProcessorState;
use crate::traits::EventSource;
use crate::types::Event;

/// Workspace-scoped key/value state visible to every trigger.
///
/// Loaded once from storage at bootstrap. Cheaply cloneable; clones share
/// the same map, so a value set by one trigger's action is visible to all.
#[derive(Clone, Default)]
pub struct GlobalContext {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl GlobalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.write().insert(key.into(), value)
    }

    /// Sorted keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl std::fmt::Debug for GlobalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalContext")
            .field("keys", &self.keys())
            .finish()
    }
}

/// References into workspace-owned structures, attached to every trigger
/// context during contextualization.
#[derive(Clone)]
pub(crate) struct WorkspaceShared {
    pub(crate) workspace: Arc<str>,
    pub(crate) sink: mpsc::Sender<Event>,
    pub(crate) event_sources: Arc<HashMap<String, Arc<dyn EventSource>>>,
    pub(crate) cache: Arc<RwLock<TriggerCache>>,
    pub(crate) global: GlobalContext,
}

impl WorkspaceShared {
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::Receiver<Event>) {
        let (sink, sink_rx) = mpsc::channel(64);
        let shared = Self {
            workspace: Arc::from("test"),
            sink,
            event_sources: Arc::new(HashMap::new()),
            cache: Arc::new(RwLock::new(TriggerCache::new())),
            global: GlobalContext::new(),
        };
        (shared, sink_rx)
    }
}

/// Mutable per-trigger state handed to conditions and actions.
///
/// Built once when the trigger is admitted and afterwards touched only by
/// that trigger's processor.
pub struct TriggerContext {
    /// Raw trigger data from the stored record; persisted on checkpoint.
    pub raw: Map<String, Value>,
    /// Output of the condition's context parser, if one is registered.
    pub condition_data: Option<Value>,
    /// Output of the action's context parser, if one is registered.
    pub action_data: Option<Value>,
    shared: WorkspaceShared,
}

impl TriggerContext {
    pub(crate) fn new(raw: Map<String, Value>, shared: WorkspaceShared) -> Self {
        Self {
            raw,
            condition_data: None,
            action_data: None,
            shared,
        }
    }

    pub fn workspace(&self) -> &str {
        &self.shared.workspace
    }

    pub fn global(&self) -> &GlobalContext {
        &self.shared.global
    }

    /// Sender half of the workspace event sink.
    pub fn sink(&self) -> &mpsc::Sender<Event> {
        &self.shared.sink
    }

    /// Publish an event into the workspace sink, waiting for capacity.
    pub async fn emit(&self, event: Event) -> Result<(), TriggerError> {
        self.shared
            .sink
            .send(event)
            .await
            .map_err(|_| TriggerError::Runtime {
                message: "workspace event sink is closed".into(),
            })
    }

    pub fn event_source(&self, name: &str) -> Option<Arc<dyn EventSource>> {
        self.shared.event_sources.get(name).cloned()
    }

    /// Sorted names of the workspace's event sources.
    pub fn event_source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.event_sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Ids of every trigger currently in the registry.
    pub fn trigger_ids(&self) -> Vec<String> {
        self.shared.cache.read().trigger_ids()
    }

    /// Ids of the triggers routed for `(subject, event_type)`.
    pub fn triggers_for(&self, subject: &str, event_type: &str) -> Vec<String> {
        self.shared
            .cache
            .read()
            .index()
            .trigger_ids(subject, event_type)
    }

    pub fn trigger_state(&self, trigger_id: &str) -> Option<ProcessorState> {
        self.shared
            .cache
            .read()
            .get(trigger_id)
            .map(|handle| handle.state())
    }

    /// A context wired to a fresh sink and empty workspace structures.
    #[cfg(test)]
    pub fn standalone(raw: Map<String, Value>) -> (Self, mpsc::Receiver<Event>) {
        let (shared, sink_rx) = WorkspaceShared::detached();
        (Self::new(raw, shared), sink_rx)
    }
}

impl std::fmt::Debug for TriggerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerContext")
            .field("workspace", &self.workspace())
            .field("raw", &self.raw)
            .field("condition_data", &self.condition_data)
            .field("action_data", &self.action_data)
            .finish_non_exhaustive()
    }
}
