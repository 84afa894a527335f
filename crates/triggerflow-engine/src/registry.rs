//! Name-keyed lookup tables for pluggable components.
//!
//! A [`Registries`] value is assembled once at process start and handed to
//! [`WorkspaceBuilder`](crate::workspace::WorkspaceBuilder). It holds five
//! tables:
//!
//! | table          | key                      | value                      |
//! |----------------|--------------------------|----------------------------|
//! | storage        | backend name             | async constructor          |
//! | event sources  | adapter class            | constructor                |
//! | parsers        | condition/action name    | context parser             |
//! | conditions     | condition name           | `Arc<dyn Condition>`       |
//! | actions        | action name              | `Arc<dyn Action>`          |

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::errors::{EventSourceError, ParserError, StorageError};
use crate::traits::{Action, Condition, EventSource, Storage};
use crate::types::Event;

/// Builds a storage backend from its opaque JSON parameters.
pub type StorageConstructor =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Arc<dyn Storage>, StorageError>> + Send + Sync>;

/// Builds an event source adapter.
pub type EventSourceConstructor =
    Arc<dyn Fn(EventSourceInit) -> Result<Arc<dyn EventSource>, EventSourceError> + Send + Sync>;

/// Turns a trigger's raw context into parsed condition or action data.
pub type ContextParser =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Value, ParserError> + Send + Sync>;

/// Everything an event source constructor receives.
#[derive(Debug, Clone)]
pub struct EventSourceInit {
    pub workspace: String,
    /// Name of this source instance within the workspace.
    pub name: String,
    pub sink: mpsc::Sender<Event>,
    pub parameters: Value,
}

/// A single name-keyed table.
#[derive(Clone)]
pub struct NamedRegistry<T> {
    entries: HashMap<String, T>,
}

impl<T: Clone> NamedRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register `value` under `name`, returning any entry it replaced.
    pub fn register(&mut self, name: impl Into<String>, value: T) -> Option<T> {
        self.entries.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> Default for NamedRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> std::fmt::Debug for NamedRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// All registration tables consulted while bootstrapping a workspace.
#[derive(Clone, Default, Debug)]
pub struct Registries {
    storage: NamedRegistry<StorageConstructor>,
    event_sources: NamedRegistry<EventSourceConstructor>,
    parsers: NamedRegistry<ContextParser>,
    conditions: NamedRegistry<Arc<dyn Condition>>,
    actions: NamedRegistry<Arc<dyn Action>>,
}

impl Registries {
    /// Empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables pre-populated with the built-in backends and functions.
    pub fn with_defaults() -> Self {
        let mut registries = Self::new();
        crate::defaults::register_defaults(&mut registries);
        crate::functions::register_builtins(&mut registries);
        registries
    }

    pub fn register_storage<F, Fut>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Storage>, StorageError>> + Send + 'static,
    {
        let constructor: StorageConstructor = Arc::new(move |params| constructor(params).boxed());
        self.storage.register(name, constructor);
        self
    }

    pub fn register_event_source<F>(&mut self, class: &str, constructor: F) -> &mut Self
    where
        F: Fn(EventSourceInit) -> Result<Arc<dyn EventSource>, EventSourceError>
            + Send
            + Sync
            + 'static,
    {
        self.event_sources.register(class, Arc::new(constructor));
        self
    }

    pub fn register_parser<F>(&mut self, name: &str, parser: F) -> &mut Self
    where
        F: Fn(&Map<String, Value>) -> Result<Value, ParserError> + Send + Sync + 'static,
    {
        self.parsers.register(name, Arc::new(parser));
        self
    }

    pub fn register_condition(
        &mut self,
        name: &str,
        condition: impl Condition + 'static,
    ) -> &mut Self {
        self.conditions.register(name, Arc::new(condition));
        self
    }

    pub fn register_action(&mut self, name: &str, action: impl Action + 'static) -> &mut Self {
        self.actions.register(name, Arc::new(action));
        self
    }

    pub fn storage_backend(&self, name: &str) -> Option<StorageConstructor> {
        self.storage.get(name)
    }

    pub fn event_source(&self, class: &str) -> Option<EventSourceConstructor> {
        self.event_sources.get(class)
    }

    pub fn parser(&self, name: &str) -> Option<ContextParser> {
        self.parsers.get(name)
    }

    pub fn condition(&self, name: &str) -> Option<Arc<dyn Condition>> {
        self.conditions.get(name)
    }

    pub fn action(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name)
    }

    pub fn storage_backends(&self) -> &NamedRegistry<StorageConstructor> {
        &self.storage
    }

    pub fn event_sources(&self) -> &NamedRegistry<EventSourceConstructor> {
        &self.event_sources
    }

    pub fn conditions(&self) -> &NamedRegistry<Arc<dyn Condition>> {
        &self.conditions
    }

    pub fn actions(&self) -> &NamedRegistry<Arc<dyn Action>> {
        &self.actions
    }
}
