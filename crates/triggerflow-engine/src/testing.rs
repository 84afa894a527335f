//! Test doubles for conditions, actions, storage and event sources.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::context::TriggerContext;
use crate::errors::{EventSourceError, StorageError, TriggerError};
use crate::traits::{Action, Condition, EventSource, Storage};
use crate::types::Event;

/// Returns the scripted answers in order, then `false`.
#[derive(Clone, Default)]
pub struct ScriptedCondition {
    answers: Arc<Mutex<VecDeque<bool>>>,
}

impl ScriptedCondition {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into())),
        }
    }
}

#[async_trait]
impl Condition for ScriptedCondition {
    async fn evaluate(
        &self,
        _ctx: &mut TriggerContext,
        _event: &Event,
    ) -> Result<bool, TriggerError> {
        Ok(self.answers.lock().pop_front().unwrap_or(false))
    }
}

pub struct FailingCondition;

#[async_trait]
impl Condition for FailingCondition {
    async fn evaluate(
        &self,
        _ctx: &mut TriggerContext,
        _event: &Event,
    ) -> Result<bool, TriggerError> {
        Err(TriggerError::Runtime {
            message: "condition failed".into(),
        })
    }
}

/// Records every event it was executed for.
#[derive(Clone, Default)]
pub struct RecordingAction {
    seen: Arc<Mutex<Vec<Event>>>,
}

impl RecordingAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn events(&self) -> Vec<Event> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Action for RecordingAction {
    async fn execute(&self, _ctx: &mut TriggerContext, event: &Event) -> Result<(), TriggerError> {
        self.seen.lock().push(event.clone());
        Ok(())
    }
}

pub struct FailingAction;

#[async_trait]
impl Action for FailingAction {
    async fn execute(&self, _ctx: &mut TriggerContext, _event: &Event) -> Result<(), TriggerError> {
        Err(TriggerError::Runtime {
            message: "action failed".into(),
        })
    }
}

/// Wraps a storage backend, counting reads and writes per collection.
///
/// Writes to ids listed with [`fail_puts_for`](Self::fail_puts_for) and reads
/// of collections listed with [`fail_gets_for`](Self::fail_gets_for) return a
/// store error instead of reaching the inner backend.
pub struct CountingStorage {
    inner: Arc<dyn Storage>,
    gets: Mutex<HashMap<String, usize>>,
    puts: Mutex<Vec<(String, String)>>,
    failing_ids: Mutex<Vec<String>>,
    failing_collections: Mutex<Vec<String>>,
}

impl CountingStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            gets: Mutex::new(HashMap::new()),
            puts: Mutex::new(Vec::new()),
            failing_ids: Mutex::new(Vec::new()),
            failing_collections: Mutex::new(Vec::new()),
        }
    }

    pub fn gets(&self, collection: &str) -> usize {
        self.gets.lock().get(collection).copied().unwrap_or(0)
    }

    /// `(collection, id)` of every successful put, in call order.
    pub fn puts(&self) -> Vec<(String, String)> {
        self.puts.lock().clone()
    }

    pub fn puts_to(&self, collection: &str) -> usize {
        self.puts.lock().iter().filter(|(c, _)| c == collection).count()
    }

    pub fn fail_puts_for(&self, id: &str) {
        self.failing_ids.lock().push(id.to_string());
    }

    pub fn fail_gets_for(&self, collection: &str) {
        self.failing_collections.lock().push(collection.to_string());
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn get(
        &self,
        workspace: &str,
        collection: &str,
    ) -> Result<HashMap<String, String>, StorageError> {
        *self.gets.lock().entry(collection.to_string()).or_default() += 1;
        if self.failing_collections.lock().iter().any(|c| c == collection) {
            return Err(StorageError::Store {
                message: format!("injected read failure for {collection}"),
            });
        }
        self.inner.get(workspace, collection).await
    }

    async fn put(
        &self,
        workspace: &str,
        collection: &str,
        id: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        if self.failing_ids.lock().iter().any(|f| f == id) {
            return Err(StorageError::Store {
                message: format!("injected failure for {id}"),
            });
        }
        self.inner.put(workspace, collection, id, value).await?;
        self.puts.lock().push((collection.to_string(), id.to_string()));
        Ok(())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Produces nothing; counts commits.
#[derive(Default)]
pub struct CommitCountingSource {
    name: String,
    commits: AtomicUsize,
}

impl CommitCountingSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            commits: AtomicUsize::new(0),
        }
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for CommitCountingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_consuming(
        &self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), EventSourceError> {
        let _ = shutdown.recv().await;
        Ok(())
    }

    async fn commit_events(&self) -> Result<(), EventSourceError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
