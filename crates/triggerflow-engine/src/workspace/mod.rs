//! Workspace runtime: the single entry point for running one tenant's
//! triggers.
//!
//! ```rust,ignore
//! let workspace = Workspace::builder("shop")
//!     .registries(Registries::with_defaults())
//!     .backend(BackendSpec::new("file", json!({"path": "./data"})))
//!     .build()
//!     .await?;
//!
//! let shutdown = workspace.shutdown_handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     shutdown.shutdown();
//! });
//! workspace.run().await?;
//! ```

mod builder;
pub mod config;
pub mod error;

pub use builder::WorkspaceBuilder;
pub use config::{BackendSpec, WorkspaceConfig};
pub use error::WorkspaceError;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::checkpoint::CheckpointCoordinator;
use crate::context::{GlobalContext, WorkspaceShared};
use crate::dispatcher::Dispatcher;
use crate::processor::{ProcessorState, TriggerHandle};
use crate::stats::{StatsSnapshot, WorkspaceStats};
use crate::traits::Storage;
use crate::types::{Event, TriggerRecord};

/// Pieces consumed by [`Workspace::run`].
pub(crate) struct Runtime {
    dispatcher: Dispatcher,
    dispatcher_shutdown: broadcast::Receiver<()>,
    checkpoints: mpsc::UnboundedReceiver<TriggerRecord>,
    sources: Vec<JoinHandle<()>>,
}

/// Cloneable trigger for stopping a running [`Workspace`].
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Ask the workspace to stop. Idempotent.
    pub fn shutdown(&self) {
        // No receivers means everything already stopped.
        let _ = self.tx.send(());
    }
}

/// A bootstrapped workspace. Constructed via [`Workspace::builder`].
pub struct Workspace {
    name: Arc<str>,
    config: WorkspaceConfig,
    storage: Arc<dyn Storage>,
    shared: WorkspaceShared,
    stats: Arc<WorkspaceStats>,
    shutdown_tx: broadcast::Sender<()>,
    /// Taken once by `run()`.
    runtime: Mutex<Option<Runtime>>,
}

impl Workspace {
    pub fn builder(name: &str) -> WorkspaceBuilder {
        WorkspaceBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn global(&self) -> &GlobalContext {
        &self.shared.global
    }

    /// A sender into the workspace event sink.
    pub fn sink(&self) -> mpsc::Sender<Event> {
        self.shared.sink.clone()
    }

    /// Sorted names of the running event sources.
    pub fn event_source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.event_sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Ids of every admitted trigger, sorted.
    pub fn trigger_ids(&self) -> Vec<String> {
        self.shared.cache.read().trigger_ids()
    }

    pub fn trigger(&self, trigger_id: &str) -> Option<Arc<TriggerHandle>> {
        self.shared.cache.read().get(trigger_id)
    }

    pub fn trigger_state(&self, trigger_id: &str) -> Option<ProcessorState> {
        self.trigger(trigger_id).map(|handle| handle.state())
    }

    /// Ids of the triggers routed for `(subject, event_type)`.
    pub fn routed_triggers(&self, subject: &str, event_type: &str) -> Vec<String> {
        self.shared.cache.read().index().trigger_ids(subject, event_type)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    pub fn shutdown(&self) {
        self.shutdown_handle().shutdown();
    }

    /// Run the dispatch loop until shutdown is requested, then stop
    /// everything in order.
    ///
    /// A cache refresh that hits invalid trigger configuration also stops the
    /// workspace; the same teardown runs and the error is returned.
    ///
    /// 1. event sources (bounded by `shutdown_grace_ms`),
    /// 2. the sink receiver,
    /// 3. every private queue, after which processors drain and exit,
    /// 4. the checkpoint coordinator, after a final flush and commit.
    pub async fn run(&self) -> Result<(), WorkspaceError> {
        let Runtime {
            mut dispatcher,
            dispatcher_shutdown,
            checkpoints,
            sources,
        } = self.runtime.lock().take().ok_or(WorkspaceError::AlreadyRunning)?;

        let coordinator = tokio::spawn(
            CheckpointCoordinator::new(
                Arc::clone(&self.name),
                Arc::clone(&self.storage),
                Arc::clone(&self.shared.event_sources),
                checkpoints,
                Arc::clone(&self.stats),
            )
            .run(),
        );

        tracing::info!(workspace = %self.name, "workspace running");
        let outcome = dispatcher.run(dispatcher_shutdown).await;
        if outcome.is_err() {
            // Event sources only watch the shutdown channel.
            self.shutdown();
        }

        // 1. Event sources.
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace();
        for mut source in sources {
            if tokio::time::timeout_at(deadline, &mut source).await.is_err() {
                tracing::warn!(
                    workspace = %self.name,
                    "event source did not stop in time, aborting"
                );
                source.abort();
            }
        }

        // 2 + 3.
        let reconciler = dispatcher.into_reconciler();
        self.shared.cache.write().clear();
        for processor in reconciler.into_processors() {
            if let Err(e) = processor.await {
                tracing::error!(workspace = %self.name, error = %e, "trigger processor panicked");
            }
        }

        // 4.
        if let Err(e) = coordinator.await {
            tracing::error!(workspace = %self.name, error = %e, "checkpoint coordinator panicked");
        }

        tracing::info!(
            workspace = %self.name,
            stats = ?self.stats.snapshot(),
            "workspace stopped"
        );
        outcome
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("name", &self.name)
            .field("storage", &self.storage.name())
            .field("triggers", &self.trigger_ids())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::admin;
    use crate::defaults::{InMemoryEventHub, InMemoryStorage};
    use crate::registry::Registries;
    use crate::testing::{CountingStorage, RecordingAction};
    use crate::types::{collections, EventSourceDescriptor};

    const WS: &str = "shop";

    async fn seeded() -> Arc<InMemoryStorage> {
        let storage = Arc::new(InMemoryStorage::new());
        admin::register_workspace(storage.as_ref(), WS).await.unwrap();
        storage
    }

    fn registries_with(action: &RecordingAction) -> Registries {
        let mut registries = Registries::with_defaults();
        registries.register_action("record", action.clone());
        registries
    }

    fn fast_config() -> WorkspaceConfig {
        WorkspaceConfig {
            routing_retry_backoff_ms: 0,
            shutdown_grace_ms: 500,
            ..WorkspaceConfig::default()
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn spawn_run(workspace: &Arc<Workspace>) -> JoinHandle<Result<(), WorkspaceError>> {
        let workspace = Arc::clone(workspace);
        tokio::spawn(async move { workspace.run().await })
    }

    #[tokio::test]
    async fn matching_event_fires_once_and_checkpoints_once() {
        let inner = seeded().await;
        let record = crate::types::TriggerRecord::new("t1", "true", "record")
            .activation_event("orders", "created");
        admin::put_trigger(inner.as_ref(), WS, &record).await.unwrap();
        let storage = Arc::new(CountingStorage::new(inner));

        let action = RecordingAction::new();
        let workspace = Arc::new(
            Workspace::builder(WS)
                .registries(registries_with(&action))
                .storage(storage.clone())
                .config(fast_config())
                .build()
                .await
                .unwrap(),
        );
        let running = spawn_run(&workspace);

        workspace
            .sink()
            .send(Event::new("orders", "created", json!({"order": 1})))
            .await
            .unwrap();
        wait_until(|| storage.puts_to(collections::TRIGGERS) == 1).await;

        workspace.shutdown();
        running.await.unwrap().unwrap();

        assert_eq!(action.calls(), 1);
        assert_eq!(storage.puts_to(collections::TRIGGERS), 1);
        let stats = workspace.stats();
        assert_eq!(stats.triggers_fired, 1);
        assert_eq!(stats.checkpoints_written, 1);
    }

    #[tokio::test]
    async fn counter_state_survives_restart_through_checkpoint() {
        let storage = seeded().await;
        let record = crate::types::TriggerRecord::new("every-2nd", "counter_threshold", "record")
            .activation_event("orders", "created")
            .context_value("threshold", json!(2));
        admin::put_trigger(storage.as_ref(), WS, &record).await.unwrap();

        let action = RecordingAction::new();
        let workspace = Arc::new(
            Workspace::builder(WS)
                .registries(registries_with(&action))
                .storage(storage.clone())
                .config(fast_config())
                .build()
                .await
                .unwrap(),
        );
        let running = spawn_run(&workspace);
        for _ in 0..2 {
            workspace
                .sink()
                .send(Event::new("orders", "created", json!({})))
                .await
                .unwrap();
        }
        wait_until(|| action.calls() == 1).await;
        workspace.shutdown();
        running.await.unwrap().unwrap();

        let stored = storage.get(WS, collections::TRIGGERS).await.unwrap();
        let saved = crate::types::unmarshal_trigger(stored["every-2nd"].as_bytes()).unwrap();
        assert_eq!(saved.context["counter"], json!(2));
        assert_eq!(saved.uuid, record.uuid);
    }

    #[tokio::test]
    async fn trigger_stored_after_start_is_found_on_miss() {
        let storage = seeded().await;
        let action = RecordingAction::new();
        let workspace = Arc::new(
            Workspace::builder(WS)
                .registries(registries_with(&action))
                .storage(storage.clone())
                .config(fast_config())
                .build()
                .await
                .unwrap(),
        );
        assert!(workspace.trigger_ids().is_empty());
        let running = spawn_run(&workspace);

        let late = crate::types::TriggerRecord::new("late", "true", "record")
            .activation_event("invoices", "paid");
        admin::put_trigger(storage.as_ref(), WS, &late).await.unwrap();
        workspace
            .sink()
            .send(Event::new("invoices", "paid", json!({})))
            .await
            .unwrap();

        wait_until(|| {
            action.calls() == 1 && workspace.trigger_state("late") == Some(ProcessorState::Idle)
        })
        .await;
        assert_eq!(workspace.routed_triggers("invoices", "paid"), vec!["late"]);
        workspace.shutdown();
        running.await.unwrap().unwrap();
        assert_eq!(workspace.stats().routing_misses, 1);
    }

    #[tokio::test]
    async fn events_from_memory_source_are_routed_and_committed() {
        let storage = seeded().await;
        admin::put_trigger(
            storage.as_ref(),
            WS,
            &crate::types::TriggerRecord::new("t1", "true", "record")
                .activation_event("orders", "created"),
        )
        .await
        .unwrap();
        admin::put_event_source(
            storage.as_ref(),
            WS,
            &EventSourceDescriptor::new("memory", "orders-feed", json!({"topic": "orders"})),
        )
        .await
        .unwrap();

        let hub = InMemoryEventHub::new();
        let action = RecordingAction::new();
        let mut registries = registries_with(&action);
        hub.register(&mut registries);

        let workspace = Arc::new(
            Workspace::builder(WS)
                .registries(registries)
                .storage(storage.clone())
                .config(fast_config())
                .build()
                .await
                .unwrap(),
        );
        assert_eq!(workspace.event_source_names(), vec!["orders-feed"]);
        let running = spawn_run(&workspace);

        hub.publish("orders", Event::new("orders", "created", json!({})));
        wait_until(|| workspace.stats().checkpoints_written == 1).await;
        workspace.shutdown();
        running.await.unwrap().unwrap();

        assert_eq!(action.calls(), 1);
        assert!(workspace.stats().source_commits >= 1);
    }

    #[tokio::test]
    async fn global_context_is_loaded() {
        let storage = seeded().await;
        admin::put_global(storage.as_ref(), WS, "limits", &json!({"max": 5}))
            .await
            .unwrap();
        let workspace = Workspace::builder(WS)
            .storage(storage)
            .build()
            .await
            .unwrap();
        assert_eq!(workspace.global().get("limits"), Some(json!({"max": 5})));
    }

    #[tokio::test]
    async fn unknown_workspace_is_fatal() {
        let storage = Arc::new(InMemoryStorage::new());
        let err = Workspace::builder(WS).storage(storage).build().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::UnknownWorkspace { .. }));
    }

    #[tokio::test]
    async fn malformed_global_context_is_fatal() {
        let storage = seeded().await;
        storage
            .put(WS, collections::GLOBAL_CONTEXT, "broken", "{nope")
            .await
            .unwrap();
        let err = Workspace::builder(WS).storage(storage).build().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::GlobalContext { ref key, .. } if key == "broken"));
    }

    #[tokio::test]
    async fn parser_error_is_fatal() {
        let storage = seeded().await;
        // counter_threshold requires context.threshold.
        let record = crate::types::TriggerRecord::new("t1", "counter_threshold", "pass");
        admin::put_trigger(storage.as_ref(), WS, &record).await.unwrap();

        let err = Workspace::builder(WS).storage(storage).build().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Contextualize { .. }));
    }

    #[tokio::test]
    async fn parser_error_on_refresh_stops_running_workspace() {
        let storage = seeded().await;
        let action = RecordingAction::new();
        let workspace = Arc::new(
            Workspace::builder(WS)
                .registries(registries_with(&action))
                .storage(storage.clone())
                .config(fast_config())
                .build()
                .await
                .unwrap(),
        );
        let running = spawn_run(&workspace);

        let bad = crate::types::TriggerRecord::new("a-bad", "counter_threshold", "record")
            .activation_event("orders", "created");
        let good = crate::types::TriggerRecord::new("b-good", "true", "record")
            .activation_event("orders", "created");
        admin::put_trigger(storage.as_ref(), WS, &bad).await.unwrap();
        admin::put_trigger(storage.as_ref(), WS, &good).await.unwrap();
        workspace
            .sink()
            .send(Event::new("orders", "created", json!({})))
            .await
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("workspace must stop on invalid trigger configuration")
            .unwrap();
        assert!(matches!(
            outcome,
            Err(WorkspaceError::Contextualize { ref trigger_id, .. }) if trigger_id == "a-bad"
        ));
        assert_eq!(action.calls(), 0);
        assert_eq!(workspace.stats().events_dropped, 0);
    }

    #[tokio::test]
    async fn malformed_trigger_is_skipped() {
        let storage = seeded().await;
        storage
            .put(WS, collections::TRIGGERS, "bad", "{\"id\":")
            .await
            .unwrap();
        admin::put_trigger(
            storage.as_ref(),
            WS,
            &crate::types::TriggerRecord::new("good", "true", "pass").activation_event("a", "b"),
        )
        .await
        .unwrap();

        let workspace = Workspace::builder(WS).storage(storage).build().await.unwrap();
        assert_eq!(workspace.trigger_ids(), vec!["good"]);
    }

    #[tokio::test]
    async fn unknown_backend_and_source_class_are_fatal() {
        let err = Workspace::builder(WS)
            .backend(BackendSpec::new("nope", json!({})))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::UnknownBackend { .. }));

        let storage = seeded().await;
        admin::put_event_source(
            storage.as_ref(),
            WS,
            &EventSourceDescriptor::new("kafka", "orders", json!({})),
        )
        .await
        .unwrap();
        let err = Workspace::builder(WS).storage(storage).build().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::UnknownEventSourceClass { .. }));
    }

    #[tokio::test]
    async fn run_twice_is_rejected() {
        let storage = seeded().await;
        let workspace = Workspace::builder(WS).storage(storage).build().await.unwrap();
        workspace.shutdown();
        workspace.run().await.unwrap();
        assert!(matches!(
            workspace.run().await,
            Err(WorkspaceError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn file_backend_is_resolved_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let storage = crate::defaults::FileStorage::new(dir.path()).unwrap();
        admin::register_workspace(&storage, WS).await.unwrap();

        let workspace = Workspace::builder(WS)
            .backend(BackendSpec::new("file", json!({"path": dir.path()})))
            .build()
            .await
            .unwrap();
        assert_eq!(workspace.storage().name(), "file");
    }
}
