//! Trigger cache reconciliation against storage.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::context::WorkspaceShared;
use crate::processor::TriggerProcessor;
use crate::registry::Registries;
use crate::stats::WorkspaceStats;
use crate::traits::Storage;
use crate::trigger::Trigger;
use crate::types::{collections, unmarshal_trigger, TriggerRecord};
use crate::workspace::WorkspaceError;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Triggers admitted by this pass.
    pub added: usize,
    /// Stored triggers that could not be loaded.
    pub skipped: usize,
    /// Triggers in the cache after the pass.
    pub total: usize,
}

/// Loads stored triggers that are not yet cached, starts their processors and
/// admits them.
///
/// Only ever driven from one task at a time (bootstrap, then the dispatch
/// loop), which keeps admission single-writer.
pub(crate) struct Reconciler {
    storage: Arc<dyn Storage>,
    registries: Arc<Registries>,
    shared: WorkspaceShared,
    checkpoints: mpsc::UnboundedSender<TriggerRecord>,
    stats: Arc<WorkspaceStats>,
    processors: Vec<JoinHandle<()>>,
}

impl Reconciler {
    pub(crate) fn new(
        storage: Arc<dyn Storage>,
        registries: Arc<Registries>,
        shared: WorkspaceShared,
        checkpoints: mpsc::UnboundedSender<TriggerRecord>,
        stats: Arc<WorkspaceStats>,
    ) -> Self {
        Self {
            storage,
            registries,
            shared,
            checkpoints,
            stats,
            processors: Vec::new(),
        }
    }

    /// Admit every stored trigger whose id is not cached yet.
    ///
    /// A record that fails to decode, or names an unregistered condition or
    /// action, is logged and skipped. A parser error aborts the pass; triggers
    /// admitted before it stay admitted.
    pub(crate) async fn reconcile(&mut self) -> Result<ReconcileReport, WorkspaceError> {
        let workspace = Arc::clone(&self.shared.workspace);
        let stored = self.storage.get(&workspace, collections::TRIGGERS).await?;
        self.stats.record_refresh();

        let mut ids: Vec<&String> = stored.keys().collect();
        ids.sort();

        let mut report = ReconcileReport::default();
        for id in ids {
            if self.shared.cache.read().contains(id) {
                continue;
            }
            match self.load(id, &stored[id])? {
                Some(trigger) => {
                    let (handle, join) = TriggerProcessor::spawn(
                        trigger,
                        self.checkpoints.clone(),
                        Arc::clone(&self.stats),
                    );
                    self.processors.push(join);
                    self.shared.cache.write().admit(handle);
                    report.added += 1;
                }
                None => report.skipped += 1,
            }
        }

        report.total = self.shared.cache.read().len();
        tracing::info!(
            workspace = %workspace,
            added = report.added,
            skipped = report.skipped,
            total = report.total,
            "triggers updated"
        );
        Ok(report)
    }

    /// Decode and contextualize one stored trigger. `Ok(None)` means skip.
    fn load(&self, id: &str, raw: &str) -> Result<Option<Trigger>, WorkspaceError> {
        let record = match unmarshal_trigger(raw.as_bytes()) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(trigger_id = %id, error = %e, "skipping malformed trigger");
                return Ok(None);
            }
        };
        if record.id != id {
            tracing::warn!(
                trigger_id = %id,
                record_id = %record.id,
                "skipping trigger stored under a different id"
            );
            return Ok(None);
        }

        let Some(condition) = self.registries.condition(&record.condition.name) else {
            tracing::warn!(
                trigger_id = %id,
                condition = %record.condition.name,
                "skipping trigger with unknown condition"
            );
            return Ok(None);
        };
        let Some(action) = self.registries.action(&record.action.name) else {
            tracing::warn!(
                trigger_id = %id,
                action = %record.action.name,
                "skipping trigger with unknown action"
            );
            return Ok(None);
        };

        Trigger::contextualize(record, self.shared.clone(), &self.registries, condition, action)
            .map(Some)
            .map_err(|source| WorkspaceError::Contextualize {
                trigger_id: id.to_string(),
                source,
            })
    }

    /// Give up the checkpoint sender and hand back every processor task.
    pub(crate) fn into_processors(self) -> Vec<JoinHandle<()>> {
        self.processors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::InMemoryStorage;
    use crate::errors::ParserError;
    use crate::functions::register_builtins;
    use crate::types::marshal_trigger;

    async fn store(storage: &InMemoryStorage, record: &TriggerRecord) {
        storage
            .put("test", collections::TRIGGERS, &record.id, &marshal_trigger(record).unwrap())
            .await
            .unwrap();
    }

    fn reconciler(
        storage: Arc<InMemoryStorage>,
        registries: Registries,
    ) -> (Reconciler, WorkspaceShared) {
        let (shared, _sink) = WorkspaceShared::detached();
        let (tx, _rx) = mpsc::unbounded_channel();
        let reconciler = Reconciler::new(
            storage,
            Arc::new(registries),
            shared.clone(),
            tx,
            Arc::new(WorkspaceStats::default()),
        );
        (reconciler, shared)
    }

    fn builtins() -> Registries {
        let mut registries = Registries::new();
        register_builtins(&mut registries);
        registries
    }

    #[tokio::test]
    async fn admits_every_stored_trigger_into_registry_and_index() {
        let storage = Arc::new(InMemoryStorage::new());
        store(
            &storage,
            &TriggerRecord::new("t1", "true", "pass").activation_event("orders", "created"),
        )
        .await;
        store(
            &storage,
            &TriggerRecord::new("t2", "true", "pass")
                .activation_event("orders", "created")
                .activation_event("orders", "paid"),
        )
        .await;

        let (mut reconciler, shared) = reconciler(storage, builtins());
        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report, ReconcileReport { added: 2, skipped: 0, total: 2 });

        let cache = shared.cache.read();
        assert_eq!(cache.trigger_ids(), vec!["t1", "t2"]);
        assert_eq!(cache.index().trigger_ids("orders", "created"), vec!["t1", "t2"]);
        assert_eq!(cache.index().trigger_ids("orders", "paid"), vec!["t2"]);
    }

    #[tokio::test]
    async fn second_pass_changes_nothing() {
        let storage = Arc::new(InMemoryStorage::new());
        store(&storage, &TriggerRecord::new("t1", "true", "pass").activation_event("a", "b")).await;

        let (mut reconciler, shared) = reconciler(storage, builtins());
        reconciler.reconcile().await.unwrap();
        let report = reconciler.reconcile().await.unwrap();

        assert_eq!(report.added, 0);
        assert_eq!(report.total, 1);
        assert_eq!(shared.cache.read().index().trigger_ids("a", "b"), vec!["t1"]);
        assert_eq!(reconciler.into_processors().len(), 1);
    }

    #[tokio::test]
    async fn picks_up_triggers_stored_later() {
        let storage = Arc::new(InMemoryStorage::new());
        let (mut reconciler, shared) = reconciler(Arc::clone(&storage), builtins());
        assert_eq!(reconciler.reconcile().await.unwrap().total, 0);

        store(
            &storage,
            &TriggerRecord::new("late", "true", "pass").activation_event("a", "b"),
        )
        .await;
        assert_eq!(reconciler.reconcile().await.unwrap().added, 1);
        assert!(shared.cache.read().contains("late"));
    }

    #[tokio::test]
    async fn malformed_and_unknown_triggers_are_skipped() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.put("test", collections::TRIGGERS, "broken", "{not json").await.unwrap();
        store(&storage, &TriggerRecord::new("ghost", "no_such_condition", "pass")).await;
        store(&storage, &TriggerRecord::new("ok", "true", "pass").activation_event("a", "b")).await;

        let (mut reconciler, shared) = reconciler(storage, builtins());
        let report = reconciler.reconcile().await.unwrap();

        assert_eq!(report, ReconcileReport { added: 1, skipped: 2, total: 1 });
        assert_eq!(shared.cache.read().trigger_ids(), vec!["ok"]);
    }

    #[tokio::test]
    async fn parser_error_aborts_pass() {
        let storage = Arc::new(InMemoryStorage::new());
        store(&storage, &TriggerRecord::new("t1", "true", "pass")).await;

        let mut registries = builtins();
        registries.register_parser("true", |_| {
            Err(ParserError::Invalid {
                parser: "true".into(),
                message: "rejected".into(),
            })
        });
        let (mut reconciler, shared) = reconciler(storage, registries);

        let err = reconciler.reconcile().await.unwrap_err();
        assert!(matches!(
            err,
            WorkspaceError::Contextualize { ref trigger_id, .. } if trigger_id == "t1"
        ));
        assert!(shared.cache.read().is_empty());
    }
}
