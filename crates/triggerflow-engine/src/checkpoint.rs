//! Checkpoint coordinator.
//!
//! A single long-lived task per workspace. Each time a fired trigger's
//! snapshot arrives it:
//!
//! 1. asks every event source to commit what it has delivered,
//! 2. drains whatever else is already queued, keeping only the newest
//!    snapshot per trigger id,
//! 3. writes each snapshot to the `triggers` collection as its own task and
//!    waits for the batch before taking the next one.
//!
//! Waiting per batch keeps successive writes for one trigger in order. A
//! failed write is logged and counted; the rest of the batch still lands.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;

use crate::errors::StorageError;
use crate::stats::WorkspaceStats;
use crate::traits::{EventSource, Storage};
use crate::types::{collections, marshal_trigger, TriggerRecord};

pub(crate) struct CheckpointCoordinator {
    workspace: Arc<str>,
    storage: Arc<dyn Storage>,
    event_sources: Arc<HashMap<String, Arc<dyn EventSource>>>,
    requests: mpsc::UnboundedReceiver<TriggerRecord>,
    stats: Arc<WorkspaceStats>,
}

impl CheckpointCoordinator {
    pub(crate) fn new(
        workspace: Arc<str>,
        storage: Arc<dyn Storage>,
        event_sources: Arc<HashMap<String, Arc<dyn EventSource>>>,
        requests: mpsc::UnboundedReceiver<TriggerRecord>,
        stats: Arc<WorkspaceStats>,
    ) -> Self {
        Self {
            workspace,
            storage,
            event_sources,
            requests,
            stats,
        }
    }

    /// Run until every checkpoint sender is gone, then commit sources one
    /// last time.
    pub(crate) async fn run(mut self) {
        while let Some(first) = self.requests.recv().await {
            self.commit_sources().await;
            let batch = self.drain(first);
            self.persist(batch).await;
        }

        self.commit_sources().await;
        tracing::debug!(workspace = %self.workspace, "checkpoint coordinator stopped");
    }

    fn drain(&mut self, first: TriggerRecord) -> Vec<TriggerRecord> {
        let mut latest: HashMap<String, TriggerRecord> = HashMap::new();
        latest.insert(first.id.clone(), first);
        while let Ok(record) = self.requests.try_recv() {
            latest.insert(record.id.clone(), record);
        }
        latest.into_values().collect()
    }

    async fn commit_sources(&self) {
        let commits = self.event_sources.values().map(|source| {
            let source = Arc::clone(source);
            async move {
                let result = source.commit_events().await;
                (source, result)
            }
        });

        for (source, result) in join_all(commits).await {
            match result {
                Ok(()) => self.stats.record_commit(),
                Err(e) => tracing::error!(
                    workspace = %self.workspace,
                    source = %source.name(),
                    error = %e,
                    "event source commit failed"
                ),
            }
        }
    }

    async fn persist(&self, batch: Vec<TriggerRecord>) {
        let mut writes: FuturesUnordered<
            tokio::task::JoinHandle<(String, Result<(), StorageError>)>,
        > =
            FuturesUnordered::new();

        for record in batch {
            let value = match marshal_trigger(&record) {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!(
                        workspace = %self.workspace,
                        trigger_id = %record.id,
                        error = %e,
                        "failed to serialize trigger checkpoint"
                    );
                    self.stats.record_checkpoint_failure();
                    continue;
                }
            };

            let storage = Arc::clone(&self.storage);
            let workspace = Arc::clone(&self.workspace);
            writes.push(tokio::spawn(async move {
                let result = storage
                    .put(&workspace, collections::TRIGGERS, &record.id, &value)
                    .await;
                (record.id, result)
            }));
        }

        while let Some(joined) = writes.next().await {
            match joined {
                Ok((trigger_id, Ok(()))) => {
                    tracing::debug!(trigger_id = %trigger_id, "trigger checkpointed");
                    self.stats.record_checkpoint();
                }
                Ok((trigger_id, Err(e))) => {
                    tracing::error!(
                        workspace = %self.workspace,
                        trigger_id = %trigger_id,
                        error = %e,
                        "failed to persist trigger checkpoint"
                    );
                    self.stats.record_checkpoint_failure();
                }
                Err(e) => {
                    tracing::error!(
                        workspace = %self.workspace,
                        error = %e,
                        "checkpoint task panicked"
                    );
                    self.stats.record_checkpoint_failure();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::InMemoryStorage;
    use crate::testing::{CommitCountingSource, CountingStorage};
    use crate::types::unmarshal_trigger;
    use serde_json::json;

    struct Harness {
        storage: Arc<CountingStorage>,
        source: Arc<CommitCountingSource>,
        tx: mpsc::UnboundedSender<TriggerRecord>,
        coordinator: CheckpointCoordinator,
        stats: Arc<WorkspaceStats>,
    }

    fn harness() -> Harness {
        let storage = Arc::new(CountingStorage::new(Arc::new(InMemoryStorage::new())));
        let source = Arc::new(CommitCountingSource::new("feed"));
        let mut sources: HashMap<String, Arc<dyn EventSource>> = HashMap::new();
        sources.insert("feed".into(), source.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(WorkspaceStats::default());
        let coordinator = CheckpointCoordinator::new(
            Arc::from("ws"),
            storage.clone(),
            Arc::new(sources),
            rx,
            Arc::clone(&stats),
        );
        Harness {
            storage,
            source,
            tx,
            coordinator,
            stats,
        }
    }

    #[tokio::test]
    async fn writes_snapshot_and_commits_sources() {
        let h = harness();
        h.tx.send(TriggerRecord::new("t1", "true", "pass")).unwrap();
        drop(h.tx);
        h.coordinator.run().await;

        assert_eq!(h.storage.puts(), vec![("triggers".to_string(), "t1".to_string())]);
        // Once for the batch, once on exit.
        assert_eq!(h.source.commits(), 2);
        assert_eq!(h.stats.snapshot().checkpoints_written, 1);
    }

    #[tokio::test]
    async fn queued_snapshots_coalesce_to_latest() {
        let h = harness();
        for n in 1..=3 {
            let record =
                TriggerRecord::new("t1", "true", "pass").context_value("counter", json!(n));
            h.tx.send(record).unwrap();
        }
        drop(h.tx);
        h.coordinator.run().await;

        assert_eq!(h.storage.puts_to("triggers"), 1);
        let stored = h.storage.get("ws", "triggers").await.unwrap();
        let record = unmarshal_trigger(stored["t1"].as_bytes()).unwrap();
        assert_eq!(record.context["counter"], json!(3));
    }

    #[tokio::test]
    async fn failed_write_does_not_block_others() {
        let h = harness();
        h.storage.fail_puts_for("bad");
        h.tx.send(TriggerRecord::new("bad", "true", "pass")).unwrap();
        h.tx.send(TriggerRecord::new("good", "true", "pass")).unwrap();
        drop(h.tx);
        h.coordinator.run().await;

        assert_eq!(h.storage.puts(), vec![("triggers".to_string(), "good".to_string())]);
        let snap = h.stats.snapshot();
        assert_eq!(snap.checkpoints_written, 1);
        assert_eq!(snap.checkpoint_failures, 1);
    }

    #[tokio::test]
    async fn idle_coordinator_only_commits_on_exit() {
        let h = harness();
        drop(h.tx);
        h.coordinator.run().await;
        assert!(h.storage.puts().is_empty());
        assert_eq!(h.source.commits(), 1);
    }
}
