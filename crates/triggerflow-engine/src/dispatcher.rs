//! The dispatch loop: the single consumer of the workspace event sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};

use crate::cache::TriggerCache;
use crate::reconcile::Reconciler;
use crate::stats::WorkspaceStats;
use crate::types::Event;
use crate::workspace::WorkspaceError;

/// Events are identified by `(source, id)`; ids are only unique per source.
type EventKey = (String, String);

fn event_key(event: &Event) -> EventKey {
    (event.source.clone(), event.id.clone())
}

/// Routes each sink event to the private queues of the matching triggers.
///
/// A routing miss is treated as a stale cache: the dispatcher reconciles
/// inline and re-submits the event after a short backoff. An event that keeps
/// missing is dropped after `max_retries` re-submissions. A refresh that
/// fails on invalid trigger configuration stops the loop with that error.
pub(crate) struct Dispatcher {
    sink_tx: mpsc::Sender<Event>,
    sink_rx: mpsc::Receiver<Event>,
    cache: Arc<RwLock<TriggerCache>>,
    reconciler: Reconciler,
    /// Routing misses so far, per event, for events still in flight.
    misses: HashMap<EventKey, u32>,
    max_retries: u32,
    backoff: Duration,
    stats: Arc<WorkspaceStats>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        sink_tx: mpsc::Sender<Event>,
        sink_rx: mpsc::Receiver<Event>,
        cache: Arc<RwLock<TriggerCache>>,
        reconciler: Reconciler,
        max_retries: u32,
        backoff: Duration,
        stats: Arc<WorkspaceStats>,
    ) -> Self {
        Self {
            sink_tx,
            sink_rx,
            cache,
            reconciler,
            misses: HashMap::new(),
            max_retries,
            backoff,
            stats,
        }
    }

    /// Consume the sink until `shutdown` fires or a refresh hits invalid
    /// trigger configuration.
    pub(crate) async fn run(
        &mut self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), WorkspaceError> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                received = self.sink_rx.recv() => match received {
                    Some(event) => self.dispatch(event).await?,
                    None => break,
                },
            }
        }
        tracing::debug!(in_flight_misses = self.misses.len(), "dispatch loop stopped");
        Ok(())
    }

    pub(crate) async fn dispatch(&mut self, event: Event) -> Result<(), WorkspaceError> {
        let routed = self.cache.read().route(event.subject(), event.event_type());
        match routed {
            Some(handles) => {
                self.misses.remove(&event_key(&event));
                self.stats.record_dispatch();
                for handle in handles {
                    if !handle.deliver(event.clone()) {
                        self.stats.record_dead_delivery();
                        tracing::debug!(
                            trigger_id = %handle.id(),
                            event_id = %event.id,
                            "trigger is terminated, event not delivered"
                        );
                    }
                }
                Ok(())
            }
            None => self.handle_miss(event).await,
        }
    }

    async fn handle_miss(&mut self, event: Event) -> Result<(), WorkspaceError> {
        self.stats.record_miss();
        let key = event_key(&event);
        let attempts = {
            let counter = self.misses.entry(key.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        if attempts > self.max_retries {
            self.misses.remove(&key);
            self.stats.record_drop();
            tracing::warn!(
                event_id = %event.id,
                subject = %event.subject(),
                event_type = %event.event_type(),
                attempts,
                "no trigger matched event, dropping"
            );
            return Ok(());
        }

        tracing::info!(
            event_id = %event.id,
            subject = %event.subject(),
            event_type = %event.event_type(),
            attempt = attempts,
            "no trigger matched event, refreshing trigger cache"
        );
        match self.reconciler.reconcile().await {
            Ok(_) => {}
            Err(e @ WorkspaceError::Contextualize { .. }) => {
                self.misses.remove(&key);
                tracing::error!(
                    event_id = %event.id,
                    error = %e,
                    "invalid trigger configuration, stopping dispatch"
                );
                return Err(e);
            }
            Err(e) => tracing::error!(error = %e, "trigger cache refresh failed"),
        }

        // Re-submission goes through a separate task so a full sink cannot
        // block its only consumer.
        let sink = self.sink_tx.clone();
        let backoff = self.backoff;
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            if sink.send(event).await.is_err() {
                tracing::debug!("event sink closed, re-submission dropped");
            }
        });
        Ok(())
    }

    /// Drop the sink receiver and hand back the reconciler.
    pub(crate) fn into_reconciler(self) -> Reconciler {
        self.reconciler
    }
}
