//! Trigger processors: one task per trigger, draining its private queue.
//!
//! ```text
//!            event            condition = true
//!   Idle ───────────▶ Evaluating ─────────────▶ Firing
//!    ▲                   │ false                  │ ok: enqueue checkpoint
//!    └───────────────────┴────────────────────────┘
//!
//!   any error, or queue closed  ──▶ Terminated
//! ```
//!
//! Processing inside one trigger is strictly sequential. A condition or
//! action error stops that trigger only; its siblings keep running.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::errors::TriggerError;
use crate::stats::WorkspaceStats;
use crate::trigger::Trigger;
use crate::types::{ActivationEvent, Event, TriggerRecord};

/// Lifecycle state of a trigger processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorState {
    /// Waiting for the next event on the private queue.
    Idle,
    Evaluating,
    Firing,
    /// Queue closed or an evaluation error occurred. Final.
    Terminated,
}

/// Non-owning reference to a running trigger, kept in the registry and the
/// activation index.
pub struct TriggerHandle {
    id: String,
    uuid: String,
    activation_events: Vec<ActivationEvent>,
    queue: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<ProcessorState>,
}

impl TriggerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn activation_events(&self) -> &[ActivationEvent] {
        &self.activation_events
    }

    pub fn state(&self) -> ProcessorState {
        *self.state.borrow()
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == ProcessorState::Terminated
    }

    /// Wait until the processor reports `target`.
    ///
    /// Returns the last observed state if the processor exits first.
    pub async fn wait_for_state(&self, target: ProcessorState) -> ProcessorState {
        let mut state = self.state.clone();
        let reached = match state.wait_for(|s| *s == target).await {
            Ok(s) => Some(*s),
            Err(_) => None,
        };
        reached.unwrap_or_else(|| *state.borrow())
    }

    /// Append `event` to the private queue. Returns `false` once the
    /// processor has terminated.
    pub(crate) fn deliver(&self, event: Event) -> bool {
        self.queue.send(event).is_ok()
    }

    /// A handle with no processor behind it; the caller reads the queue.
    #[cfg(test)]
    pub fn detached(
        id: &str,
        activation_events: &[(&str, &str)],
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (queue, rx) = mpsc::unbounded_channel();
        let (_state_tx, state) = watch::channel(ProcessorState::Idle);
        let handle = Self {
            id: id.to_string(),
            uuid: uuid::Uuid::new_v4().to_string(),
            activation_events: activation_events
                .iter()
                .map(|(subject, ty)| ActivationEvent::new(*subject, *ty))
                .collect(),
            queue,
            state,
        };
        (Arc::new(handle), rx)
    }
}

impl std::fmt::Debug for TriggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerHandle")
            .field("id", &self.id)
            .field("uuid", &self.uuid)
            .field("state", &self.state())
            .finish()
    }
}

/// Which half of a trigger failed.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Condition,
    Action,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Condition => f.write_str("condition"),
            Stage::Action => f.write_str("action"),
        }
    }
}

pub(crate) struct TriggerProcessor {
    trigger: Trigger,
    queue: mpsc::UnboundedReceiver<Event>,
    state: watch::Sender<ProcessorState>,
    checkpoints: mpsc::UnboundedSender<TriggerRecord>,
    stats: Arc<WorkspaceStats>,
}

impl TriggerProcessor {
    /// Start a processor task for `trigger` and return its handle.
    pub(crate) fn spawn(
        trigger: Trigger,
        checkpoints: mpsc::UnboundedSender<TriggerRecord>,
        stats: Arc<WorkspaceStats>,
    ) -> (Arc<TriggerHandle>, JoinHandle<()>) {
        let (queue_tx, queue) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(ProcessorState::Idle);

        let handle = Arc::new(TriggerHandle {
            id: trigger.id().to_string(),
            uuid: trigger.uuid().to_string(),
            activation_events: trigger.activation_events().to_vec(),
            queue: queue_tx,
            state: state_rx,
        });

        let processor = Self {
            trigger,
            queue,
            state,
            checkpoints,
            stats,
        };
        (handle, tokio::spawn(processor.run()))
    }

    async fn run(mut self) {
        while let Some(event) = self.queue.recv().await {
            if let Err((stage, e)) = self.process(&event).await {
                tracing::error!(
                    trigger_id = %self.trigger.id(),
                    event_id = %event.id,
                    stage = %stage,
                    error = %e,
                    "trigger failed, processor stopping"
                );
                self.stats.record_processor_failure();
                break;
            }
        }

        self.queue.close();
        self.state.send_replace(ProcessorState::Terminated);
        tracing::debug!(trigger_id = %self.trigger.id(), "trigger processor terminated");
    }

    async fn process(&mut self, event: &Event) -> Result<(), (Stage, TriggerError)> {
        self.state.send_replace(ProcessorState::Evaluating);
        tracing::debug!(
            trigger_id = %self.trigger.id(),
            event_id = %event.id,
            "processing trigger"
        );

        let fire = self
            .trigger
            .evaluate(event)
            .await
            .map_err(|e| (Stage::Condition, e))?;

        if fire {
            self.state.send_replace(ProcessorState::Firing);
            self.trigger
                .fire(event)
                .await
                .map_err(|e| (Stage::Action, e))?;

            tracing::info!(trigger_id = %self.trigger.id(), "trigger action fired");
            self.stats.record_fire();

            if self.checkpoints.send(self.trigger.to_record()).is_err() {
                tracing::warn!(
                    trigger_id = %self.trigger.id(),
                    "checkpoint queue closed, fired state will not be persisted"
                );
            }
        }

        self.state.send_replace(ProcessorState::Idle);
        Ok(())
    }
}
