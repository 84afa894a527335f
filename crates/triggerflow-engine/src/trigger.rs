//! Runtime trigger: a decoded record bound to its functions and context.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::{TriggerContext, WorkspaceShared};
use crate::errors::{ParserError, TriggerError};
use crate::registry::Registries;
use crate::traits::{Action, Condition};
use crate::types::{ActivationEvent, Event, FunctionRef, TriggerRecord};

/// A trigger ready to be driven by its processor.
///
/// Owned exclusively by the processor task once started; the workspace only
/// keeps a [`TriggerHandle`](crate::processor::TriggerHandle).
pub struct Trigger {
    id: String,
    uuid: String,
    activation_events: Vec<ActivationEvent>,
    condition_ref: FunctionRef,
    action_ref: FunctionRef,
    extra: Map<String, Value>,
    pub context: TriggerContext,
    condition: Arc<dyn Condition>,
    action: Arc<dyn Action>,
}

impl Trigger {
    /// Attach workspace references to `record` and run the context parsers
    /// registered under its condition and action names.
    ///
    /// The returned trigger is fully built; nothing observes it before this
    /// returns.
    pub(crate) fn contextualize(
        record: TriggerRecord,
        shared: WorkspaceShared,
        registries: &Registries,
        condition: Arc<dyn Condition>,
        action: Arc<dyn Action>,
    ) -> Result<Self, ParserError> {
        let TriggerRecord {
            id,
            uuid,
            activation_events,
            condition: condition_ref,
            action: action_ref,
            context: raw,
            extra,
        } = record;

        let mut context = TriggerContext::new(raw, shared);
        if let Some(parser) = registries.parser(&condition_ref.name) {
            context.condition_data = Some(parser(&context.raw)?);
        }
        if let Some(parser) = registries.parser(&action_ref.name) {
            context.action_data = Some(parser(&context.raw)?);
        }

        Ok(Self {
            id,
            uuid,
            activation_events,
            condition_ref,
            action_ref,
            extra,
            context,
            condition,
            action,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn activation_events(&self) -> &[ActivationEvent] {
        &self.activation_events
    }

    pub(crate) async fn evaluate(&mut self, event: &Event) -> Result<bool, TriggerError> {
        self.condition.evaluate(&mut self.context, event).await
    }

    pub(crate) async fn fire(&mut self, event: &Event) -> Result<(), TriggerError> {
        self.action.execute(&mut self.context, event).await
    }

    /// The durable form of the trigger's current state.
    pub fn to_record(&self) -> TriggerRecord {
        TriggerRecord {
            id: self.id.clone(),
            uuid: self.uuid.clone(),
            activation_events: self.activation_events.clone(),
            condition: self.condition_ref.clone(),
            action: self.action_ref.clone(),
            context: self.context.raw.clone(),
            extra: self.extra.clone(),
        }
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.id)
            .field("uuid", &self.uuid)
            .field("condition", &self.condition_ref.name)
            .field("action", &self.action_ref.name)
            .field("activation_events", &self.activation_events)
            .finish_non_exhaustive()
    }
}
