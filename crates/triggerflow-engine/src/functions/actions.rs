//! Built-in actions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::TriggerContext;
use crate::errors::{ParserError, TriggerError};
use crate::traits::Action;
use crate::types::Event;

pub const PASS: &str = "pass";
pub const EMIT_EVENT: &str = "emit_event";

/// Does nothing. Useful when only the checkpoint side effect matters.
pub struct PassAction;

#[async_trait]
impl Action for PassAction {
    async fn execute(&self, _ctx: &mut TriggerContext, _event: &Event) -> Result<(), TriggerError> {
        Ok(())
    }
}

/// Target of an `emit_event` action, read from `context.emit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitTarget {
    pub subject: String,
    #[serde(rename = "type")]
    pub event_type: String,
}

/// Publishes a new event carrying the triggering event's data back into the
/// workspace sink, letting triggers chain.
pub struct EmitEventAction;

pub fn parse_emit_event(raw: &Map<String, Value>) -> Result<Value, ParserError> {
    let invalid = |message: String| ParserError::Invalid {
        parser: EMIT_EVENT.into(),
        message,
    };
    let emit = raw
        .get("emit")
        .ok_or_else(|| invalid("context.emit is missing".into()))?;
    let target: EmitTarget = serde_json::from_value(emit.clone())
        .map_err(|e| invalid(format!("context.emit: {e}")))?;
    serde_json::to_value(target).map_err(|e| invalid(e.to_string()))
}

#[async_trait]
impl Action for EmitEventAction {
    async fn execute(&self, ctx: &mut TriggerContext, event: &Event) -> Result<(), TriggerError> {
        let target: EmitTarget = ctx
            .action_data
            .clone()
            .ok_or_else(|| TriggerError::Config {
                message: "emit_event has no parsed target".into(),
            })
            .and_then(|data| {
                serde_json::from_value(data).map_err(|e| TriggerError::Config {
                    message: format!("emit_event target: {e}"),
                })
            })?;

        let emitted = Event::new(target.subject, target.event_type, event.data.clone());
        tracing::debug!(
            workspace = %ctx.workspace(),
            cause = %event.id,
            event_id = %emitted.id,
            "emitting event"
        );
        ctx.emit(emitted).await
    }
}
