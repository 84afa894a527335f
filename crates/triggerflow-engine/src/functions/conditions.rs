//! Built-in conditions.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::context::TriggerContext;
use crate::errors::{ParserError, TriggerError};
use crate::traits::Condition;
use crate::types::Event;

pub const TRUE: &str = "true";
pub const COUNTER_THRESHOLD: &str = "counter_threshold";
pub const DATA_MATCH: &str = "data_match";

/// Fires on every event.
pub struct TrueCondition;

#[async_trait]
impl Condition for TrueCondition {
    async fn evaluate(
        &self,
        _ctx: &mut TriggerContext,
        _event: &Event,
    ) -> Result<bool, TriggerError> {
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// counter_threshold
// ---------------------------------------------------------------------------

/// Counts activations in `context.counter` and fires once the count reaches
/// `context.threshold`.
///
/// The counter lives in the raw context, so it survives restarts through the
/// checkpoint written after each fire.
pub struct CounterThreshold;

pub fn parse_counter_threshold(raw: &Map<String, Value>) -> Result<Value, ParserError> {
    let threshold = raw
        .get("threshold")
        .and_then(Value::as_u64)
        .ok_or_else(|| ParserError::Invalid {
            parser: COUNTER_THRESHOLD.into(),
            message: "context.threshold must be a non-negative integer".into(),
        })?;
    Ok(json!({ "threshold": threshold }))
}

#[async_trait]
impl Condition for CounterThreshold {
    async fn evaluate(
        &self,
        ctx: &mut TriggerContext,
        _event: &Event,
    ) -> Result<bool, TriggerError> {
        let threshold = ctx
            .condition_data
            .as_ref()
            .and_then(|data| data.get("threshold"))
            .and_then(Value::as_u64)
            .ok_or_else(|| TriggerError::Config {
                message: "counter_threshold has no parsed threshold".into(),
            })?;

        let counter = ctx.raw.get("counter").and_then(Value::as_u64).unwrap_or(0) + 1;
        ctx.raw.insert("counter".into(), json!(counter));
        Ok(counter >= threshold)
    }
}

// ---------------------------------------------------------------------------
// data_match
// ---------------------------------------------------------------------------

/// Fires when every key of `context.match` equals the same key of the event
/// data.
pub struct DataMatch;

pub fn parse_data_match(raw: &Map<String, Value>) -> Result<Value, ParserError> {
    match raw.get("match") {
        Some(Value::Object(expected)) => Ok(Value::Object(expected.clone())),
        _ => Err(ParserError::Invalid {
            parser: DATA_MATCH.into(),
            message: "context.match must be an object".into(),
        }),
    }
}

#[async_trait]
impl Condition for DataMatch {
    async fn evaluate(
        &self,
        ctx: &mut TriggerContext,
        event: &Event,
    ) -> Result<bool, TriggerError> {
        let Some(Value::Object(expected)) = ctx.condition_data.as_ref() else {
            return Err(TriggerError::Config {
                message: "data_match has no parsed match object".into(),
            });
        };
        Ok(expected
            .iter()
            .all(|(key, value)| event.data.get(key) == Some(value)))
    }
}
