//! Durable trigger record and its JSON codec.
//!
//! The stored layout is:
//!
//! ```text
//! {
//!   "id": "t1",
//!   "uuid": "5f0c…",
//!   "activation_events": [{"subject": "orders", "type": "created"}],
//!   "condition": {"name": "counter_threshold"},
//!   "action": {"name": "pass"},
//!   "context": {"threshold": 3}
//! }
//! ```
//!
//! Fields the engine does not know about, at the top level or inside
//! `condition`/`action`, are carried through decode and encode unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::TriggerCodecError;

/// A `(subject, type)` pair a trigger reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivationEvent {
    pub subject: String,
    #[serde(rename = "type")]
    pub event_type: String,
}

impl ActivationEvent {
    pub fn new(subject: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            event_type: event_type.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}

/// Reference to a named condition or action.
///
/// `name` selects both the function and the context parser run for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRef {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FunctionRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// The durable representation of a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub id: String,
    /// Distinguishes logical versions of the same trigger id.
    pub uuid: String,
    pub activation_events: Vec<ActivationEvent>,
    pub condition: FunctionRef,
    pub action: FunctionRef,
    /// Raw, mutable trigger data. Parsers read it; conditions and actions
    /// update it; checkpoints persist it.
    pub context: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TriggerRecord {
    /// Start a record with a fresh uuid and an empty context.
    pub fn new(id: impl Into<String>, condition: &str, action: &str) -> Self {
        Self {
            id: id.into(),
            uuid: uuid::Uuid::new_v4().to_string(),
            activation_events: Vec::new(),
            condition: FunctionRef::named(condition),
            action: FunctionRef::named(action),
            context: Map::new(),
            extra: Map::new(),
        }
    }

    pub fn activation_event(mut self, subject: &str, event_type: &str) -> Self {
        self.activation_events
            .push(ActivationEvent::new(subject, event_type));
        self
    }

    pub fn context_value(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }
}

/// Decode a stored trigger.
pub fn unmarshal_trigger(data: &[u8]) -> Result<TriggerRecord, TriggerCodecError> {
    let record: TriggerRecord = serde_json::from_slice(data)?;

    if record.id.trim().is_empty() {
        return Err(TriggerCodecError::Invalid {
            message: "trigger id must not be empty".into(),
        });
    }
    if record.condition.name.is_empty() || record.action.name.is_empty() {
        return Err(TriggerCodecError::Invalid {
            message: format!("trigger {} has an unnamed condition or action", record.id),
        });
    }
    if let Some(bad) = record
        .activation_events
        .iter()
        .find(|a| a.subject.is_empty() || a.event_type.is_empty())
    {
        return Err(TriggerCodecError::Invalid {
            message: format!(
                "trigger {} declares an incomplete activation event ({:?}, {:?})",
                record.id, bad.subject, bad.event_type
            ),
        });
    }

    Ok(record)
}

/// Encode a trigger for storage.
pub fn marshal_trigger(record: &TriggerRecord) -> Result<String, TriggerCodecError> {
    Ok(serde_json::to_string(record)?)
}
