//! Event envelope routed by the dispatch loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source recorded on events created inside the engine.
pub const ENGINE_EVENT_SOURCE: &str = "triggerflow";

/// A CloudEvents-shaped envelope.
///
/// Only `subject` and `type` participate in routing; `data` is opaque to the
/// dispatcher and is handed to conditions and actions untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Event {
    pub id: String,
    #[serde(default)]
    pub source: String,
    pub subject: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    /// Create an event with a fresh id, stamped with the current time.
    pub fn new(subject: impl Into<String>, event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: ENGINE_EVENT_SOURCE.to_string(),
            subject: subject.into(),
            event_type: event_type.into(),
            time: Some(Utc::now()),
            data,
        }
    }

    /// Override the producer recorded in `source`.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Override the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}
