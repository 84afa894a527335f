//! Stored event source descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item of a workspace's `event_sources` collection.
///
/// `class` selects the registered constructor; `parameters` is handed to it
/// untouched. The capitalised field names written by older tooling are
/// accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSourceDescriptor {
    #[serde(alias = "Class")]
    pub class: String,
    /// Instance name; defaults to the item id it is stored under.
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Parameters")]
    pub parameters: Value,
}

impl EventSourceDescriptor {
    pub fn new(class: impl Into<String>, name: impl Into<String>, parameters: Value) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            parameters,
        }
    }
}
