//! Workspace tuning and storage backend selection.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Runtime configuration for a [`Workspace`](super::Workspace).
///
/// Every field has a default, so a partial TOML or JSON table deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Capacity of the shared event sink. Default: 10 000.
    pub sink_capacity: usize,
    /// Routing attempts for an event that matches no trigger before it is
    /// dropped. Default: 3.
    pub max_routing_retries: u32,
    /// Delay before an unrouted event is re-submitted. Default: 100.
    pub routing_retry_backoff_ms: u64,
    /// How long shutdown waits for event sources to stop. Default: 5 000.
    pub shutdown_grace_ms: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            sink_capacity: 10_000,
            max_routing_retries: 3,
            routing_retry_backoff_ms: 100,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl WorkspaceConfig {
    pub fn routing_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.routing_retry_backoff_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Names a registered storage backend and its opaque parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSpec {
    pub backend: String,
    #[serde(default)]
    pub parameters: Value,
}

impl BackendSpec {
    pub fn new(backend: impl Into<String>, parameters: Value) -> Self {
        Self {
            backend: backend.into(),
            parameters,
        }
    }
}
