//! Worker configuration file.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use triggerflow_engine::{BackendSpec, WorkspaceConfig};

/// Top-level `triggerflow.toml`.
///
/// ```toml
/// workspace = "orders"
/// log_level = "info"
///
/// [storage]
/// backend = "sql"
/// parameters = { url = "sqlite://triggerflow.db?mode=rwc" }
///
/// [engine]
/// max_routing_retries = 5
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub workspace: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_storage")]
    pub storage: BackendSpec,
    #[serde(default)]
    pub engine: WorkspaceConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_storage() -> BackendSpec {
    BackendSpec::new("file", json!({ "path": "./triggerflow-data" }))
}

impl WorkerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: WorkerConfig = toml::from_str(content)?;
        anyhow::ensure!(!config.workspace.is_empty(), "workspace must not be empty");
        Ok(config)
    }
}
