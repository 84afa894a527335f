//! Writers for the storage records a workspace bootstraps from.

use chrono::Utc;
use serde_json::{json, Value};

use crate::traits::Storage;
use crate::types::{
    collections, marshal_trigger, EventSourceDescriptor, TriggerRecord, REGISTRY_WORKSPACE,
};
use crate::workspace::WorkspaceError;

/// Add `workspace` to the workspace registry.
pub async fn register_workspace(
    storage: &dyn Storage,
    workspace: &str,
) -> Result<(), WorkspaceError> {
    let entry = json!({ "name": workspace, "registered_at": Utc::now() });
    storage
        .put(REGISTRY_WORKSPACE, collections::WORKSPACES, workspace, &entry.to_string())
        .await?;
    tracing::info!(workspace = %workspace, "workspace registered");
    Ok(())
}

/// Store `record` under its id, replacing any previous version.
pub async fn put_trigger(
    storage: &dyn Storage,
    workspace: &str,
    record: &TriggerRecord,
) -> Result<(), WorkspaceError> {
    let value = marshal_trigger(record)?;
    storage
        .put(workspace, collections::TRIGGERS, &record.id, &value)
        .await?;
    Ok(())
}

/// Store an event source under its name.
pub async fn put_event_source(
    storage: &dyn Storage,
    workspace: &str,
    descriptor: &EventSourceDescriptor,
) -> Result<(), WorkspaceError> {
    if descriptor.name.is_empty() {
        return Err(WorkspaceError::EventSourceDescriptor {
            name: String::new(),
            message: "event source name must not be empty".into(),
        });
    }
    let value =
        serde_json::to_string(descriptor).map_err(|e| WorkspaceError::EventSourceDescriptor {
            name: descriptor.name.clone(),
            message: e.to_string(),
        })?;
    storage
        .put(workspace, collections::EVENT_SOURCES, &descriptor.name, &value)
        .await?;
    Ok(())
}

/// Store one global context entry.
pub async fn put_global(
    storage: &dyn Storage,
    workspace: &str,
    key: &str,
    value: &Value,
) -> Result<(), WorkspaceError> {
    storage
        .put(workspace, collections::GLOBAL_CONTEXT, key, &value.to_string())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::InMemoryStorage;
    use crate::types::unmarshal_trigger;

    #[tokio::test]
    async fn written_records_read_back() {
        let storage = InMemoryStorage::new();
        register_workspace(&storage, "ws").await.unwrap();
        put_trigger(&storage, "ws", &TriggerRecord::new("t1", "true", "pass")).await.unwrap();
        put_event_source(
            &storage,
            "ws",
            &EventSourceDescriptor::new("file", "orders", json!({"path": "/tmp/x"})),
        )
        .await
        .unwrap();
        put_global(&storage, "ws", "region", &json!("eu")).await.unwrap();

        let workspaces = storage.get(REGISTRY_WORKSPACE, collections::WORKSPACES).await.unwrap();
        assert!(workspaces.contains_key("ws"));

        let triggers = storage.get("ws", collections::TRIGGERS).await.unwrap();
        assert_eq!(unmarshal_trigger(triggers["t1"].as_bytes()).unwrap().id, "t1");

        let sources = storage.get("ws", collections::EVENT_SOURCES).await.unwrap();
        let descriptor: EventSourceDescriptor = serde_json::from_str(&sources["orders"]).unwrap();
        assert_eq!(descriptor.class, "file");

        let global = storage.get("ws", collections::GLOBAL_CONTEXT).await.unwrap();
        assert_eq!(global["region"], "\"eu\"");
    }

    #[tokio::test]
    async fn unnamed_event_source_is_rejected() {
        let storage = InMemoryStorage::new();
        let descriptor = EventSourceDescriptor::new("file", "", Value::Null);
        let err = put_event_source(&storage, "ws", &descriptor)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::EventSourceDescriptor { .. }));
    }
}
