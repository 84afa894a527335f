//! In-memory storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::StorageError;
use crate::traits::Storage;

/// Items of one collection: item id → serialized JSON.
type Collection = HashMap<String, String>;

/// Storage backed by a `HashMap` protected by `RwLock`.
///
/// Keyed by `(workspace, collection)`. Contents vanish with the process.
pub struct InMemoryStorage {
    collections: RwLock<HashMap<(String, String), Collection>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get(
        &self,
        workspace: &str,
        collection: &str,
    ) -> Result<HashMap<String, String>, StorageError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(&(workspace.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn put(
        &self,
        workspace: &str,
        collection: &str,
        id: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        let mut guard = self.collections.write().await;
        guard
            .entry((workspace.to_string(), collection.to_string()))
            .or_default()
            .insert(id.to_string(), value.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
