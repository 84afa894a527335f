//! File-system backed storage.
//!
//! Layout:
//! ```text
//! {base_dir}/{workspace}/{collection}/{id}.json
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::StorageError;
use crate::traits::Storage;

/// Parameters accepted by the `file` storage backend.
#[derive(Debug, Deserialize)]
struct FileStorageParams {
    path: PathBuf,
}

/// Storage that keeps one JSON file per item.
///
/// Writes go to a temp file that is renamed over the target, so a reader
/// never sees a partial item.
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    /// Create a `FileStorage` rooted at `base_dir`, creating it if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|e| StorageError::Store {
            message: format!("failed to create storage directory: {e}"),
        })?;
        Ok(Self { base_dir })
    }

    /// Build from backend parameters `{"path": "..."}`.
    pub fn from_params(params: Value) -> Result<Self, StorageError> {
        let params: FileStorageParams =
            serde_json::from_value(params).map_err(|e| StorageError::Config {
                message: format!("file storage parameters: {e}"),
            })?;
        Self::new(params.path)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn collection_dir(&self, workspace: &str, collection: &str) -> Result<PathBuf, StorageError> {
        Ok(self
            .base_dir
            .join(checked_segment(workspace)?)
            .join(checked_segment(collection)?))
    }
}

/// Reject keys that would escape their directory.
fn checked_segment(key: &str) -> Result<&str, StorageError> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\', '\0']) {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(key)
}

/// Atomic write: write a sibling temp file, then rename over the target.
async fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, data)
        .await
        .map_err(|e| StorageError::Store {
            message: format!("failed to write temp file: {e}"),
        })?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| StorageError::Store {
            message: format!("failed to rename temp file: {e}"),
        })
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(
        &self,
        workspace: &str,
        collection: &str,
    ) -> Result<HashMap<String, String>, StorageError> {
        let dir = self.collection_dir(workspace, collection)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(StorageError::Store {
                    message: format!("failed to read {}: {e}", dir.display()),
                })
            }
        };

        let mut items = HashMap::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| StorageError::Store {
            message: format!("failed to read dir entry: {e}"),
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let data = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StorageError::Store {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
            items.insert(id.to_string(), data);
        }
        Ok(items)
    }

    async fn put(
        &self,
        workspace: &str,
        collection: &str,
        id: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        let dir = self.collection_dir(workspace, collection)?;
        let id = checked_segment(id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::Store {
                message: format!("failed to create {}: {e}", dir.display()),
            })?;
        atomic_write(&dir.join(format!("{id}.json")), value.as_bytes()).await
    }

    fn name(&self) -> &str {
        "file"
    }
}
