//! SeaORM-backed workspace storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, DatabaseConnection};

use crate::models::collection_item;

use triggerflow_engine::errors::StorageError;
use triggerflow_engine::traits::Storage;

/// Database-backed [`Storage`]. Every collection of every workspace shares
/// one table keyed by `(workspace, collection, item_id)`.
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Connect to `url` and bring the schema up to date.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let db = crate::connect(url).await.map_err(to_store_err)?;
        crate::run_migrations(&db).await.map_err(to_store_err)?;
        tracing::debug!(url = %url, "sql storage ready");
        Ok(Self::new(Arc::new(db)))
    }
}

fn to_store_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Store {
        message: e.to_string(),
    }
}

#[async_trait]
impl Storage for SeaOrmStorage {
    async fn get(
        &self,
        workspace: &str,
        collection: &str,
    ) -> Result<HashMap<String, String>, StorageError> {
        let models = collection_item::Entity::find()
            .filter(collection_item::Column::Workspace.eq(workspace))
            .filter(collection_item::Column::Collection.eq(collection))
            .all(self.db.as_ref())
            .await
            .map_err(to_store_err)?;

        Ok(models.into_iter().map(|m| (m.item_id, m.value)).collect())
    }

    async fn put(
        &self,
        workspace: &str,
        collection: &str,
        id: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        let now = chrono::Utc::now().naive_utc();
        let model = collection_item::ActiveModel {
            workspace: ActiveValue::Set(workspace.to_string()),
            collection: ActiveValue::Set(collection.to_string()),
            item_id: ActiveValue::Set(id.to_string()),
            value: ActiveValue::Set(value.to_string()),
            updated_at: ActiveValue::Set(now),
        };

        collection_item::Entity::insert(model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::columns([
                    collection_item::Column::Workspace,
                    collection_item::Column::Collection,
                    collection_item::Column::ItemId,
                ])
                .update_columns([
                    collection_item::Column::Value,
                    collection_item::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(to_store_err)?;

        Ok(())
    }

    fn name(&self) -> &str {
        "sql"
    }
}
