//! SQL storage backend for the triggerflow engine.
//!
//! Provides a SeaORM-based [`Storage`](triggerflow_engine::Storage)
//! implementation. Supports SQLite out of the box; other databases work by
//! enabling the matching SeaORM driver feature.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut registries = Registries::with_defaults();
//! triggerflow_storage_oss::register(&mut registries);
//!
//! let workspace = Workspace::builder("orders")
//!     .registries(registries)
//!     .backend(BackendSpec::new("sql", json!({ "url": "sqlite://triggerflow.db?mode=rwc" })))
//!     .build()
//!     .await?;
//! ```

pub mod migrations;
pub mod models;
pub mod stores;

pub use stores::SeaOrmStorage;

use std::sync::Arc;

use sea_orm::{Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;

use triggerflow_engine::errors::StorageError;
use triggerflow_engine::registry::Registries;
use triggerflow_engine::traits::Storage;

/// Backend name [`register`] installs.
pub const SQL_BACKEND: &str = "sql";

/// Connect to a database by URL.
pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(url).await
}

/// Apply all pending migrations.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    migrations::Migrator::up(db, None).await
}

/// Register the `sql` storage backend. Its parameters are `{"url": "..."}`.
pub fn register(registries: &mut Registries) {
    registries.register_storage(SQL_BACKEND, |params| async move {
        let url = url_param(&params)?;
        let storage = SeaOrmStorage::connect(&url).await?;
        Ok::<_, StorageError>(Arc::new(storage) as Arc<dyn Storage>)
    });
}

fn url_param(params: &Value) -> Result<String, StorageError> {
    params
        .get("url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StorageError::Config {
            message: "sql backend requires a non-empty 'url' parameter".into(),
        })
}
