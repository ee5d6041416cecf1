//! Storage adapter selection.
//!
//! The engines only ever see `Arc<dyn Store>`; which adapter sits behind it
//! is decided here from `[db].backend`.

use std::sync::Arc;

use anyhow::Result;
use formwork_core::store::memory::InMemoryStore;
use formwork_core::store::Store;

use crate::config::{Config, StoreBackend};
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Opens the configured store. The SQLite schema is applied on open so a
/// fresh database file works without a separate `init`.
pub async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    match config.db.backend {
        StoreBackend::Sqlite => {
            let pool = db::connect(&config.db).await?;
            migrate::apply_schema(&pool).await?;
            tracing::debug!(path = %config.db.path.display(), "opened sqlite store");
            Ok(Arc::new(SqliteStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::debug!("opened in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}
