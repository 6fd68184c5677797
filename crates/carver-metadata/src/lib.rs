//! Carve metadata persistence.
//!
//! Stores carve records and their uploaded blocks in SQLite. Block payload
//! bytes either live inline in block rows or behind an object store from
//! `carver-storage`, selected at construction via [`BlockBackend`].

pub mod error;
pub mod models;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::CarveRow;
pub use store::{BlockBackend, CarveStore, CleanupStats, SqliteCarveStore};

use carver_core::config::MetadataConfig;
use carver_storage::ObjectStore;
use std::sync::Arc;

/// Build the carve store from configuration.
///
/// `objects` carries the object store when block bytes are configured to
/// live outside the database, `None` otherwise.
pub async fn from_config(
    config: &MetadataConfig,
    objects: Option<Arc<dyn ObjectStore>>,
) -> MetadataResult<Arc<dyn CarveStore>> {
    let blocks = match objects {
        Some(storage) => BlockBackend::Objects(storage),
        None => BlockBackend::Database,
    };
    let store = SqliteCarveStore::new(&config.db_path, blocks).await?;
    Ok(Arc::new(store))
}
