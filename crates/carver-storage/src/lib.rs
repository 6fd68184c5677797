//! Object storage backends for carve block payloads.
//!
//! The metadata store keeps block tracking rows in SQLite; when configured
//! for object-backed blocks, the bytes themselves live behind the
//! [`ObjectStore`] trait implemented here for the local filesystem, an
//! in-memory map, and S3-compatible stores.

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use backends::memory::MemoryBackend;
pub use backends::s3::S3Backend;
pub use error::{StorageError, StorageResult};
pub use traits::ObjectStore;

use carver_core::config::BlockStorageConfig;
use std::sync::Arc;

/// Build an object store from configuration.
///
/// Returns `None` for the database block backend, which keeps block bytes in
/// metadata rows and needs no object store at all.
pub async fn from_config(
    config: &BlockStorageConfig,
) -> StorageResult<Option<Arc<dyn ObjectStore>>> {
    match config {
        BlockStorageConfig::Database => Ok(None),
        BlockStorageConfig::Filesystem { root } => {
            let backend = FilesystemBackend::new(root).await?;
            Ok(Some(Arc::new(backend)))
        }
        BlockStorageConfig::S3 {
            bucket,
            region,
            endpoint,
            prefix,
        } => {
            let backend = S3Backend::new(
                bucket.clone(),
                region.clone(),
                endpoint.clone(),
                prefix.clone(),
            )
            .await?;
            Ok(Some(Arc::new(backend)))
        }
    }
}
