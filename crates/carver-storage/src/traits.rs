//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Object store abstraction for block payloads.
///
/// Keys are flat, '/'-separated strings. Carve blocks live under a
/// per-carve prefix so that cleanup can reclaim a whole carve with one
/// `delete_prefix` call.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object atomically, overwriting any existing object.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Put an object only if it doesn't exist. Returns false when the key
    /// was already present (and leaves the existing object untouched).
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Delete every object under a key prefix, returning the number of
    /// objects removed. Must be idempotent: a missing prefix deletes zero.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u64>;

    /// List object keys under a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Static identifier for the backend type (e.g. "s3", "filesystem").
    /// Used for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during server startup so misconfiguration surfaces before the
    /// first upload. The default is a no-op, suitable for local backends.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
