//! Carve store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::CarveRow;
use async_trait::async_trait;
use bytes::Bytes;
use carver_core::{CarveListOptions, CarveMetadata};
use carver_storage::{ObjectStore, StorageError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Durable persistence of carve metadata and block payloads.
///
/// Pure CRUD plus the cleanup sweep; protocol validation lives above this
/// layer, and callers are trusted to have performed it.
#[async_trait]
pub trait CarveStore: Send + Sync {
    /// Insert a new carve record. The store assigns the row id and
    /// `created_at`; the returned metadata has `max_block == -1`.
    async fn new_carve(&self, metadata: &CarveMetadata) -> MetadataResult<CarveMetadata>;

    /// Persist mutated fields (name, expired) of an existing carve.
    async fn update_carve(&self, metadata: &CarveMetadata) -> MetadataResult<()>;

    /// Look up a carve by row id.
    async fn carve(&self, carve_id: i64) -> MetadataResult<CarveMetadata>;

    /// Look up a carve by its session credential.
    async fn carve_by_session_id(&self, session_id: &str) -> MetadataResult<CarveMetadata>;

    /// Look up a carve by its human-readable name.
    async fn carve_by_name(&self, name: &str) -> MetadataResult<CarveMetadata>;

    /// List carves ordered by id. `opts.expired` controls whether expired
    /// carves are included.
    async fn list_carves(&self, opts: &CarveListOptions) -> MetadataResult<Vec<CarveMetadata>>;

    /// Store one block's bytes keyed by `(metadata.id, block_id)`.
    ///
    /// Fails with `AlreadyExists` when the block index was already stored,
    /// `InvalidArgument` when the index is outside `[0, block_count)`, and
    /// `Expired` when the carve has been swept.
    async fn new_block(
        &self,
        metadata: &CarveMetadata,
        block_id: i64,
        data: Bytes,
    ) -> MetadataResult<()>;

    /// Fetch one block's raw bytes. Fails with `NotFound` when the block is
    /// absent or the carve has expired.
    async fn get_block(&self, metadata: &CarveMetadata, block_id: i64) -> MetadataResult<Bytes>;

    /// Expire carves older than `retention` as of `now` and delete their
    /// block data. A failure on one carve does not abort the sweep for the
    /// rest; failures are reported in the returned stats.
    async fn cleanup_carves(
        &self,
        now: OffsetDateTime,
        retention: Duration,
    ) -> MetadataResult<CleanupStats>;

    /// Create the database schema. Idempotent.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// Outcome of one cleanup sweep.
#[derive(Debug, Default)]
pub struct CleanupStats {
    /// Carves transitioned to expired.
    pub expired: u64,
    /// Per-carve failure descriptions for carves the sweep could not expire.
    pub errors: Vec<String>,
}

/// Where block payload bytes physically live.
///
/// `Database` keeps the bytes in the block row itself; `Objects` keeps only
/// a tracking row and pushes bytes to an object store, whose per-carve key
/// prefix is deleted in bulk at cleanup time.
pub enum BlockBackend {
    Database,
    Objects(Arc<dyn ObjectStore>),
}

/// SQLite-backed carve store.
pub struct SqliteCarveStore {
    pool: Pool<Sqlite>,
    blocks: BlockBackend,
}

/// Carve select with the derived `max_block` aggregate.
///
/// `max_block` is computed from the block table on every fetch rather than
/// cached, so concurrent block writes can never desynchronize it.
const CARVE_SELECT: &str = "SELECT c.id, c.created_at, c.host_id, c.name, \
     c.block_count, c.block_size, c.carve_size, c.carve_id, c.request_id, \
     c.session_id, c.expired, COALESCE(MAX(b.block_id), -1) AS max_block \
     FROM carves c LEFT JOIN carve_blocks b ON b.carve_id = c.id";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS carves (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    host_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    block_count INTEGER NOT NULL,
    block_size INTEGER NOT NULL,
    carve_size INTEGER NOT NULL,
    carve_id TEXT NOT NULL,
    request_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    expired INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_carves_carve_id ON carves (carve_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_carves_session_id ON carves (session_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_carves_name ON carves (name);
CREATE INDEX IF NOT EXISTS idx_carves_expired_created ON carves (expired, created_at);

CREATE TABLE IF NOT EXISTS carve_blocks (
    carve_id INTEGER NOT NULL REFERENCES carves (id),
    block_id INTEGER NOT NULL,
    data BLOB,
    PRIMARY KEY (carve_id, block_id)
);
"#;

impl SqliteCarveStore {
    /// Open (or create) the store at `path` with the given block backend.
    pub async fn new(path: impl AsRef<Path>, blocks: BlockBackend) -> MetadataResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
            .map_err(MetadataError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // also makes the expiry-check-plus-insert transaction exclusive.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool, blocks };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Object key prefix holding a carve's blocks.
    fn block_prefix(carve_row_id: i64) -> String {
        format!("carves/{carve_row_id}/")
    }

    /// Object key for one block.
    fn block_key(carve_row_id: i64, block_id: i64) -> String {
        format!("carves/{carve_row_id}/{block_id}")
    }

    /// Expire one carve and delete its block data.
    ///
    /// The row deletion and the expired flip commit in one transaction, so a
    /// block insert racing the sweep either lands before it (and its row is
    /// deleted here) or after it (and fails the expiry check in `new_block`).
    /// Rows never leak either way. For object backends the prefix delete runs
    /// after the commit; an object orphaned by a crash in that window is
    /// unreachable, since `get_block` requires the tracking row.
    async fn expire_carve(&self, carve_row_id: i64) -> MetadataResult<u64> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM carve_blocks WHERE carve_id = ?")
            .bind(carve_row_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE carves SET expired = 1 WHERE id = ?")
            .bind(carve_row_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if let BlockBackend::Objects(storage) = &self.blocks {
            storage
                .delete_prefix(&Self::block_prefix(carve_row_id))
                .await?;
        }
        Ok(result.rows_affected())
    }
}

/// Map a unique-constraint violation to `AlreadyExists`, naming the field.
fn map_insert_error(e: sqlx::Error) -> MetadataError {
    if let sqlx::Error::Database(db) = &e {
        let msg = db.message();
        if msg.contains("UNIQUE constraint") {
            let what = if msg.contains("session_id") {
                "session_id"
            } else if msg.contains("carves.carve_id") {
                "carve_id"
            } else if msg.contains("carves.name") {
                "name"
            } else if msg.contains("carve_blocks") {
                "block"
            } else {
                "carve"
            };
            return MetadataError::AlreadyExists(format!("{what} already exists"));
        }
    }
    MetadataError::Database(e)
}

#[async_trait]
impl CarveStore for SqliteCarveStore {
    async fn new_carve(&self, metadata: &CarveMetadata) -> MetadataResult<CarveMetadata> {
        let created_at = OffsetDateTime::now_utc();
        let result = sqlx::query(
            r#"
            INSERT INTO carves (
                created_at, host_id, name, block_count, block_size,
                carve_size, carve_id, request_id, session_id, expired
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(created_at)
        .bind(metadata.host_id)
        .bind(&metadata.name)
        .bind(metadata.block_count)
        .bind(metadata.block_size)
        .bind(metadata.carve_size)
        .bind(&metadata.carve_id)
        .bind(&metadata.request_id)
        .bind(&metadata.session_id)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        self.carve(result.last_insert_rowid()).await
    }

    async fn update_carve(&self, metadata: &CarveMetadata) -> MetadataResult<()> {
        let result = sqlx::query("UPDATE carves SET name = ?, expired = ? WHERE id = ?")
            .bind(&metadata.name)
            .bind(metadata.expired)
            .bind(metadata.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!(
                "carve {} not found",
                metadata.id
            )));
        }
        Ok(())
    }

    async fn carve(&self, carve_id: i64) -> MetadataResult<CarveMetadata> {
        let row = sqlx::query_as::<_, CarveRow>(&format!(
            "{CARVE_SELECT} WHERE c.id = ? GROUP BY c.id"
        ))
        .bind(carve_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| MetadataError::NotFound(format!("carve {carve_id} not found")))?;
        Ok(row.into())
    }

    async fn carve_by_session_id(&self, session_id: &str) -> MetadataResult<CarveMetadata> {
        let row = sqlx::query_as::<_, CarveRow>(&format!(
            "{CARVE_SELECT} WHERE c.session_id = ? GROUP BY c.id"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| MetadataError::NotFound("no carve for session".to_string()))?;
        Ok(row.into())
    }

    async fn carve_by_name(&self, name: &str) -> MetadataResult<CarveMetadata> {
        let row = sqlx::query_as::<_, CarveRow>(&format!(
            "{CARVE_SELECT} WHERE c.name = ? GROUP BY c.id"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| MetadataError::NotFound(format!("carve '{name}' not found")))?;
        Ok(row.into())
    }

    async fn list_carves(&self, opts: &CarveListOptions) -> MetadataResult<Vec<CarveMetadata>> {
        let rows = sqlx::query_as::<_, CarveRow>(&format!(
            "{CARVE_SELECT} WHERE (? OR c.expired = 0) GROUP BY c.id \
             ORDER BY c.id LIMIT ? OFFSET ?"
        ))
        .bind(opts.expired)
        .bind(opts.list_options.limit())
        .bind(opts.list_options.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn new_block(
        &self,
        metadata: &CarveMetadata,
        block_id: i64,
        data: Bytes,
    ) -> MetadataResult<()> {
        if block_id < 0 || block_id >= metadata.block_count {
            return Err(MetadataError::InvalidArgument(format!(
                "block_id {} out of range [0, {})",
                block_id, metadata.block_count
            )));
        }

        // Expiry check, row insert, and (for object backends) the payload
        // write all happen before commit: an aborted upload leaves no row
        // behind, so a half-inserted block never counts toward max_block.
        let mut tx = self.pool.begin().await?;

        let expired: Option<bool> = sqlx::query_scalar("SELECT expired FROM carves WHERE id = ?")
            .bind(metadata.id)
            .fetch_optional(&mut *tx)
            .await?;
        match expired {
            None => {
                return Err(MetadataError::NotFound(format!(
                    "carve {} not found",
                    metadata.id
                )));
            }
            Some(true) => {
                return Err(MetadataError::Expired(format!(
                    "carve {} has expired",
                    metadata.id
                )));
            }
            Some(false) => {}
        }

        match &self.blocks {
            BlockBackend::Database => {
                sqlx::query(
                    "INSERT INTO carve_blocks (carve_id, block_id, data) VALUES (?, ?, ?)",
                )
                .bind(metadata.id)
                .bind(block_id)
                .bind(data.to_vec())
                .execute(&mut *tx)
                .await
                .map_err(map_insert_error)?;
            }
            BlockBackend::Objects(storage) => {
                // The row insert is the uniqueness gate; it runs first so a
                // duplicate upload is rejected before touching storage.
                sqlx::query(
                    "INSERT INTO carve_blocks (carve_id, block_id, data) VALUES (?, ?, NULL)",
                )
                .bind(metadata.id)
                .bind(block_id)
                .execute(&mut *tx)
                .await
                .map_err(map_insert_error)?;

                // Overwrite is safe here: any object at this key is an
                // orphan from an earlier aborted attempt of the same block.
                storage
                    .put(&Self::block_key(metadata.id, block_id), data)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_block(&self, metadata: &CarveMetadata, block_id: i64) -> MetadataResult<Bytes> {
        if metadata.expired {
            return Err(MetadataError::NotFound(format!(
                "block {} of carve {} not found",
                block_id, metadata.id
            )));
        }

        match &self.blocks {
            BlockBackend::Database => {
                let data: Option<Option<Vec<u8>>> = sqlx::query_scalar(
                    "SELECT data FROM carve_blocks WHERE carve_id = ? AND block_id = ?",
                )
                .bind(metadata.id)
                .bind(block_id)
                .fetch_optional(&self.pool)
                .await?;
                match data {
                    Some(Some(bytes)) => Ok(Bytes::from(bytes)),
                    _ => Err(MetadataError::NotFound(format!(
                        "block {} of carve {} not found",
                        block_id, metadata.id
                    ))),
                }
            }
            BlockBackend::Objects(storage) => {
                let tracked: Option<i64> = sqlx::query_scalar(
                    "SELECT 1 FROM carve_blocks WHERE carve_id = ? AND block_id = ?",
                )
                .bind(metadata.id)
                .bind(block_id)
                .fetch_optional(&self.pool)
                .await?;
                if tracked.is_none() {
                    return Err(MetadataError::NotFound(format!(
                        "block {} of carve {} not found",
                        block_id, metadata.id
                    )));
                }
                storage
                    .get(&Self::block_key(metadata.id, block_id))
                    .await
                    .map_err(|e| match e {
                        StorageError::NotFound(_) => MetadataError::NotFound(format!(
                            "block {} of carve {} not found",
                            block_id, metadata.id
                        )),
                        other => other.into(),
                    })
            }
        }
    }

    async fn cleanup_carves(
        &self,
        now: OffsetDateTime,
        retention: Duration,
    ) -> MetadataResult<CleanupStats> {
        let cutoff = now - retention;
        let stale: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM carves WHERE expired = 0 AND created_at < ?")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?;

        let mut stats = CleanupStats::default();
        for (carve_row_id, name) in stale {
            match self.expire_carve(carve_row_id).await {
                Ok(removed) => {
                    tracing::info!(
                        carve_id = carve_row_id,
                        carve_name = %name,
                        blocks_removed = removed,
                        "Expired carve"
                    );
                    stats.expired += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        carve_id = carve_row_id,
                        error = %e,
                        "Failed to expire carve"
                    );
                    stats.errors.push(format!("carve {carve_row_id}: {e}"));
                }
            }
        }

        Ok(stats)
    }

    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
