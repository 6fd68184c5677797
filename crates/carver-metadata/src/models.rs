//! Database models mapping to the metadata schema.

use carver_core::CarveMetadata;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Carve record joined with its derived highest stored block index.
///
/// `max_block` is produced by the aggregate join in every carve query; it is
/// never a stored column.
#[derive(Debug, Clone, FromRow)]
pub struct CarveRow {
    pub id: i64,
    pub created_at: OffsetDateTime,
    pub host_id: i64,
    pub name: String,
    pub block_count: i64,
    pub block_size: i64,
    pub carve_size: i64,
    pub carve_id: String,
    pub request_id: String,
    pub session_id: String,
    pub expired: bool,
    pub max_block: i64,
}

impl From<CarveRow> for CarveMetadata {
    fn from(row: CarveRow) -> Self {
        CarveMetadata {
            id: row.id,
            created_at: row.created_at,
            host_id: row.host_id,
            name: row.name,
            block_count: row.block_count,
            block_size: row.block_size,
            carve_size: row.carve_size,
            carve_id: row.carve_id,
            request_id: row.request_id,
            session_id: row.session_id,
            expired: row.expired,
            max_block: row.max_block,
        }
    }
}
