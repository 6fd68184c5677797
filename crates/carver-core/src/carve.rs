//! Carve metadata and upload payloads.

use crate::error::{Error, Result};
use crate::list_options::ListOptions;
use crate::{MAX_BLOCK_SIZE, MAX_CARVE_SIZE};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Metadata for one carving session.
///
/// One record exists per carve. `max_block` is derived from the set of stored
/// blocks at read time and is never persisted directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CarveMetadata {
    /// Auto-increment row id assigned by the store.
    pub id: i64,
    /// Insertion timestamp, set by the store.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Identifier of the host that initiated the carve.
    pub host_id: i64,
    /// Human-readable name, composed by the service at begin time.
    pub name: String,
    /// Number of blocks the agent declared it will upload.
    pub block_count: i64,
    /// Declared size of each block in bytes; the final block may be shorter.
    pub block_size: i64,
    /// Declared total size of the carve in bytes.
    pub carve_size: i64,
    /// Agent-generated correlation token for the carve.
    pub carve_id: String,
    /// Identifier of the request that kicked off the carve.
    pub request_id: String,
    /// Server-generated credential that block uploads must present.
    pub session_id: String,
    /// Whether the carve has expired and its block data has been purged.
    pub expired: bool,

    /// Highest block index currently stored, or -1 when no blocks exist.
    /// Computed from the block table on every metadata fetch.
    pub max_block: i64,
}

impl CarveMetadata {
    /// Whether every declared block has been stored.
    pub fn blocks_complete(&self) -> bool {
        self.max_block == self.block_count - 1
    }

    /// Expected byte length of the block at `block_id`.
    ///
    /// All blocks are `block_size` bytes except the last, which holds
    /// whatever remains of `carve_size`.
    pub fn expected_block_size(&self, block_id: i64) -> i64 {
        if block_id == self.block_count - 1 {
            self.carve_size - block_id * self.block_size
        } else {
            self.block_size
        }
    }

    /// Current lifecycle state of the carve.
    pub fn state(&self) -> CarveState {
        if self.expired {
            CarveState::Expired
        } else if self.max_block < 0 {
            CarveState::Pending
        } else if self.blocks_complete() {
            CarveState::Complete
        } else {
            CarveState::Uploading
        }
    }

    /// Authorization subject type for policy checks.
    pub fn authz_type(&self) -> &'static str {
        crate::CARVE_AUTHZ_TYPE
    }
}

/// Lifecycle state of a carve. `Expired` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarveState {
    Pending,
    Uploading,
    Complete,
    Expired,
}

/// Payload for starting a new carve.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CarveBeginPayload {
    pub block_count: i64,
    pub block_size: i64,
    pub carve_size: i64,
    pub carve_id: String,
    pub request_id: String,
}

impl CarveBeginPayload {
    /// Validate the declared geometry of the carve.
    ///
    /// The declared total must fit within the declared chunking, and both
    /// must stay under the protocol limits.
    pub fn validate(&self) -> Result<()> {
        if self.block_count <= 0 {
            return Err(Error::InvalidArgument(format!(
                "block_count must be positive, got {}",
                self.block_count
            )));
        }
        if self.block_size <= 0 {
            return Err(Error::InvalidArgument(format!(
                "block_size must be positive, got {}",
                self.block_size
            )));
        }
        if self.carve_size <= 0 {
            return Err(Error::InvalidArgument(format!(
                "carve_size must be positive, got {}",
                self.carve_size
            )));
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidArgument(format!(
                "block_size {} exceeds maximum {}",
                self.block_size, MAX_BLOCK_SIZE
            )));
        }
        if self.carve_size > MAX_CARVE_SIZE {
            return Err(Error::InvalidArgument(format!(
                "carve_size {} exceeds maximum {}",
                self.carve_size, MAX_CARVE_SIZE
            )));
        }
        // checked_mul: both factors are attacker-controlled
        let declared_capacity = self
            .block_count
            .checked_mul(self.block_size)
            .ok_or_else(|| {
                Error::InvalidArgument("block_count * block_size overflows".to_string())
            })?;
        if self.carve_size > declared_capacity {
            return Err(Error::InvalidArgument(format!(
                "carve_size {} exceeds block_count * block_size ({})",
                self.carve_size, declared_capacity
            )));
        }
        if self.carve_id.is_empty() {
            return Err(Error::InvalidArgument("carve_id must not be empty".to_string()));
        }
        if self.request_id.is_empty() {
            return Err(Error::InvalidArgument(
                "request_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Payload for uploading one block of an in-progress carve.
///
/// `session_id` is the sole upload credential; `request_id` must match the
/// value stored at begin time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CarveBlockPayload {
    pub session_id: String,
    pub request_id: String,
    pub block_id: i64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// List options for carve queries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CarveListOptions {
    #[serde(flatten)]
    pub list_options: ListOptions,

    /// Whether to include expired carves in the results.
    #[serde(default)]
    pub expired: bool,
}

/// Base64 (de)serialization for raw block bytes in JSON payloads.
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
