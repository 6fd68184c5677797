//! Carve protocol logic, independent of the HTTP layer.

use crate::error::{ApiError, ApiResult};
use bytes::Bytes;
use carver_core::{
    CarveBeginPayload, CarveBlockPayload, CarveListOptions, CarveMetadata, generate_session_id,
};
use carver_metadata::{CarveStore, CleanupStats, MetadataError};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Implements the carve protocol on top of a [`CarveStore`].
#[derive(Clone)]
pub struct CarveService {
    store: Arc<dyn CarveStore>,
    retention: Duration,
}

impl CarveService {
    pub fn new(store: Arc<dyn CarveStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    pub fn store(&self) -> &Arc<dyn CarveStore> {
        &self.store
    }

    /// Start a new carve for `host_id` and mint its session credential.
    pub async fn carve_begin(
        &self,
        host_id: i64,
        payload: &CarveBeginPayload,
    ) -> ApiResult<CarveMetadata> {
        payload
            .validate()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        let now = OffsetDateTime::now_utc();
        let timestamp = now
            .format(&Rfc3339)
            .map_err(|e| ApiError::Internal(format!("timestamp format: {e}")))?;
        let name = format!("host{}-{}-{}", host_id, timestamp, payload.request_id);
        let session_id = generate_session_id();

        let metadata = CarveMetadata {
            id: 0,
            created_at: now,
            host_id,
            name,
            block_count: payload.block_count,
            block_size: payload.block_size,
            carve_size: payload.carve_size,
            carve_id: payload.carve_id.clone(),
            request_id: payload.request_id.clone(),
            session_id,
            expired: false,
            max_block: -1,
        };

        let created = self.store.new_carve(&metadata).await.map_err(|e| match e {
            MetadataError::AlreadyExists(msg) => ApiError::Conflict(msg),
            other => other.into(),
        })?;

        tracing::info!(
            carve_id = %created.carve_id,
            carve_name = %created.name,
            host_id,
            block_count = created.block_count,
            carve_size = created.carve_size,
            "Carve started"
        );

        Ok(created)
    }

    /// Accept one block of an in-progress carve.
    ///
    /// The session id is the sole credential here; lookup failures and
    /// request id mismatches both surface as `Unauthorized` so a caller
    /// probing session ids learns nothing about which ones exist.
    pub async fn carve_block(&self, payload: &CarveBlockPayload) -> ApiResult<CarveMetadata> {
        let carve = self
            .store
            .carve_by_session_id(&payload.session_id)
            .await
            .map_err(|e| match e {
                MetadataError::NotFound(_) => {
                    ApiError::Unauthorized("invalid session".to_string())
                }
                other => other.into(),
            })?;

        if payload.request_id != carve.request_id {
            return Err(ApiError::Unauthorized("invalid session".to_string()));
        }

        if carve.expired {
            return Err(ApiError::CarveExpired);
        }

        if payload.block_id < 0 || payload.block_id >= carve.block_count {
            return Err(ApiError::BadRequest(format!(
                "block_id {} out of range [0, {})",
                payload.block_id, carve.block_count
            )));
        }

        let expected = carve.expected_block_size(payload.block_id);
        if payload.data.len() as i64 != expected {
            return Err(ApiError::BadRequest(format!(
                "block {} must be {} bytes, got {}",
                payload.block_id,
                expected,
                payload.data.len()
            )));
        }

        self.store
            .new_block(&carve, payload.block_id, Bytes::from(payload.data.clone()))
            .await
            .map_err(|e| match e {
                MetadataError::AlreadyExists(_) => ApiError::Conflict(format!(
                    "block {} already uploaded",
                    payload.block_id
                )),
                MetadataError::Expired(_) => ApiError::CarveExpired,
                other => other.into(),
            })?;

        tracing::debug!(
            carve_id = %carve.carve_id,
            block_id = payload.block_id,
            bytes = payload.data.len(),
            "Block stored"
        );

        // Refetch so the caller sees the updated max_block.
        Ok(self.store.carve(carve.id).await?)
    }

    /// Look up a carve by row id.
    pub async fn get_carve(&self, carve_id: i64) -> ApiResult<CarveMetadata> {
        Ok(self.store.carve(carve_id).await?)
    }

    /// Look up a carve by name.
    pub async fn get_carve_by_name(&self, name: &str) -> ApiResult<CarveMetadata> {
        Ok(self.store.carve_by_name(name).await?)
    }

    /// List carves for operator review.
    pub async fn list_carves(&self, opts: &CarveListOptions) -> ApiResult<Vec<CarveMetadata>> {
        Ok(self.store.list_carves(opts).await?)
    }

    /// Fetch one stored block of a carve.
    pub async fn get_block(&self, carve_id: i64, block_id: i64) -> ApiResult<Bytes> {
        let carve = self.store.carve(carve_id).await?;
        // Expired carves have no readable data left; reads see plain absence.
        if carve.expired {
            return Err(ApiError::NotFound(format!(
                "block {block_id} for carve {carve_id}"
            )));
        }
        if block_id < 0 || block_id > carve.max_block {
            return Err(ApiError::NotFound(format!(
                "block {block_id} not yet available"
            )));
        }
        Ok(self.store.get_block(&carve, block_id).await?)
    }

    /// Run one cleanup sweep with the configured retention window.
    pub async fn cleanup(&self) -> ApiResult<CleanupStats> {
        let stats = self
            .store
            .cleanup_carves(OffsetDateTime::now_utc(), self.retention)
            .await?;
        if stats.expired > 0 || !stats.errors.is_empty() {
            tracing::info!(
                expired = stats.expired,
                errors = stats.errors.len(),
                "Cleanup sweep finished"
            );
        }
        Ok(stats)
    }
}
