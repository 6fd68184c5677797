//! S3-compatible storage backend using the AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::traits::ObjectStore;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use bytes::Bytes;
use tracing::instrument;

/// Maximum keys per DeleteObjects request, per the S3 API.
const DELETE_BATCH_SIZE: usize = 1000;

/// S3-compatible object store.
///
/// Carve blocks stored here are reclaimed by listing the carve's key prefix
/// and issuing batched DeleteObjects calls, rather than per-row deletes.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// `endpoint` overrides the AWS endpoint for S3-compatible stores
    /// (MinIO, Ceph RGW). Credentials come from the default AWS chain.
    pub async fn new(
        bucket: String,
        region: String,
        endpoint: Option<String>,
        prefix: Option<String>,
    ) -> StorageResult<Self> {
        if bucket.is_empty() {
            return Err(StorageError::Config("S3 bucket must not be empty".to_string()));
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region));
        if let Some(endpoint) = &endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            // Path-style addressing for S3-compatible endpoints.
            .force_path_style(endpoint.is_some())
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket,
            prefix,
        })
    }

    /// Apply the configured bucket prefix to a key.
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        }
    }

    /// Strip the configured bucket prefix from a listed key.
    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) => key
                .strip_prefix(prefix.trim_end_matches('/'))
                .map(|k| k.trim_start_matches('/'))
                .unwrap_or(key),
            None => key,
        }
    }

    /// List full (unstripped) keys under a prefix, following pagination.
    async fn list_full_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(self.full_key(prefix));
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| StorageError::S3(Box::new(e)))?;

            for object in resp.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match resp.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(false)
                } else {
                    Err(StorageError::S3(Box::new(e)))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::S3(Box::new(e))
                }
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?;
        Ok(data.into_bytes())
    }

    #[instrument(skip(self, data))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .body(data.into())
            .send()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?;
        Ok(())
    }

    #[instrument(skip(self, data))]
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        // If-None-Match makes the existence check atomic on S3's side.
        match self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .if_none_match("*")
            .body(data.into())
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let precondition_failed = e
                    .raw_response()
                    .is_some_and(|r| r.status().as_u16() == 412);
                if precondition_failed {
                    Ok(false)
                } else {
                    Err(StorageError::S3(Box::new(e)))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u64> {
        let keys = self.list_full_keys(prefix).await?;
        let mut removed = 0u64;

        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            let identifiers: Vec<ObjectIdentifier> = batch
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| StorageError::S3(Box::new(e)))
                })
                .collect::<StorageResult<_>>()?;

            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .quiet(true)
                .build()
                .map_err(|e| StorageError::S3(Box::new(e)))?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| StorageError::S3(Box::new(e)))?;

            removed += batch.len() as u64;
        }

        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let keys = self.list_full_keys(prefix).await?;
        Ok(keys
            .iter()
            .map(|k| self.strip_prefix(k).to_string())
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?;
        Ok(())
    }
}
