//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub blocks: BlockStorageConfig,
    #[serde(default)]
    pub carve: CarveConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Configuration for tests: temp-friendly defaults and known token hashes.
    ///
    /// **For testing only.** The agent token is "test-agent-token" (host 1)
    /// and the operator token is "test-operator-token".
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            metadata: MetadataConfig::default(),
            blocks: BlockStorageConfig::Database,
            carve: CarveConfig {
                // Disable the background sweep so tests control the clock.
                cleanup_enabled: false,
                ..CarveConfig::default()
            },
            auth: AuthConfig {
                operator_token_hash:
                    // SHA256 of "test-operator-token"
                    "21a41ec35ffe053418f5ebab652c9b4cb07a643a9100640d18b635e0df503928"
                        .to_string(),
                agents: vec![AgentTokenConfig {
                    // SHA256 of "test-agent-token"
                    token_hash:
                        "35b2bb3a5b4d34df22a92be43937cc2f80cd28a56058987f353eead93101074a"
                            .to_string(),
                    host_id: 1,
                }],
            },
        }
    }
}

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Where block payloads are physically held.
///
/// `Database` keeps block bytes as rows next to the metadata; the object
/// variants keep only tracking rows in the database and push the bytes to an
/// object store, where cleanup deletes the carve's key prefix in bulk.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BlockStorageConfig {
    #[default]
    Database,
    Filesystem {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        prefix: Option<String>,
    },
}

/// Carve lifecycle configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CarveConfig {
    /// Hours a carve is retained before the sweep expires it.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    /// Interval between automatic cleanup sweeps, in seconds.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Whether the background sweep task runs at all.
    #[serde(default = "default_cleanup_enabled")]
    pub cleanup_enabled: bool,
}

impl CarveConfig {
    /// Retention window as a duration.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    /// Sweep interval as a duration.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for CarveConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            cleanup_enabled: default_cleanup_enabled(),
        }
    }
}

/// Token configuration for callers.
///
/// Host authentication proper is outside this server; tokens here are the
/// already-provisioned credentials the deployment hands out. Hashes are
/// SHA256 hex (64 characters): `echo -n "your-token" | sha256sum`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Hash of the operator token used for read/admin endpoints.
    pub operator_token_hash: String,
    /// Agent tokens, each bound to the host id it authenticates.
    #[serde(default)]
    pub agents: Vec<AgentTokenConfig>,
}

/// One agent credential and the host identity it carries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentTokenConfig {
    pub token_hash: String,
    pub host_id: i64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("carver.db")
}

fn default_retention_hours() -> u64 {
    24
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_cleanup_enabled() -> bool {
    true
}
