//! Core domain types for the carver file-carving server.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Carve metadata and its lifecycle state
//! - Begin/block upload payloads and their validation
//! - Session identifier generation
//! - List options for operator queries
//! - Shared configuration types

pub mod carve;
pub mod config;
pub mod error;
pub mod list_options;
pub mod session;

pub use carve::{
    CarveBeginPayload, CarveBlockPayload, CarveListOptions, CarveMetadata, CarveState,
};
pub use error::{Error, Result};
pub use list_options::ListOptions;
pub use session::generate_session_id;

/// Authorization subject type for carve objects.
pub const CARVE_AUTHZ_TYPE: &str = "carve";

/// Maximum declared total carve size: 8 GiB.
pub const MAX_CARVE_SIZE: i64 = 8 * 1024 * 1024 * 1024;

/// Maximum declared block size: 256 MiB.
pub const MAX_BLOCK_SIZE: i64 = 256 * 1024 * 1024;
