//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid list options: {0}")]
    InvalidListOptions(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
