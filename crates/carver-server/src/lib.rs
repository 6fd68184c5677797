//! HTTP API server for the carver file-carving service.
//!
//! This crate provides the HTTP control plane:
//! - Carve begin and block upload endpoints for agents
//! - Carve listing and block retrieval for operators
//! - Manual and periodic cleanup of carves past retention

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod service;
pub mod state;
pub mod sweep;

pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use service::CarveService;
pub use state::AppState;
