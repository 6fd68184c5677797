//! HTTP request handlers.

pub mod admin;
pub mod carves;
pub mod common;

pub use admin::*;
pub use carves::*;
pub use common::*;
