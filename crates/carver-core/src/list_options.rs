//! Pagination options shared by list endpoints.

use serde::{Deserialize, Serialize};

/// Maximum page size accepted from callers.
pub const MAX_PER_PAGE: u64 = 1000;

/// Pagination for list queries.
///
/// `per_page == 0` means unlimited: the whole result set is returned in one
/// page. Pages are zero-indexed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListOptions {
    /// Zero-indexed page to return.
    #[serde(default)]
    pub page: u64,
    /// Results per page; 0 disables pagination.
    #[serde(default)]
    pub per_page: u64,
}

impl ListOptions {
    /// Clamp the page size to the server maximum.
    pub fn normalize(&self) -> Self {
        Self {
            page: self.page,
            per_page: self.per_page.min(MAX_PER_PAGE),
        }
    }

    /// SQL LIMIT value, or `i64::MAX` when pagination is disabled.
    pub fn limit(&self) -> i64 {
        let normalized = self.normalize();
        if normalized.per_page == 0 {
            i64::MAX
        } else {
            normalized.per_page as i64
        }
    }

    /// SQL OFFSET value.
    pub fn offset(&self) -> i64 {
        let normalized = self.normalize();
        (normalized.page.saturating_mul(normalized.per_page)) as i64
    }
}
