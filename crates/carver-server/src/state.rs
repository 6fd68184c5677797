//! Application state shared across handlers.

use crate::service::CarveService;
use carver_core::config::AppConfig;
use carver_metadata::CarveStore;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Carve protocol service.
    pub service: CarveService,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: AppConfig, store: Arc<dyn CarveStore>) -> Self {
        let service = CarveService::new(store, config.carve.retention());
        Self {
            config: Arc::new(config),
            service,
        }
    }

    /// Interval for the background cleanup sweep, or `None` when disabled.
    ///
    /// A zero interval would panic tokio's interval timer, so it falls back
    /// to sixty seconds with a warning.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        if !self.config.carve.cleanup_enabled {
            return None;
        }
        let interval = self.config.carve.cleanup_interval();
        if interval.is_zero() {
            tracing::warn!("carve.cleanup_interval_secs is 0, using default of 60 seconds");
            Some(Duration::from_secs(60))
        } else {
            Some(interval)
        }
    }
}
