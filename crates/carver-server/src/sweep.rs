//! Background cleanup sweep.

use crate::service::CarveService;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawn the periodic cleanup task.
///
/// The first tick fires immediately, so carves left over from a previous
/// server instance are swept at startup rather than one interval later.
pub fn spawn_cleanup_task(service: CarveService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match service.cleanup().await {
                Ok(stats) => {
                    tracing::debug!(
                        expired = stats.expired,
                        errors = stats.errors.len(),
                        "Cleanup sweep completed"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Cleanup sweep failed");
                }
            }
        }
    })
}
