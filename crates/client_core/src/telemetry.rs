//! Fire-and-forget usage telemetry.

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::BackendClient;

/// Records one access on a background task. Failures are logged and never
/// retried; callers may drop the handle.
pub fn spawn_access_record(backend: BackendClient) -> JoinHandle<()> {
    tokio::spawn(async move {
        match backend.record_access().await {
            Ok(()) => debug!("telemetry: access recorded"),
            Err(err) => warn!(error = %err, "telemetry: failed to record access"),
        }
    })
}

#[cfg(test)]
#[path = "tests/telemetry_tests.rs"]
mod tests;
