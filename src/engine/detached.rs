// src/engine/detached.rs

//! Fire-and-forget side effects.
//!
//! Some writes (relationship creation for discovered concepts, best-effort
//! status updates in manual mode) must never hold up the caller. They run
//! as spawned tasks whose outcome is only ever logged.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawn `fut` in the background. Failures are logged and dropped.
///
/// The handle is returned for tests; production callers drop it.
pub fn spawn_detached<F>(label: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match fut.await {
            Ok(()) => debug!(task = label, "detached task finished"),
            Err(err) => warn!(task = label, error = %err, "detached task failed"),
        }
    })
}
