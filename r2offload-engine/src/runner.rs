//! Caller-owned processing loop.

use crate::coordinator::{BulkCoordinator, Progress};
use crate::error::EngineResult;
use std::time::Duration;

/// Calls [`BulkCoordinator::process_one`] until it reports `done`, sleeping
/// `pause` between items, and returns the final progress.
pub async fn drive(coordinator: &BulkCoordinator, pause: Duration) -> EngineResult<Progress> {
    loop {
        let outcome = coordinator.process_one().await?;
        if outcome.done {
            break;
        }
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    coordinator.get_progress()
}
