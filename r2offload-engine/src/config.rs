//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prepended to a subject's relative path to form its remote key.
    pub key_prefix: String,

    /// How long a cancellation request stays in effect.
    pub cancel_ttl_secs: u64,

    /// Entries kept in the activity log.
    pub activity_capacity: usize,

    /// Terminal queue rows older than this are left out of progress counts
    /// and are not retried in bulk.
    pub progress_window_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_prefix: "uploads/".to_string(),
            cancel_ttl_secs: 300, // 5 minutes
            activity_capacity: r2offload_storage::DEFAULT_ACTIVITY_CAPACITY,
            progress_window_hours: r2offload_storage::PROGRESS_WINDOW_HOURS,
        }
    }
}

impl EngineConfig {
    pub fn cancel_ttl(&self) -> Duration {
        Duration::from_secs(self.cancel_ttl_secs)
    }

    pub fn progress_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.progress_window_hours.max(0))
    }
}
