//! Cooperative cancellation with an expiry.
//!
//! A set flag is observed between items, never mid-transfer. It lapses
//! after its TTL so that a forgotten flag cannot block later runs.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::warn;

/// Shared cancellation flag. Clones observe the same state.
#[derive(Clone, Debug)]
pub struct CancellationFlag {
    set_at: Arc<Mutex<Option<Instant>>>,
    ttl: Duration,
}

impl CancellationFlag {
    pub fn new(ttl: Duration) -> Self {
        Self {
            set_at: Arc::new(Mutex::new(None)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Requests cancellation, restarting the TTL.
    pub fn set(&self) {
        *self.lock() = Some(Instant::now());
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// True while a request is in effect. An expired request is cleared.
    pub fn is_set(&self) -> bool {
        let mut guard = self.lock();
        match *guard {
            Some(at) if at.elapsed() < self.ttl => true,
            Some(_) => {
                *guard = None;
                false
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Instant>> {
        self.set_at.lock().unwrap_or_else(|poisoned| {
            warn!("recovering from poisoned cancellation flag mutex");
            poisoned.into_inner()
        })
    }
}
