//! Admission control for a capacity-limited build backend.

use autoforge_core::backend::ActiveSessionCounter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// Gates new submissions on the number of sessions already active on the backend.
///
/// The active count is re-derived from the [`ActiveSessionCounter`] on every
/// poll. When it cannot be obtained the backend is treated as idle.
pub struct AdmissionController {
    counter: Arc<dyn ActiveSessionCounter>,
    capacity: usize,
}

impl AdmissionController {
    pub fn new(counter: Arc<dyn ActiveSessionCounter>, capacity: usize) -> Self {
        Self {
            counter,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current active session count, 0 when it cannot be determined.
    pub async fn active_sessions(&self) -> usize {
        match self.counter.active_sessions().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Could not count active sessions, assuming none");
                0
            }
        }
    }

    /// Wait until fewer than `capacity` sessions are active.
    ///
    /// Returns `false` when no slot freed up within `max_wait`.
    pub async fn acquire_slot(&self, max_wait: Duration, poll_interval: Duration) -> bool {
        let deadline = Instant::now() + max_wait;

        loop {
            let active = self.active_sessions().await;
            if active < self.capacity {
                debug!(active, capacity = self.capacity, "Admission slot available");
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    active,
                    capacity = self.capacity,
                    waited_secs = max_wait.as_secs(),
                    "No admission slot became available"
                );
                return false;
            }

            info!(active, capacity = self.capacity, "Backend at capacity, waiting");
            sleep(poll_interval.min(deadline - now)).await;
        }
    }
}
