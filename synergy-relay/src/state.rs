//! Shared mutable state between the control flow and backend I/O tasks.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Time of the last inbound message, written by the I/O task and read by
/// the staleness watchdog. Clones share the same clock.
#[derive(Debug, Clone)]
pub struct Liveness {
    last_seen: Shared<Instant>,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            last_seen: new_state(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn age(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    pub fn is_older_than(&self, limit: Duration) -> bool {
        self.age() > limit
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}
