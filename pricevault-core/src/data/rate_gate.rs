//! Shared rate gate enforcing a minimum interval between outbound requests.
//!
//! One gate is shared by every worker. Each fetch attempt, successful or not,
//! passes through `acquire` exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateGate {
    min_interval: Duration,
    last_issue: Mutex<Option<Instant>>,
    issued: AtomicU64,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_issue: Mutex::new(None),
            issued: AtomicU64::new(0),
        }
    }

    /// Block until a request may be issued, then record it.
    ///
    /// The lock is held across the sleep so two workers can never be granted
    /// slots closer together than `min_interval`.
    pub fn acquire(&self) -> Instant {
        let mut last = self.last_issue.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "rate gate wait");
                std::thread::sleep(wait);
            }
        }
        let now = Instant::now();
        *last = Some(now);
        self.issued.fetch_add(1, Ordering::Relaxed);
        now
    }

    /// Number of requests granted so far.
    pub fn requests_issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
