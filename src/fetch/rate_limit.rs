// src/fetch/rate_limit.rs

//! Per-host minimum-interval rate limiting.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Spaces consecutive requests to one host at least `min_interval` apart.
/// Hosts never wait on each other, and the first request to a host does not
/// wait at all.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    slots: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    /// Gate derived from a requests-per-second ceiling. A non-positive or
    /// non-finite rate disables the gate.
    pub fn per_second(rate: f64) -> Self {
        let min_interval = if rate.is_finite() && rate > 0.0 {
            Duration::from_secs_f64(1.0 / rate)
        } else {
            Duration::ZERO
        };
        Self::with_interval(min_interval)
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Gate that never waits.
    pub fn unlimited() -> Self {
        Self::with_interval(Duration::ZERO)
    }

    /// Wait for the host's next slot. The slot is reserved under the lock so
    /// concurrent callers to one host serialize; the wait itself happens
    /// after the lock is released.
    pub async fn acquire(&self, host: &str) {
        if self.min_interval.is_zero() {
            return;
        }
        let slot = {
            let mut slots = self.slots.lock().await;
            let now = Instant::now();
            let slot = match slots.get(host) {
                Some(prev) => (*prev + self.min_interval).max(now),
                None => now,
            };
            slots.insert(host.to_string(), slot);
            slot
        };
        sleep_until(slot).await;
    }
}
