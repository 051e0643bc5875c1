//! Per-domain request pacing.
//!
//! Each domain gets one pacing lane. `acquire` waits until the domain's
//! next allowed slot, then claims the following slot. The lane is a tokio
//! mutex, which queues waiters in FIFO order, so callers are served in the
//! order they asked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
struct Lane {
    next_slot: Instant,
}

/// FIFO token source pacing requests per domain.
#[derive(Debug, Default)]
pub struct DomainRateLimiter {
    lanes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Lane>>>>,
}

impl DomainRateLimiter {
    /// Creates a limiter with no lanes yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the domain's next slot, spacing callers by `interval`.
    ///
    /// A zero interval returns immediately. The outer map lock is held only
    /// long enough to find the lane; the wait happens on the lane itself.
    pub async fn acquire(&self, domain: &str, interval: Duration) {
        if interval.is_zero() {
            return;
        }

        let lane = {
            let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
            lanes
                .entry(domain.to_string())
                .or_insert_with(|| {
                    Arc::new(tokio::sync::Mutex::new(Lane {
                        next_slot: Instant::now(),
                    }))
                })
                .clone()
        };

        let mut lane = lane.lock().await;
        let now = Instant::now();
        if lane.next_slot > now {
            tokio::time::sleep_until(lane.next_slot).await;
        }
        let base = lane.next_slot.max(now);
        lane.next_slot = base + interval;
    }

    /// Drops lanes that have no pending wait and are past their slot.
    pub fn shrink(&self) {
        let now = Instant::now();
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes.retain(|_, lane| {
            Arc::strong_count(lane) > 1
                || lane
                    .try_lock()
                    .map(|lane| lane.next_slot > now)
                    .unwrap_or(true)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn paces_same_domain() {
        let limiter = DomainRateLimiter::new();
        let interval = Duration::from_millis(500);

        let start = Instant::now();
        limiter.acquire("example.com", interval).await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire("example.com", interval).await;
        assert!(start.elapsed() >= interval);

        limiter.acquire("example.com", interval).await;
        assert!(start.elapsed() >= interval * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn domains_do_not_interfere() {
        let limiter = DomainRateLimiter::new();
        let interval = Duration::from_secs(5);

        let start = Instant::now();
        limiter.acquire("a.com", interval).await;
        limiter.acquire("b.com", interval).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn zero_interval_is_free() {
        let limiter = DomainRateLimiter::new();
        for _ in 0..100 {
            limiter.acquire("example.com", Duration::ZERO).await;
        }
        limiter.shrink();
    }
}
