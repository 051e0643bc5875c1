//! Learned per-domain tier preferences.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::tier::RenderTier;

/// Fetches a preference must survive before it steers start-tier choice.
pub const PREFERENCE_MIN_SUCCESSES: u64 = 3;

/// What the engine remembers about fetching one domain.
#[derive(Debug, Clone, Copy)]
pub struct DomainPreference {
    /// Tier that has been succeeding.
    pub preferred: RenderTier,
    /// Consecutive successes on the preferred tier.
    pub success_count: u64,
    /// Failures since the last success.
    pub failure_count: u64,
    /// Running mean of successful fetch durations.
    pub avg_response: Duration,
    /// Last time the domain was fetched.
    pub last_used: Instant,
}

/// Domain → preference map. One record per domain, mutated on every
/// outcome.
#[derive(Debug, Default)]
pub struct PreferenceStore {
    inner: Mutex<HashMap<String, DomainPreference>>,
}

impl PreferenceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the preference recorded for a domain.
    #[must_use]
    pub fn get(&self, domain: &str) -> Option<DomainPreference> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(domain).copied()
    }

    /// The tier to start from, once the preference has proven itself.
    #[must_use]
    pub fn start_tier(&self, domain: &str) -> Option<RenderTier> {
        self.get(domain)
            .filter(|preference| preference.success_count >= PREFERENCE_MIN_SUCCESSES)
            .map(|preference| preference.preferred)
    }

    /// Records a successful fetch through `tier`.
    ///
    /// A success on a different tier than the current preference restarts
    /// the streak at one; the domain has to re-prove the new tier.
    pub fn record_success(&self, domain: &str, tier: RenderTier, duration: Duration) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entry(domain.to_string())
            .and_modify(|preference| {
                if preference.preferred == tier {
                    preference.success_count += 1;
                    preference.avg_response = running_mean(
                        preference.avg_response,
                        preference.success_count,
                        duration,
                    );
                } else {
                    preference.preferred = tier;
                    preference.success_count = 1;
                    preference.avg_response = duration;
                }
                preference.failure_count = 0;
                preference.last_used = now;
            })
            .or_insert(DomainPreference {
                preferred: tier,
                success_count: 1,
                failure_count: 0,
                avg_response: duration,
                last_used: now,
            });
    }

    /// Records a failed fetch.
    pub fn record_failure(&self, domain: &str) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entry(domain.to_string())
            .and_modify(|preference| {
                preference.failure_count += 1;
                // A streak of failures invalidates the learned streak.
                if preference.failure_count >= PREFERENCE_MIN_SUCCESSES {
                    preference.success_count = 0;
                }
                preference.last_used = now;
            })
            .or_insert(DomainPreference {
                preferred: RenderTier::Intelligence,
                success_count: 0,
                failure_count: 1,
                avg_response: Duration::ZERO,
                last_used: now,
            });
    }
}

fn running_mean(current: Duration, count: u64, sample: Duration) -> Duration {
    if count == 0 {
        return sample;
    }
    let previous = current.as_secs_f64() * (count - 1) as f64;
    Duration::from_secs_f64((previous + sample.as_secs_f64()) / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_needs_three_successes() {
        let store = PreferenceStore::new();
        store.record_success("example.com", RenderTier::Lightweight, Duration::from_millis(50));
        store.record_success("example.com", RenderTier::Lightweight, Duration::from_millis(70));
        assert_eq!(store.start_tier("example.com"), None);

        store.record_success("example.com", RenderTier::Lightweight, Duration::from_millis(60));
        assert_eq!(
            store.start_tier("example.com"),
            Some(RenderTier::Lightweight)
        );
    }

    #[test]
    fn switching_tier_restarts_streak() {
        let store = PreferenceStore::new();
        for _ in 0..3 {
            store.record_success("example.com", RenderTier::Browser, Duration::from_millis(900));
        }
        assert_eq!(store.start_tier("example.com"), Some(RenderTier::Browser));

        store.record_success(
            "example.com",
            RenderTier::Intelligence,
            Duration::from_millis(40),
        );
        assert_eq!(store.start_tier("example.com"), None);
        let preference = store.get("example.com").unwrap();
        assert_eq!(preference.preferred, RenderTier::Intelligence);
        assert_eq!(preference.success_count, 1);
    }

    #[test]
    fn repeated_failures_reset_streak() {
        let store = PreferenceStore::new();
        for _ in 0..3 {
            store.record_success("example.com", RenderTier::Lightweight, Duration::from_millis(50));
        }
        for _ in 0..3 {
            store.record_failure("example.com");
        }
        assert_eq!(store.start_tier("example.com"), None);
    }

    #[test]
    fn mean_updates_incrementally() {
        let store = PreferenceStore::new();
        store.record_success("example.com", RenderTier::Intelligence, Duration::from_millis(100));
        store.record_success("example.com", RenderTier::Intelligence, Duration::from_millis(200));
        let preference = store.get("example.com").unwrap();
        assert_eq!(preference.avg_response, Duration::from_millis(150));
    }
}
