//! Per-domain performance tracking.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use crate::tier::RenderTier;

/// Component timings of one fetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timings {
    /// End-to-end duration.
    pub total: Duration,
    /// Time on the wire.
    pub network: Duration,
    /// HTML parsing.
    pub parsing: Duration,
    /// JS execution, browser tier only.
    pub js_execution: Duration,
    /// Content extraction.
    pub extraction: Duration,
}

/// One recorded fetch.
#[derive(Debug, Clone, Copy)]
struct Sample {
    timings: Timings,
    tier: RenderTier,
    success: bool,
}

/// Percentile summary of a set of samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencySummary {
    /// Samples summarized.
    pub count: usize,
    /// Median.
    pub p50: Duration,
    /// 95th percentile.
    pub p95: Duration,
    /// 99th percentile.
    pub p99: Duration,
    /// Minimum.
    pub min: Duration,
    /// Maximum.
    pub max: Duration,
    /// Mean.
    pub avg: Duration,
}

/// Mean duration per component over a set of samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentBreakdown {
    /// Mean network time.
    pub network: Duration,
    /// Mean parsing time.
    pub parsing: Duration,
    /// Mean JS execution time.
    pub js_execution: Duration,
    /// Mean extraction time.
    pub extraction: Duration,
}

/// Sliding-window latency and outcome tracker, per domain and system-wide.
pub struct PerformanceTracker {
    domains: Mutex<HashMap<String, VecDeque<Sample>>>,
    window: usize,
}

impl PerformanceTracker {
    /// Creates a tracker keeping `window` samples per domain.
    pub fn new(window: usize) -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
            window: window.max(1),
        }
    }

    /// Records one fetch.
    pub fn record(&self, domain: &str, timings: Timings, tier: RenderTier, success: bool) {
        let mut domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        let ring = domains.entry(domain.to_string()).or_default();
        if ring.len() == self.window {
            ring.pop_front();
        }
        ring.push_back(Sample {
            timings,
            tier,
            success,
        });
    }

    /// Latency summary for one domain.
    #[must_use]
    pub fn domain_summary(&self, domain: &str) -> Option<LatencySummary> {
        let domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        let ring = domains.get(domain)?;
        Some(summarize(ring.iter().map(|sample| sample.timings.total)))
    }

    /// Latency summary across every domain.
    #[must_use]
    pub fn system_summary(&self) -> LatencySummary {
        let domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        summarize(
            domains
                .values()
                .flat_map(|ring| ring.iter().map(|sample| sample.timings.total)),
        )
    }

    /// The tier that most often succeeded for a domain.
    #[must_use]
    pub fn preferred_tier(&self, domain: &str) -> Option<RenderTier> {
        let domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        let ring = domains.get(domain)?;

        let mut counts: HashMap<RenderTier, usize> = HashMap::new();
        for sample in ring.iter().filter(|sample| sample.success) {
            *counts.entry(sample.tier).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by_key(|(tier, count)| (*count, std::cmp::Reverse(*tier)))
            .map(|(tier, _)| tier)
    }

    /// Domains ranked fastest-first by median latency.
    #[must_use]
    pub fn fastest_domains(&self, limit: usize) -> Vec<(String, Duration)> {
        let mut ranked = self.ranked_by_p50();
        ranked.truncate(limit);
        ranked
    }

    /// Domains ranked slowest-first by median latency.
    #[must_use]
    pub fn slowest_domains(&self, limit: usize) -> Vec<(String, Duration)> {
        let mut ranked = self.ranked_by_p50();
        ranked.reverse();
        ranked.truncate(limit);
        ranked
    }

    /// Mean per-component timings for a domain.
    #[must_use]
    pub fn component_breakdown(&self, domain: &str) -> Option<ComponentBreakdown> {
        let domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        let ring = domains.get(domain)?;
        if ring.is_empty() {
            return None;
        }

        let count = ring.len() as u32;
        let mut sums = ComponentBreakdown::default();
        for sample in ring {
            sums.network += sample.timings.network;
            sums.parsing += sample.timings.parsing;
            sums.js_execution += sample.timings.js_execution;
            sums.extraction += sample.timings.extraction;
        }
        Some(ComponentBreakdown {
            network: sums.network / count,
            parsing: sums.parsing / count,
            js_execution: sums.js_execution / count,
            extraction: sums.extraction / count,
        })
    }

    fn ranked_by_p50(&self) -> Vec<(String, Duration)> {
        let domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        let mut ranked: Vec<(String, Duration)> = domains
            .iter()
            .filter(|(_, ring)| !ring.is_empty())
            .map(|(domain, ring)| {
                let summary = summarize(ring.iter().map(|sample| sample.timings.total));
                (domain.clone(), summary.p50)
            })
            .collect();
        ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

impl fmt::Debug for PerformanceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("PerformanceTracker")
            .field("domains", &domains.len())
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

fn summarize(durations: impl Iterator<Item = Duration>) -> LatencySummary {
    let mut sorted: Vec<Duration> = durations.collect();
    if sorted.is_empty() {
        return LatencySummary::default();
    }
    sorted.sort_unstable();

    let count = sorted.len();
    let at = |quantile: f64| {
        let index = ((count as f64 - 1.0) * quantile).round() as usize;
        sorted[index.min(count - 1)]
    };
    let total: Duration = sorted.iter().sum();

    LatencySummary {
        count,
        p50: at(0.50),
        p95: at(0.95),
        p99: at(0.99),
        min: sorted[0],
        max: sorted[count - 1],
        avg: total / count as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(total_ms: u64) -> Timings {
        Timings {
            total: Duration::from_millis(total_ms),
            network: Duration::from_millis(total_ms / 2),
            parsing: Duration::from_millis(total_ms / 4),
            js_execution: Duration::ZERO,
            extraction: Duration::from_millis(total_ms / 4),
        }
    }

    #[test]
    fn summary_percentiles() {
        let tracker = PerformanceTracker::new(1000);
        for ms in 1..=100 {
            tracker.record("example.com", timing(ms), RenderTier::Intelligence, true);
        }

        let summary = tracker.domain_summary("example.com").unwrap();
        assert_eq!(summary.count, 100);
        assert_eq!(summary.min, Duration::from_millis(1));
        assert_eq!(summary.max, Duration::from_millis(100));
        assert_eq!(summary.p50, Duration::from_millis(51));
        assert_eq!(summary.p95, Duration::from_millis(95));
        assert_eq!(summary.p99, Duration::from_millis(99));
    }

    #[test]
    fn window_slides() {
        let tracker = PerformanceTracker::new(10);
        for ms in 1..=50 {
            tracker.record("example.com", timing(ms), RenderTier::Intelligence, true);
        }
        let summary = tracker.domain_summary("example.com").unwrap();
        assert_eq!(summary.count, 10);
        assert_eq!(summary.min, Duration::from_millis(41));
    }

    #[test]
    fn preferred_tier_counts_successes_only() {
        let tracker = PerformanceTracker::new(100);
        for _ in 0..5 {
            tracker.record("example.com", timing(100), RenderTier::Browser, false);
        }
        for _ in 0..3 {
            tracker.record("example.com", timing(40), RenderTier::Lightweight, true);
        }
        tracker.record("example.com", timing(20), RenderTier::Intelligence, true);

        assert_eq!(
            tracker.preferred_tier("example.com"),
            Some(RenderTier::Lightweight)
        );
    }

    #[test]
    fn fast_and_slow_rankings() {
        let tracker = PerformanceTracker::new(100);
        tracker.record("fast.com", timing(10), RenderTier::Intelligence, true);
        tracker.record("slow.com", timing(900), RenderTier::Browser, true);
        tracker.record("mid.com", timing(100), RenderTier::Lightweight, true);

        let fastest = tracker.fastest_domains(2);
        assert_eq!(fastest[0].0, "fast.com");
        assert_eq!(fastest[1].0, "mid.com");

        let slowest = tracker.slowest_domains(1);
        assert_eq!(slowest[0].0, "slow.com");
    }

    #[test]
    fn component_breakdown_means() {
        let tracker = PerformanceTracker::new(100);
        tracker.record("example.com", timing(100), RenderTier::Intelligence, true);
        tracker.record("example.com", timing(200), RenderTier::Intelligence, true);

        let breakdown = tracker.component_breakdown("example.com").unwrap();
        assert_eq!(breakdown.network, Duration::from_millis(75));
    }
}
