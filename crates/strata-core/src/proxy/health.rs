//! Per-proxy health tracking.
//!
//! Each endpoint carries a sliding window of its last N outcomes. Health is
//! a pure function of that window and the cooldown clock:
//! `is_healthy ⟺ success_rate ≥ (1 − block_threshold) ∧ now ≥ cooldown_until`.
//!
//! Block handling is two-staged: three consecutive `blocked` outcomes
//! against one domain add that domain to the endpoint's block set; three
//! consecutive `blocked` outcomes regardless of domain put the endpoint
//! into a cooldown whose duration doubles per recent cooldown.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::tier::ProxyTier;

/// Consecutive blocks before a domain lands in the endpoint's block set,
/// and before a cross-domain cooldown starts.
const CONSECUTIVE_BLOCK_LIMIT: u32 = 3;

/// First cooldown duration; doubles per recent cooldown.
const COOLDOWN_BASE: Duration = Duration::from_secs(5 * 60);

/// Cooldown growth cap.
const COOLDOWN_CAP: Duration = Duration::from_secs(60 * 60);

/// Window after which the cooldown escalation counter resets.
const COOLDOWN_ESCALATION_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Tolerance for the success-rate threshold comparison, so a window of
/// exactly 7/10 clears a 0.7 threshold despite rounding.
const RATE_EPSILON: f64 = 1e-9;

/// Why a proxied request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The origin blocked the exit (403, anti-bot page).
    Blocked,
    /// A CAPTCHA was served.
    Captcha,
    /// The request timed out.
    Timeout,
    /// The connection was refused.
    Refused,
    /// The origin rate-limited the exit (429).
    RateLimited,
    /// TLS negotiation failed.
    Ssl,
    /// Name resolution failed.
    Dns,
    /// Other 4xx status.
    Http4xx,
    /// 5xx status.
    Http5xx,
    /// Other transport-level failure.
    Transport,
}

impl FailureReason {
    /// Returns `true` if the failure counts toward block escalation.
    const fn is_block(self) -> bool {
        matches!(self, Self::Blocked | Self::Captcha)
    }
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    success: bool,
    latency: Option<Duration>,
}

#[derive(Debug)]
struct EndpointHealth {
    pool_id: String,
    tier: ProxyTier,
    window: VecDeque<Outcome>,
    blocked_domains: HashSet<String>,
    consecutive_blocked: u32,
    consecutive_blocked_by_domain: HashMap<String, u32>,
    cooldown_until: Option<Instant>,
    cooldown_count: u32,
    last_cooldown: Option<Instant>,
    weight: f64,
}

impl EndpointHealth {
    fn new(pool_id: String, tier: ProxyTier) -> Self {
        Self {
            pool_id,
            tier,
            window: VecDeque::new(),
            blocked_domains: HashSet::new(),
            consecutive_blocked: 0,
            consecutive_blocked_by_domain: HashMap::new(),
            cooldown_until: None,
            cooldown_count: 0,
            last_cooldown: None,
            weight: 1.0,
        }
    }

    fn push(&mut self, outcome: Outcome, window_size: usize) {
        if self.window.len() == window_size {
            self.window.pop_front();
        }
        self.window.push_back(outcome);
    }

    fn success_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 1.0;
        }
        let successes = self.window.iter().filter(|o| o.success).count();
        successes as f64 / self.window.len() as f64
    }

    fn avg_latency(&self) -> Option<Duration> {
        let latencies: Vec<Duration> = self.window.iter().filter_map(|o| o.latency).collect();
        if latencies.is_empty() {
            return None;
        }
        Some(latencies.iter().sum::<Duration>() / latencies.len() as u32)
    }

    fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    fn start_cooldown(&mut self, now: Instant, duration: Option<Duration>) {
        // The escalation counter only remembers recent cooldowns.
        if self
            .last_cooldown
            .is_none_or(|last| now.duration_since(last) > COOLDOWN_ESCALATION_WINDOW)
        {
            self.cooldown_count = 0;
        }

        let duration = duration.unwrap_or_else(|| {
            let factor = 2u32.saturating_pow(self.cooldown_count);
            COOLDOWN_BASE.saturating_mul(factor).min(COOLDOWN_CAP)
        });

        self.cooldown_until = Some(now + duration);
        self.cooldown_count = self.cooldown_count.saturating_add(1);
        self.last_cooldown = Some(now);
    }
}

#[derive(Debug, Clone)]
struct StickyEntry {
    proxy_id: String,
    expires_at: Instant,
}

/// Read-only view of one endpoint's health, for introspection.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    /// Endpoint id.
    pub proxy_id: String,
    /// Owning pool id.
    pub pool_id: String,
    /// Pool tier.
    pub tier: ProxyTier,
    /// Windowed success rate; `1.0` for an empty window.
    pub success_rate: f64,
    /// Windowed average latency.
    pub avg_latency: Option<Duration>,
    /// `true` while the endpoint is cooling down.
    pub in_cooldown: bool,
    /// Domains blocked on this endpoint.
    pub blocked_domains: Vec<String>,
    /// Relative selection weight.
    pub weight: f64,
}

/// Tracks every proxy endpoint's sliding outcome window.
///
/// All operations take a short lock around one map access; nothing here
/// performs I/O.
pub struct ProxyHealthTracker {
    endpoints: Mutex<HashMap<String, EndpointHealth>>,
    sticky: Mutex<HashMap<String, StickyEntry>>,
    window_size: usize,
    block_threshold: f64,
    sticky_ttl: Duration,
}

impl ProxyHealthTracker {
    /// Creates a tracker.
    ///
    /// `block_threshold` is the failure share above which an endpoint is
    /// unhealthy; `window_size` is the sliding window length.
    pub fn new(window_size: usize, block_threshold: f64, sticky_ttl: Duration) -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
            sticky: Mutex::new(HashMap::new()),
            window_size: window_size.max(1),
            block_threshold,
            sticky_ttl,
        }
    }

    /// Registers an endpoint with a zeroed window.
    pub fn initialize(&self, proxy_id: &str, pool_id: &str, tier: ProxyTier) {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        endpoints
            .entry(proxy_id.to_string())
            .or_insert_with(|| EndpointHealth::new(pool_id.to_string(), tier));
    }

    /// Records a successful exchange through the endpoint.
    pub fn record_success(&self, proxy_id: &str, domain: &str, latency: Duration) {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        let Some(health) = endpoints.get_mut(proxy_id) else {
            return;
        };

        health.push(
            Outcome {
                success: true,
                latency: Some(latency),
            },
            self.window_size,
        );
        health.consecutive_blocked = 0;
        health.consecutive_blocked_by_domain.remove(domain);
    }

    /// Records a failed exchange through the endpoint.
    pub fn record_failure(&self, proxy_id: &str, domain: &str, reason: FailureReason) {
        let now = Instant::now();
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        let Some(health) = endpoints.get_mut(proxy_id) else {
            return;
        };

        health.push(
            Outcome {
                success: false,
                latency: None,
            },
            self.window_size,
        );

        if !reason.is_block() {
            return;
        }

        let domain_streak = health
            .consecutive_blocked_by_domain
            .entry(domain.to_string())
            .and_modify(|streak| *streak += 1)
            .or_insert(1);
        if *domain_streak >= CONSECUTIVE_BLOCK_LIMIT {
            health.blocked_domains.insert(domain.to_string());
            health.consecutive_blocked_by_domain.remove(domain);
        }

        health.consecutive_blocked += 1;
        if health.consecutive_blocked >= CONSECUTIVE_BLOCK_LIMIT {
            health.start_cooldown(now, None);
            health.consecutive_blocked = 0;

            #[cfg(feature = "tracing")]
            tracing::warn!(
                target: crate::TRACING_TARGET_PROXY,
                proxy = proxy_id,
                until = ?health.cooldown_until,
                "proxy entered block cooldown",
            );
        }
    }

    /// Returns `true` iff the windowed success rate clears the threshold
    /// and the endpoint is not cooling down.
    #[must_use]
    pub fn is_healthy(&self, proxy_id: &str) -> bool {
        let now = Instant::now();
        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        let Some(health) = endpoints.get(proxy_id) else {
            return false;
        };

        health.success_rate() >= (1.0 - self.block_threshold) - RATE_EPSILON
            && !health.in_cooldown(now)
    }

    /// Like [`is_healthy`], and the domain is not in the endpoint's block set.
    ///
    /// [`is_healthy`]: Self::is_healthy
    #[must_use]
    pub fn is_healthy_for_domain(&self, proxy_id: &str, domain: &str) -> bool {
        let now = Instant::now();
        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        let Some(health) = endpoints.get(proxy_id) else {
            return false;
        };

        health.success_rate() >= (1.0 - self.block_threshold) - RATE_EPSILON
            && !health.in_cooldown(now)
            && !health.blocked_domains.contains(domain)
    }

    /// Puts the endpoint into a cooldown of the given length.
    pub fn force_cooldown(&self, proxy_id: &str, reason: &str, duration: Duration) {
        let now = Instant::now();
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(health) = endpoints.get_mut(proxy_id) {
            health.start_cooldown(now, Some(duration));

            #[cfg(feature = "tracing")]
            tracing::info!(
                target: crate::TRACING_TARGET_PROXY,
                proxy = proxy_id,
                reason,
                "forced proxy cooldown",
            );
            #[cfg(not(feature = "tracing"))]
            let _ = reason;
        }
    }

    /// Lifts any active cooldown.
    pub fn clear_cooldown(&self, proxy_id: &str) {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(health) = endpoints.get_mut(proxy_id) {
            health.cooldown_until = None;
        }
    }

    /// Returns the windowed success rate; `1.0` for an unknown or
    /// empty-window endpoint.
    #[must_use]
    pub fn success_rate(&self, proxy_id: &str) -> f64 {
        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        endpoints
            .get(proxy_id)
            .map(EndpointHealth::success_rate)
            .unwrap_or(1.0)
    }

    /// Earliest instant at which any cooling endpoint becomes available.
    #[must_use]
    pub fn earliest_cooldown_end(&self) -> Option<Instant> {
        let now = Instant::now();
        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        endpoints
            .values()
            .filter_map(|health| health.cooldown_until)
            .filter(|until| *until > now)
            .min()
    }

    /// Resolves a sticky session to its pinned proxy, if still alive.
    #[must_use]
    pub fn get_sticky_proxy(&self, session_id: &str) -> Option<String> {
        let now = Instant::now();
        let mut sticky = self.sticky.lock().unwrap_or_else(|e| e.into_inner());
        sticky.retain(|_, entry| entry.expires_at > now);
        sticky.get(session_id).map(|entry| entry.proxy_id.clone())
    }

    /// Pins a session to a proxy for the sticky TTL.
    pub fn set_sticky_proxy(&self, session_id: &str, proxy_id: &str) {
        let mut sticky = self.sticky.lock().unwrap_or_else(|e| e.into_inner());
        sticky.insert(
            session_id.to_string(),
            StickyEntry {
                proxy_id: proxy_id.to_string(),
                expires_at: Instant::now() + self.sticky_ttl,
            },
        );
    }

    /// Snapshots every tracked endpoint.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HealthSnapshot> {
        let now = Instant::now();
        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        endpoints
            .iter()
            .map(|(proxy_id, health)| HealthSnapshot {
                proxy_id: proxy_id.clone(),
                pool_id: health.pool_id.clone(),
                tier: health.tier,
                success_rate: health.success_rate(),
                avg_latency: health.avg_latency(),
                in_cooldown: health.in_cooldown(now),
                blocked_domains: health.blocked_domains.iter().cloned().collect(),
                weight: health.weight,
            })
            .collect()
    }
}

impl fmt::Debug for ProxyHealthTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHealthTracker")
            .field("window_size", &self.window_size)
            .field("block_threshold", &self.block_threshold)
            .finish_non_exhaustive()
    }
}
