//! Domain risk classification.
//!
//! The classifier maintains a running risk score per domain, learned from
//! fetch outcomes and from protection-system markers observed in responses.
//! Classification is cached with a TTL; the cached value is what the
//! selection path reads, so hot domains never pay for recomputation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use http::HeaderMap;

use crate::tier::ProxyTier;

/// Risk added for a blocked failure, plain failure, and protection marker.
const BLOCK_RISK: f64 = 0.15;
const FAILURE_RISK: f64 = 0.05;
const PROTECTION_RISK: f64 = 0.25;

/// Multiplicative decay applied per success.
const SUCCESS_DECAY: f64 = 0.95;

/// How risky a domain currently looks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    derive_more::Display,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No hostile signals observed.
    #[display("low")]
    Low,
    /// Some failures or weak signals.
    #[display("medium")]
    Medium,
    /// Blocks or a known protection vendor.
    #[display("high")]
    High,
    /// Persistent blocking; CAPTCHAs.
    #[display("extreme")]
    Extreme,
}

impl RiskLevel {
    /// The proxy tier worth starting from at this risk level.
    pub const fn recommended_tier(self) -> ProxyTier {
        match self {
            Self::Low | Self::Medium => ProxyTier::Datacenter,
            Self::High => ProxyTier::Residential,
            Self::Extreme => ProxyTier::Unblocker,
        }
    }

    /// Courtesy delay between requests to a domain at this risk level.
    pub const fn recommended_delay(self) -> Duration {
        match self {
            Self::Low => Duration::ZERO,
            Self::Medium => Duration::from_millis(500),
            Self::High => Duration::from_secs(2),
            Self::Extreme => Duration::from_secs(5),
        }
    }
}

/// Anti-bot vendor identified from a response.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    derive_more::Display,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionSystem {
    /// Cloudflare challenge or WAF.
    #[display("cloudflare")]
    Cloudflare,
    /// Akamai Bot Manager.
    #[display("akamai")]
    Akamai,
    /// PerimeterX / HUMAN.
    #[display("perimeterx")]
    PerimeterX,
    /// DataDome.
    #[display("datadome")]
    DataDome,
    /// A CAPTCHA without an identifiable vendor.
    #[display("captcha")]
    Captcha,
}

/// Cached classification of one domain.
#[derive(Debug, Clone)]
pub struct DomainRisk {
    /// Risk level.
    pub level: RiskLevel,
    /// Proxy tier worth starting from.
    pub recommended_tier: ProxyTier,
    /// Successes observed for the domain.
    pub success_count: u64,
    /// Failures observed for the domain.
    pub failure_count: u64,
    /// Protection vendor, when identified.
    pub protection: Option<ProtectionSystem>,
    /// When this classification was computed.
    pub classified_at: Instant,
}

#[derive(Debug, Default)]
struct DomainState {
    score: f64,
    success_count: u64,
    failure_count: u64,
    protection: Option<ProtectionSystem>,
    cached: Option<DomainRisk>,
}

impl DomainState {
    fn level(&self) -> RiskLevel {
        match self.score {
            s if s < 0.25 => RiskLevel::Low,
            s if s < 0.5 => RiskLevel::Medium,
            s if s < 0.75 => RiskLevel::High,
            _ => RiskLevel::Extreme,
        }
    }

    fn classify(&mut self, now: Instant) -> DomainRisk {
        let level = self.level();
        let risk = DomainRisk {
            level,
            recommended_tier: level.recommended_tier(),
            success_count: self.success_count,
            failure_count: self.failure_count,
            protection: self.protection,
            classified_at: now,
        };
        self.cached = Some(risk.clone());
        risk
    }

    fn bump(&mut self, amount: f64) {
        self.score = (self.score + amount).min(1.0);
        // A risk jump must be visible to the next selection immediately.
        self.cached = None;
    }
}

/// Classifies domains into risk levels and recommended proxy tiers.
pub struct DomainRiskClassifier {
    domains: Mutex<HashMap<String, DomainState>>,
    cache_ttl: Duration,
    learning_enabled: bool,
}

impl DomainRiskClassifier {
    /// Creates a classifier with the given classification-cache TTL.
    pub fn new(cache_ttl: Duration, learning_enabled: bool) -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
            cache_ttl,
            learning_enabled,
        }
    }

    /// Returns the domain's classification, recomputing when the cached
    /// value is stale.
    pub fn classify(&self, domain: &str) -> DomainRisk {
        let now = Instant::now();
        let mut domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        let state = domains.entry(domain.to_string()).or_default();

        if let Some(cached) = &state.cached
            && now.duration_since(cached.classified_at) < self.cache_ttl
        {
            return cached.clone();
        }

        state.classify(now)
    }

    /// Records a successful fetch; risk decays gradually.
    pub fn record_success(&self, domain: &str) {
        if !self.learning_enabled {
            return;
        }
        let mut domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        let state = domains.entry(domain.to_string()).or_default();
        state.success_count += 1;
        state.score *= SUCCESS_DECAY;
    }

    /// Records a failed fetch; a blocked failure raises risk sharply.
    pub fn record_failure(&self, domain: &str, was_blocked: bool) {
        if !self.learning_enabled {
            return;
        }
        let mut domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        let state = domains.entry(domain.to_string()).or_default();
        state.failure_count += 1;
        state.bump(if was_blocked { BLOCK_RISK } else { FAILURE_RISK });
    }

    /// Scans a response for protection-system markers and records any hit.
    ///
    /// Returns the vendor when one was identified.
    pub fn detect_protection_from_response(
        &self,
        domain: &str,
        headers: &HeaderMap,
        body: &str,
    ) -> Option<ProtectionSystem> {
        let detected = detect_protection(headers, body)?;

        if self.learning_enabled {
            let mut domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
            let state = domains.entry(domain.to_string()).or_default();
            state.protection = Some(detected);
            state.bump(PROTECTION_RISK);
        }

        Some(detected)
    }

    /// Courtesy delay between requests to the domain.
    #[must_use]
    pub fn recommended_delay(&self, domain: &str) -> Duration {
        self.classify(domain).level.recommended_delay()
    }
}

impl fmt::Debug for DomainRiskClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainRiskClassifier")
            .field("cache_ttl", &self.cache_ttl)
            .field("learning_enabled", &self.learning_enabled)
            .finish_non_exhaustive()
    }
}

/// Identifies a protection vendor from headers and body markers.
fn detect_protection(headers: &HeaderMap, body: &str) -> Option<ProtectionSystem> {
    if headers.contains_key("cf-ray")
        || headers.contains_key("cf-cache-status")
        || header_contains(headers, "server", "cloudflare")
    {
        return Some(ProtectionSystem::Cloudflare);
    }

    if headers.contains_key("x-datadome") || body.contains("datadome") {
        return Some(ProtectionSystem::DataDome);
    }

    if headers
        .keys()
        .any(|name| name.as_str().starts_with("x-px"))
        || body.contains("_pxhd")
        || body.contains("px-captcha")
    {
        return Some(ProtectionSystem::PerimeterX);
    }

    if headers.contains_key("akamai-grn") || body.contains("ak_bmsc") || body.contains("_abck") {
        return Some(ProtectionSystem::Akamai);
    }

    if body.contains("cf-challenge") || body.contains("challenge-platform") {
        return Some(ProtectionSystem::Cloudflare);
    }

    if body.contains("g-recaptcha") || body.contains("h-captcha") || body.contains("captcha") {
        return Some(ProtectionSystem::Captcha);
    }

    None
}

fn header_contains(headers: &HeaderMap, name: &str, needle: &str) -> bool {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains(needle))
}
