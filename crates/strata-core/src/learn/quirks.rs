//! Learned per-domain adjustments.

use std::collections::BTreeMap;
use std::time::Duration;

use jiff::Timestamp;

/// What kind of authentication a domain demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// Cookie session established elsewhere.
    Cookie,
    /// Bearer/API token.
    Token,
    /// Login form.
    Form,
}

/// Learned rate limit for a domain.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RateLimit {
    /// Sustained requests per second the domain tolerates.
    pub requests_per_second: f64,
    /// Cooldown after a 429.
    pub cooldown: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Anti-bot hint recorded from failures.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AntiBotHint {
    /// Vendor tag (`cloudflare`, `datadome`, …).
    pub vendor: String,
    /// Free-form evidence (header name, body marker).
    pub evidence: String,
}

/// Everything site-specific the registry has learned about one domain.
///
/// Quirks are advisory: strategies apply what they can and ignore the rest.
/// BTreeMaps keep the persisted form deterministically ordered.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteQuirks {
    /// Domain the quirks belong to.
    pub domain: String,
    /// Headers that must be present.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub required_headers: BTreeMap<String, String>,
    /// Headers that must not be sent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forbidden_headers: Vec<String>,
    /// User agent the domain accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_user_agent: Option<String>,
    /// `true` once a 403 taught us to use stealth settings.
    #[serde(default)]
    pub stealth_required: bool,
    /// Why stealth was turned on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stealth_reason: Option<String>,
    /// Learned rate limit, when a 429 was seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    /// Floor on inter-request delay, from `Retry-After`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_delay: Option<Duration>,
    /// Authentication the domain demands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthKind>,
    /// Anti-bot vendor hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_bot: Option<AntiBotHint>,
    /// CSS selector overrides for extraction (`title` → selector).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector_overrides: BTreeMap<String, String>,
    /// When the quirks were last updated.
    pub updated_at: Timestamp,
}

impl SiteQuirks {
    /// Creates empty quirks for a domain.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            updated_at: Timestamp::now(),
            ..Self::default()
        }
    }

    /// Marks stealth as required, remembering why.
    pub fn require_stealth(&mut self, reason: impl Into<String>) {
        self.stealth_required = true;
        self.stealth_reason = Some(reason.into());
        self.touch();
    }

    /// Halves the learned rate limit (or installs the default halved once).
    pub fn tighten_rate_limit(&mut self) {
        let current = self.rate_limit.unwrap_or_default();
        self.rate_limit = Some(RateLimit {
            requests_per_second: (current.requests_per_second / 2.0).max(0.1),
            cooldown: current.cooldown,
        });
        self.touch();
    }

    /// Raises the minimum delay to at least `delay`.
    pub fn raise_min_delay(&mut self, delay: Duration) {
        self.min_delay = Some(self.min_delay.map_or(delay, |current| current.max(delay)));
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}
