use std::convert::Infallible;
use std::time::Duration;
use std::{fmt, io};

use crate::result::TierAttempt;

/// Type alias for a type-erased [`Error`] type.
///
/// [`Error`]: std::error::Error
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error kind representing the category of failure that occurred.
///
/// The taxonomy is deliberately domain-neutral: kinds describe what went
/// wrong during a fetch, not which component noticed it, so callers can
/// decide on recovery (`retry`, `escalate`, `give up`) programmatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The URL failed the SSRF safety check (private address, bad scheme)
    UrlUnsafe,

    /// No proxy pool is configured for any tier the tenant plan allows
    NoProxy,

    /// Proxies exist but every candidate is blocked or cooling down
    ProxyExhausted,

    /// Transport-level failure (timeout, DNS, connection refused)
    Transport,

    /// The origin blocked the request (403/429, anti-bot signature)
    Blocked,

    /// Extracted content was shorter than the configured floor
    ValidationShort,

    /// The response looks like a challenge or loading shell
    ValidationIncomplete,

    /// A strategy determined it needs a more capable tier
    NeedUpgrade,

    /// The latency budget was exhausted between tier attempts
    LatencyBudget,

    /// No tier at or below the cost budget is available
    CostBudget,

    /// The caller cancelled the fetch
    Cancelled,

    /// A learned-store snapshot could not be written
    Persistence,

    /// Other unclassified errors
    Other,
}

impl ErrorKind {
    /// Returns a string representation of the error kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UrlUnsafe => "url_unsafe",
            Self::NoProxy => "no_proxy",
            Self::ProxyExhausted => "proxy_exhausted",
            Self::Transport => "transport",
            Self::Blocked => "blocked",
            Self::ValidationShort => "validation_short",
            Self::ValidationIncomplete => "validation_incomplete",
            Self::NeedUpgrade => "need_upgrade",
            Self::LatencyBudget => "latency_budget",
            Self::CostBudget => "cost_budget",
            Self::Cancelled => "cancelled",
            Self::Persistence => "persistence",
            Self::Other => "other",
        }
    }

    /// Returns `true` if a retry on the next tier may succeed.
    pub const fn escalates(self) -> bool {
        matches!(
            self,
            Self::Transport
                | Self::Blocked
                | Self::ValidationShort
                | Self::ValidationIncomplete
                | Self::NeedUpgrade
        )
    }

    /// Returns `true` if the failed attempt must not be recorded to learners.
    pub const fn skips_learning(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable recovery advice attached to terminal errors.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Recommendation {
    /// A higher tenant plan would unlock a proxy tier that may succeed.
    UpgradePlan,
    /// Every candidate proxy is cooling down; retry after the given delay.
    RetryAfter {
        /// Earliest point at which a retry can find a healthy proxy.
        retry_after: Duration,
    },
}

/// Unrecoverable failure of a fetch.
///
/// `Error` provides structured failure information:
/// - [`ErrorKind`] for categorization
/// - Optional source error for error chains
/// - The full [`TierAttempt`] chain, so observability tooling can see every
///   tier that was tried before the fetch gave up
/// - Optional [`Recommendation`] for machine-driven recovery
///
/// The last entry of [`Error::attempts`] is the primary cause; earlier
/// entries document the fallback path that led there.
#[must_use]
#[derive(thiserror::Error)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
    attempts: Vec<TierAttempt>,
    recommendation: Option<Recommendation>,
}

impl Error {
    /// Creates a new [`Error`] with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            attempts: Vec::new(),
            recommendation: None,
        }
    }

    /// Creates a new [`Error`] with the given kind, message, and source error.
    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: BoxError) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source),
            attempts: Vec::new(),
            recommendation: None,
        }
    }

    /// Returns the error kind.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Attaches the tier-attempt chain accumulated before this failure.
    #[inline]
    pub fn with_attempts(mut self, attempts: Vec<TierAttempt>) -> Self {
        self.attempts = attempts;
        self
    }

    /// Returns the tier attempts made before the fetch failed.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> &[TierAttempt] {
        &self.attempts
    }

    /// Attaches machine-readable recovery advice.
    #[inline]
    pub fn with_recommendation(mut self, recommendation: Recommendation) -> Self {
        self.recommendation = Some(recommendation);
        self
    }

    /// Returns the recovery advice if set.
    #[inline]
    #[must_use]
    pub const fn recommendation(&self) -> Option<&Recommendation> {
        self.recommendation.as_ref()
    }

    /// Returns `true` if retrying the same fetch later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Transport | ErrorKind::ProxyExhausted | ErrorKind::LatencyBudget
        )
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Error");
        debug
            .field("kind", &self.kind)
            .field("message", &self.message);

        if let Some(ref source) = self.source {
            debug.field("source", source);
        }

        if !self.attempts.is_empty() {
            debug.field("attempts", &self.attempts);
        }

        if let Some(ref recommendation) = self.recommendation {
            debug.field("recommendation", recommendation);
        }

        debug.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl From<Infallible> for Error {
    #[inline]
    fn from(_: Infallible) -> Self {
        unreachable!()
    }
}

impl From<http::Error> for Error {
    #[inline]
    fn from(error: http::Error) -> Self {
        Self::with_source(ErrorKind::Other, "HTTP error", Box::new(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::with_source(ErrorKind::Transport, "I/O error", Box::new(error))
    }
}

impl From<url::ParseError> for Error {
    #[inline]
    fn from(error: url::ParseError) -> Self {
        Self::with_source(ErrorKind::UrlUnsafe, "invalid URL", Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::RenderTier;

    #[test]
    fn kind_as_str() {
        assert_eq!(ErrorKind::ProxyExhausted.as_str(), "proxy_exhausted");
        assert_eq!(ErrorKind::ValidationShort.as_str(), "validation_short");
    }

    #[test]
    fn escalation_policy() {
        assert!(ErrorKind::Transport.escalates());
        assert!(ErrorKind::NeedUpgrade.escalates());
        assert!(!ErrorKind::UrlUnsafe.escalates());
        assert!(!ErrorKind::Cancelled.escalates());
    }

    #[test]
    fn attempt_chain_preserved() {
        let attempt = TierAttempt::failed(
            RenderTier::Intelligence,
            Duration::from_millis(40),
            ErrorKind::ValidationShort,
            "Content too short: 120 < 500",
        );
        let error = Error::new(ErrorKind::ValidationShort, "all tiers failed")
            .with_attempts(vec![attempt]);
        assert_eq!(error.attempts().len(), 1);
        assert_eq!(error.attempts()[0].tier, RenderTier::Intelligence);
    }

    #[test]
    fn display_includes_kind() {
        let error = Error::new(ErrorKind::Blocked, "origin returned 403");
        assert_eq!(error.to_string(), "[blocked] origin returned 403");
    }
}
