//! Fetch result types.
//!
//! A [`FetchResult`] is immutable once returned: the fetcher builds it, the
//! learners read it, nobody mutates it. The [`TierAttempt`] chain documents
//! every strategy invocation in order, whether or not it succeeded.

use std::time::Duration;

use crate::error::ErrorKind;
use crate::tier::RenderTier;
use crate::validate::ValidationReport;

/// Extracted page content.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PageContent {
    /// Page title, when one could be determined.
    pub title: Option<String>,
    /// Visible plain text.
    pub text: String,
    /// Markdown rendition of the main content.
    pub markdown: String,
    /// Structured data mined from the page (JSON-LD, embedded state).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Map<String, serde_json::Value>>,
}

/// One captured network exchange observed while producing a page.
///
/// Captures feed API discovery and pagination analysis; bodies are retained
/// only when they parsed as JSON and only for the lifetime of the result.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NetworkCapture {
    /// Request URL.
    pub url: String,
    /// Request method.
    pub method: String,
    /// Response status, when observed.
    pub status: Option<u16>,
    /// Response content type, when observed.
    pub content_type: Option<String>,
    /// Parsed JSON response body, when the response was JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
}

impl NetworkCapture {
    /// Returns `true` if this capture carries a JSON body.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        self.json.is_some()
    }
}

/// An API endpoint noticed while producing a page.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiscoveredApi {
    /// Endpoint URL.
    pub url: String,
    /// HTTP method the page used or implied.
    pub method: String,
    /// Where the endpoint was noticed (`network`, `inline-script`, `link`).
    pub source: String,
    /// Response format tag when known (`json`, `graphql`).
    pub response_format: Option<String>,
}

/// Outcome of one strategy invocation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum AttemptOutcome {
    /// The tier produced a valid result.
    Success,
    /// The tier failed; `kind` categorizes the failure for fallback policy.
    Failed {
        /// Failure category.
        kind: ErrorKind,
        /// Human-readable failure reason.
        reason: String,
    },
}

impl AttemptOutcome {
    /// Returns `true` for a successful attempt.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Record of one tier attempt within a fetch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TierAttempt {
    /// Tier that was attempted.
    pub tier: RenderTier,
    /// Wall-clock duration of the attempt.
    pub duration: Duration,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// Validation details, when the response reached validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    /// Id of the proxy used, when one was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_id: Option<String>,
}

impl TierAttempt {
    /// Creates a successful attempt record.
    pub fn success(tier: RenderTier, duration: Duration) -> Self {
        Self {
            tier,
            duration,
            outcome: AttemptOutcome::Success,
            validation: None,
            proxy_id: None,
        }
    }

    /// Creates a failed attempt record.
    pub fn failed(
        tier: RenderTier,
        duration: Duration,
        kind: ErrorKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            tier,
            duration,
            outcome: AttemptOutcome::Failed {
                kind,
                reason: reason.into(),
            },
            validation: None,
            proxy_id: None,
        }
    }

    /// Attaches the validation report produced by this attempt.
    pub fn with_validation(mut self, report: ValidationReport) -> Self {
        self.validation = Some(report);
        self
    }

    /// Attaches the id of the proxy this attempt went through.
    pub fn with_proxy(mut self, proxy_id: impl Into<String>) -> Self {
        self.proxy_id = Some(proxy_id.into());
        self
    }
}

/// Final result of a fetch. Immutable once returned.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FetchResult {
    /// URL the content was ultimately served from, after redirects.
    pub final_url: String,
    /// Extracted content.
    pub content: PageContent,
    /// Tier that produced the content.
    pub tier: RenderTier,
    /// Every tier attempt, in order. Never empty; on success the last entry
    /// matches [`tier`](FetchResult::tier).
    pub attempts: Vec<TierAttempt>,
    /// Network exchanges captured while producing the page.
    pub network: Vec<NetworkCapture>,
    /// API endpoints discovered while producing the page.
    pub discovered_apis: Vec<DiscoveredApi>,
    /// `true` if a cheaper tier failed before this one succeeded.
    pub fell_back: bool,
    /// `true` if the result was served from the adaptive cache.
    pub from_cache: bool,
}

impl FetchResult {
    /// Total time spent across all attempts.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.attempts.iter().map(|a| a.duration).sum()
    }
}
