//! Fetch request options.

use std::time::Duration;

use derive_builder::Builder;

use crate::tier::{RenderTier, TenantPlan};

/// Freshness requirement for a fetch.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Cached results must never be served; stored entries get the minimum TTL.
    Realtime,
    /// Cached results are preferred; stored entries get an extended TTL.
    Cached,
    /// Serve from cache when fresh, fetch otherwise.
    #[default]
    Any,
}

/// Caller-supplied options for one fetch.
///
/// Budgets are enforced monotonically during fallback: no attempt runs on a
/// tier more expensive than [`max_cost_tier`], and no new attempt starts
/// after [`max_latency`] has elapsed.
///
/// # Examples
///
/// ```rust
/// use strata_core::request::FetchRequest;
/// use strata_core::tier::RenderTier;
///
/// let request = FetchRequest::builder()
///     .with_url("https://example.com/article")
///     .with_max_cost_tier(RenderTier::Lightweight)
///     .with_min_content_length(300_usize)
///     .build()
///     .unwrap();
///
/// assert_eq!(request.max_cost_tier, RenderTier::Lightweight);
/// ```
///
/// [`max_cost_tier`]: FetchRequest::max_cost_tier
/// [`max_latency`]: FetchRequest::max_latency
#[derive(Debug, Clone, Builder)]
#[builder(
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(validate = "Self::validate_request")
)]
pub struct FetchRequest {
    /// Absolute URL to fetch.
    pub url: String,
    /// Forces the starting tier, bypassing learned preferences.
    #[builder(default = "None")]
    pub force_tier: Option<RenderTier>,
    /// The most expensive tier fallback may reach.
    #[builder(default = "RenderTier::Browser")]
    pub max_cost_tier: RenderTier,
    /// Wall-clock budget across all tier attempts.
    #[builder(default = "None")]
    pub max_latency: Option<Duration>,
    /// Freshness requirement.
    #[builder(default)]
    pub freshness: Freshness,
    /// Overrides the validation floor for extracted text length.
    #[builder(default = "None")]
    pub min_content_length: Option<usize>,
    /// Tenant plan, clipping the proxy tiers available to this fetch.
    #[builder(default)]
    pub plan: TenantPlan,
    /// Pins this and subsequent fetches with the same id to one proxy.
    #[builder(default = "None")]
    pub sticky_session: Option<String>,
    /// Preferred proxy exit country (ISO 3166-1 alpha-2).
    #[builder(default = "None")]
    pub country: Option<String>,
}

impl FetchRequest {
    /// Creates a builder for [`FetchRequest`].
    pub fn builder() -> FetchRequestBuilder {
        FetchRequestBuilder::default()
    }

    /// Creates a request for the URL with default options.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            force_tier: None,
            max_cost_tier: RenderTier::Browser,
            max_latency: None,
            freshness: Freshness::default(),
            min_content_length: None,
            plan: TenantPlan::default(),
            sticky_session: None,
            country: None,
        }
    }
}

impl FetchRequestBuilder {
    fn validate_request(&self) -> Result<(), String> {
        if let Some(url) = &self.url
            && url.trim().is_empty()
        {
            return Err("URL cannot be empty".to_string());
        }

        if let Some(Some(latency)) = &self.max_latency
            && latency.is_zero()
        {
            return Err("Latency budget must be greater than 0".to_string());
        }

        if let Some(Some(country)) = &self.country
            && country.len() != 2
        {
            return Err("Country must be an ISO 3166-1 alpha-2 code".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let request = FetchRequest::builder()
            .with_url("https://example.com/")
            .build()
            .unwrap();

        assert_eq!(request.max_cost_tier, RenderTier::Browser);
        assert_eq!(request.freshness, Freshness::Any);
        assert!(request.force_tier.is_none());
    }

    #[test]
    fn builder_rejects_empty_url() {
        let result = FetchRequest::builder().with_url("  ").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_bad_country() {
        let result = FetchRequest::builder()
            .with_url("https://example.com/")
            .with_country("USA")
            .build();
        assert!(result.is_err());
    }
}
