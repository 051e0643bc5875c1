//! Engine configuration knobs.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;

/// Every tunable of the engine, with the defaults the components assume.
///
/// A fresh [`CoreConfig::default`] is a working configuration; tests
/// typically override one or two knobs through the builder.
///
/// # Examples
///
/// ```rust
/// use strata_core::CoreConfig;
///
/// let config = CoreConfig::builder()
///     .with_min_content_length(300_usize)
///     .with_cache_capacity(10_000_usize)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.min_content_length, 300);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(validate = "Self::validate_config")
)]
pub struct CoreConfig {
    /// Validation floor for extracted text length.
    #[builder(default = "500")]
    pub min_content_length: usize,

    /// Per-tier attempt timeout.
    #[builder(default = "Duration::from_secs(30)")]
    pub tier_timeout: Duration,

    /// Global fetch deadline when the request sets no latency budget.
    #[builder(default = "Duration::from_secs(120)")]
    pub global_timeout: Duration,

    /// Proxy window failure share above which a proxy is unhealthy.
    #[builder(default = "0.3")]
    pub block_threshold: f64,

    /// Default forced-cooldown duration.
    #[builder(default = "Duration::from_secs(60 * 60)")]
    pub cooldown: Duration,

    /// Sliding outcome window size per proxy.
    #[builder(default = "100")]
    pub health_window: usize,

    /// Sticky session lifetime.
    #[builder(default = "Duration::from_secs(10 * 60)")]
    pub sticky_session_ttl: Duration,

    /// Domain risk classification cache lifetime.
    #[builder(default = "Duration::from_secs(60 * 60)")]
    pub risk_cache: Duration,

    /// Whether fetch outcomes update the risk classifier.
    #[builder(default = "true")]
    pub enable_risk_learning: bool,

    /// Observations required before a handler is synthesized for a domain.
    #[builder(default = "3")]
    pub min_observations: usize,

    /// Success rate at which a handler is promoted.
    #[builder(default = "0.8")]
    pub promotion_threshold: f64,

    /// Success rate under which a promoted handler is demoted.
    #[builder(default = "0.3")]
    pub demotion_threshold: f64,

    /// Idle time after which a handler is pruned.
    #[builder(default = "Duration::from_secs(30 * 24 * 60 * 60)")]
    pub handler_ttl: Duration,

    /// Cache entry capacity across all shards.
    #[builder(default = "4096")]
    pub cache_capacity: usize,

    /// Base page TTL before the domain-category multiplier.
    #[builder(default = "Duration::from_secs(15 * 60)")]
    pub default_page_ttl: Duration,

    /// Lower TTL clamp.
    #[builder(default = "Duration::from_secs(30)")]
    pub min_ttl: Duration,

    /// Upper TTL clamp.
    #[builder(default = "Duration::from_secs(24 * 60 * 60)")]
    pub max_ttl: Duration,

    /// Performance sample window per domain.
    #[builder(default = "1000")]
    pub perf_window: usize,

    /// Fail fetches outright when no proxy pool is configured.
    ///
    /// Off by default: an engine with zero pools connects directly.
    #[builder(default = "false")]
    pub require_proxy: bool,

    /// Directory for persisted learning stores. `None` keeps everything
    /// in memory.
    #[builder(default = "None")]
    pub data_dir: Option<PathBuf>,
}

impl CoreConfig {
    /// Creates a builder for [`CoreConfig`].
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfigBuilder::default()
            .build()
            .unwrap_or_else(|_| unreachable!("default config is valid"))
    }
}

impl CoreConfigBuilder {
    fn validate_config(&self) -> Result<(), String> {
        if let Some(threshold) = &self.block_threshold
            && !(0.0..=1.0).contains(threshold)
        {
            return Err("Block threshold must be within [0, 1]".to_string());
        }

        if let Some(window) = &self.health_window
            && *window == 0
        {
            return Err("Health window must be greater than 0".to_string());
        }

        if let Some(capacity) = &self.cache_capacity
            && *capacity == 0
        {
            return Err("Cache capacity must be greater than 0".to_string());
        }

        if let (Some(min), Some(max)) = (&self.min_ttl, &self.max_ttl)
            && min > max
        {
            return Err("Minimum TTL cannot exceed maximum TTL".to_string());
        }

        Ok(())
    }
}
