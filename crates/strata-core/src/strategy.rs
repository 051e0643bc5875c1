//! Fetch strategy and browser driver interfaces.
//!
//! A [`FetchStrategy`] is one rung of the rendering ladder. The fetcher
//! treats every tier uniformly through this trait; concrete implementations
//! live in the backend crates (`strata-reqwest`, `strata-thirtyfour`).
//!
//! A strategy that discovers mid-flight that it cannot produce a complete
//! page returns [`ErrorKind::NeedUpgrade`], which the fetcher treats as an
//! explicit escalation request.
//!
//! [`ErrorKind::NeedUpgrade`]: crate::ErrorKind::NeedUpgrade

use std::time::Duration;

use http::HeaderMap;

use crate::learn::knowledge::LearnedApiPattern;
use crate::learn::quirks::SiteQuirks;
use crate::proxy::pool::ProxyEndpoint;
use crate::result::{DiscoveredApi, NetworkCapture, PageContent};
use crate::tier::RenderTier;
use crate::Result;

/// Input to one strategy invocation.
///
/// The fetcher resolves proxies, quirks, and bypass patterns before the
/// strategy runs; the strategy itself never consults the learners.
#[derive(Debug, Clone)]
pub struct StrategyRequest {
    /// Absolute URL to fetch. Already passed the safety check.
    pub url: url::Url,
    /// Proxy to route through, when one was selected.
    pub proxy: Option<ProxyEndpoint>,
    /// Learned per-domain adjustments to apply.
    pub quirks: Option<SiteQuirks>,
    /// Attempt deadline.
    pub timeout: Duration,
    /// Validated API pattern that can satisfy this URL without page rendering.
    pub bypass: Option<LearnedApiPattern>,
}

impl StrategyRequest {
    /// Creates a request with no proxy, quirks, or bypass.
    pub fn new(url: url::Url, timeout: Duration) -> Self {
        Self {
            url,
            proxy: None,
            quirks: None,
            timeout,
            bypass: None,
        }
    }
}

/// Output of one successful strategy invocation.
#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    /// Raw HTML, when the strategy produced markup.
    pub html: Option<String>,
    /// Extracted content.
    pub content: PageContent,
    /// URL the content was served from, after redirects.
    pub final_url: String,
    /// Response status, when the strategy speaks HTTP.
    pub status: Option<u16>,
    /// Response headers, when the strategy speaks HTTP.
    pub headers: HeaderMap,
    /// Network exchanges observed while producing the page.
    pub network: Vec<NetworkCapture>,
    /// API endpoints noticed while producing the page.
    pub discovered_apis: Vec<DiscoveredApi>,
    /// Tag naming how the content was extracted (`html-scrape`,
    /// `embedded-state`, `api-bypass`, `browser`).
    pub extraction_strategy: String,
    /// CSS selectors that yielded content, for handler learning.
    pub selectors_used: Vec<String>,
    /// Dotted JSON paths that yielded content, for handler learning.
    pub json_paths_used: Vec<String>,
}

/// Core trait for one rung of the rendering ladder.
///
/// Implementations must be cheap to share: the fetcher holds them behind
/// `Arc` and invokes them concurrently.
#[async_trait::async_trait]
pub trait FetchStrategy: Send + Sync + 'static {
    /// The tier this strategy implements.
    fn tier(&self) -> RenderTier;

    /// Fetches and extracts the page.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::NeedUpgrade`] requests escalation; transport and blocked
    /// kinds are classified by the fetcher's fallback policy.
    ///
    /// [`ErrorKind::NeedUpgrade`]: crate::ErrorKind::NeedUpgrade
    async fn execute(&self, request: StrategyRequest) -> Result<StrategyOutput>;
}

/// Options for one browser navigation.
#[derive(Debug, Clone)]
pub struct BrowsePage {
    /// CSS selector to await before capturing, if any.
    pub wait_for: Option<String>,
    /// Navigation deadline.
    pub timeout: Duration,
    /// Capture network exchanges made by the page.
    pub capture_network: bool,
    /// Capture console output.
    pub capture_console: bool,
    /// Named session profile to reuse, if the driver keeps profiles.
    pub session_profile: Option<String>,
    /// Proxy to route the session through.
    pub proxy: Option<ProxyEndpoint>,
}

impl Default for BrowsePage {
    fn default() -> Self {
        Self {
            wait_for: None,
            timeout: Duration::from_secs(30),
            capture_network: true,
            capture_console: false,
            session_profile: None,
            proxy: None,
        }
    }
}

/// What a browser navigation produced.
///
/// The page handle stays inside the driver; the core only ever sees the
/// serialized capture.
#[derive(Debug, Clone, Default)]
pub struct PageCapture {
    /// Rendered page source.
    pub html: String,
    /// URL after redirects and client-side navigation.
    pub final_url: String,
    /// Network exchanges the page made, when captured.
    pub network: Vec<NetworkCapture>,
    /// Console lines, when captured.
    pub console: Vec<String>,
}

/// Narrow interface to a real browser.
///
/// The top tier drives a browser exclusively through this trait; the core
/// never touches the DOM. `strata-thirtyfour` provides the WebDriver
/// implementation.
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync + 'static {
    /// Navigates to `url` and captures the rendered page.
    async fn browse(&self, url: &str, options: BrowsePage) -> Result<PageCapture>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browse_defaults() {
        let options = BrowsePage::default();
        assert!(options.capture_network);
        assert!(!options.capture_console);
        assert_eq!(options.timeout, Duration::from_secs(30));
    }
}
