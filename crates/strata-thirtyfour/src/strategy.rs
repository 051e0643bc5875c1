//! The browser tier strategy.

use std::sync::Arc;

use strata_core::extract;
use strata_core::strategy::{
    BrowserDriver, BrowsePage, FetchStrategy, StrategyOutput, StrategyRequest,
};
use strata_core::tier::RenderTier;
use strata_core::Result;

/// Adapts any [`BrowserDriver`] into the engine's most expensive tier.
///
/// The strategy drives the browser through the narrow interface, then
/// runs the shared extraction over the rendered source; it never touches
/// the DOM itself.
#[derive(Clone)]
pub struct BrowserStrategy {
    driver: Arc<dyn BrowserDriver>,
}

impl BrowserStrategy {
    /// Creates the strategy over a driver.
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self { driver }
    }
}

#[async_trait::async_trait]
impl FetchStrategy for BrowserStrategy {
    fn tier(&self) -> RenderTier {
        RenderTier::Browser
    }

    async fn execute(&self, request: StrategyRequest) -> Result<StrategyOutput> {
        let wait_for = request
            .quirks
            .as_ref()
            .and_then(|quirks| quirks.selector_overrides.get("wait_for").cloned());

        let options = BrowsePage {
            wait_for,
            timeout: request.timeout,
            capture_network: true,
            capture_console: false,
            session_profile: None,
            proxy: request.proxy.clone(),
        };

        let capture = self.driver.browse(request.url.as_str(), options).await?;

        let final_url = url::Url::parse(&capture.final_url).unwrap_or_else(|_| request.url.clone());
        let extraction = extract::extract_page(&capture.html, &final_url);

        Ok(StrategyOutput {
            content: extraction.content,
            final_url: capture.final_url,
            status: None,
            headers: http::HeaderMap::new(),
            network: capture.network,
            discovered_apis: extraction.discovered_apis,
            extraction_strategy: "browser".to_string(),
            selectors_used: Vec::new(),
            json_paths_used: Vec::new(),
            html: Some(capture.html),
        })
    }
}

impl std::fmt::Debug for BrowserStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserStrategy").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use strata_core::strategy::PageCapture;

    use super::*;

    struct ScriptedDriver {
        html: &'static str,
    }

    #[async_trait::async_trait]
    impl BrowserDriver for ScriptedDriver {
        async fn browse(&self, url: &str, _options: BrowsePage) -> Result<PageCapture> {
            Ok(PageCapture {
                html: self.html.to_string(),
                final_url: url.to_string(),
                network: Vec::new(),
                console: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn renders_and_extracts() {
        const RENDERED: &str = r#"<html><body>
            <article><h1>Rendered</h1><p>Content only a browser produced.</p></article>
        </body></html>"#;

        let strategy = BrowserStrategy::new(Arc::new(ScriptedDriver { html: RENDERED }));
        let request = StrategyRequest::new(
            url::Url::parse("https://app.example.com/feed").unwrap(),
            Duration::from_secs(30),
        );

        let output = strategy.execute(request).await.unwrap();
        assert_eq!(output.extraction_strategy, "browser");
        assert_eq!(output.content.title.as_deref(), Some("Rendered"));
        assert!(output.content.text.contains("only a browser produced"));
    }
}
