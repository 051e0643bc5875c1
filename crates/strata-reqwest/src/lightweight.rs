//! The middle tier: rendering work without a browser.
//!
//! Much of the modern web ships its content in the page after all, just
//! not in the markup: hydration state, JSON-LD, a meta-refresh hop away.
//! This strategy mines those before anyone pays for a browser, and raises
//! the explicit upgrade signal when only JavaScript can help.

use scraper::{Html, Selector};
use strata_core::extract;
use strata_core::strategy::{FetchStrategy, StrategyOutput, StrategyRequest};
use strata_core::tier::RenderTier;
use strata_core::{Error, ErrorKind, Result};

use crate::client::{status_failure, HttpExchange, HttpFetcher};

/// Meta-refresh hops the strategy will follow.
const MAX_REFRESH_HOPS: usize = 2;

/// Body markers that identify a challenge page a plain client cannot pass.
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-challenge",
    "challenge-platform",
    "Just a moment",
    "Enable JavaScript and cookies",
];

/// HTTP fetch plus embedded-state hydration and meta-refresh following.
#[derive(Debug, Clone)]
pub struct LightweightStrategy {
    http: HttpFetcher,
}

impl LightweightStrategy {
    /// Creates the strategy over the given HTTP plumbing.
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }

    async fn fetch_following_refresh(
        &self,
        request: &StrategyRequest,
    ) -> Result<(HttpExchange, url::Url)> {
        let mut url = request.url.clone();

        for _hop in 0..=MAX_REFRESH_HOPS {
            let exchange = self
                .http
                .get(
                    &url,
                    request.proxy.as_ref(),
                    request.quirks.as_ref(),
                    request.timeout,
                )
                .await?;
            if let Some(error) = status_failure(exchange.status) {
                return Err(error);
            }

            match meta_refresh_target(&exchange.body, &url) {
                Some(next) if next != url => url = next,
                _ => return Ok((exchange, url)),
            }
        }

        Err(Error::new(
            ErrorKind::ValidationIncomplete,
            format!("meta refresh did not settle within {MAX_REFRESH_HOPS} hops"),
        ))
    }
}

#[async_trait::async_trait]
impl FetchStrategy for LightweightStrategy {
    fn tier(&self) -> RenderTier {
        RenderTier::Lightweight
    }

    async fn execute(&self, request: StrategyRequest) -> Result<StrategyOutput> {
        let (exchange, final_url) = self.fetch_following_refresh(&request).await?;

        // A challenge shell needs a real browser, not more parsing.
        if CHALLENGE_MARKERS
            .iter()
            .any(|marker| exchange.body.contains(marker))
        {
            return Err(Error::new(
                ErrorKind::NeedUpgrade,
                "page serves an anti-bot challenge, a browser session is required",
            ));
        }

        let mut extraction = extract::extract_page(&exchange.body, &final_url);
        let mut extraction_strategy = "html-scrape";
        let mut json_paths_used: Vec<String> = Vec::new();

        let document = Html::parse_document(&exchange.body);
        if let Some(state) = extract::embedded_state(&document) {
            // Hydration state is the page's own data; prefer it when the
            // markup carried less.
            let state_text = flatten_state_text(&state);
            if !state_text.is_empty() && state_text.len() >= extraction.content.text.len() {
                extraction.content.text = state_text;
                extraction_strategy = "embedded-state";
            }
            if state.get("props").is_some() {
                json_paths_used.push("props.pageProps".to_string());
            }

            let structured = extraction.content.structured.get_or_insert_with(Default::default);
            structured.insert("state".to_string(), state);
        }

        // An empty shell without embedded state is a JS app; escalate.
        if extraction.content.text.trim().len() < 50 && looks_like_js_shell(&exchange.body) {
            return Err(Error::new(
                ErrorKind::NeedUpgrade,
                "page is an empty JavaScript shell",
            ));
        }

        Ok(StrategyOutput {
            content: extraction.content,
            final_url: final_url.to_string(),
            status: Some(exchange.status),
            headers: exchange.headers,
            network: Vec::new(),
            discovered_apis: extraction.discovered_apis,
            extraction_strategy: extraction_strategy.to_string(),
            selectors_used: Vec::new(),
            json_paths_used,
            html: Some(exchange.body),
        })
    }
}

/// Finds a meta-refresh redirect target.
fn meta_refresh_target(html: &str, base: &url::Url) -> Option<url::Url> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("meta[http-equiv]").ok()?;

    for element in document.select(&selector) {
        let http_equiv = element.value().attr("http-equiv")?;
        if !http_equiv.eq_ignore_ascii_case("refresh") {
            continue;
        }
        let content = element.value().attr("content")?;
        // Format: "0; url=/next" (the url part is optional).
        let target = content
            .split(';')
            .map(str::trim)
            .find_map(|part| part.strip_prefix("url=").or_else(|| part.strip_prefix("URL=")))?;
        return base.join(target.trim_matches(['\'', '"'])).ok();
    }
    None
}

/// A tiny body full of script tags and mount points is a JS app shell.
fn looks_like_js_shell(html: &str) -> bool {
    let script_count = html.matches("<script").count();
    let has_mount = html.contains("id=\"root\"")
        || html.contains("id=\"app\"")
        || html.contains("id=\"__next\"");
    script_count >= 1 && (has_mount || html.len() < 4096)
}

fn flatten_state_text(state: &serde_json::Value) -> String {
    fn walk(value: &serde_json::Value, out: &mut Vec<String>) {
        match value {
            serde_json::Value::String(text) if text.len() > 2 => out.push(text.clone()),
            serde_json::Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            serde_json::Value::Object(fields) => {
                fields.values().for_each(|field| walk(field, out));
            }
            _ => {}
        }
    }

    let mut parts = Vec::new();
    walk(state, &mut parts);
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use strata_core::strategy::StrategyRequest;
    use tower::service_fn;

    use super::*;

    fn request_for(url: &str) -> StrategyRequest {
        StrategyRequest::new(url::Url::parse(url).unwrap(), Duration::from_secs(5))
    }

    fn fetcher_serving(body: &'static str) -> HttpFetcher {
        HttpFetcher::from_service(service_fn(move |_req: http::Request<Bytes>| async move {
            let response = http::Response::builder()
                .status(200)
                .body(Bytes::from_static(body.as_bytes()))?;
            Ok::<_, Error>(response)
        }))
    }

    #[tokio::test]
    async fn hydration_state_beats_sparse_markup() {
        const SHELL: &str = r#"<html><body>
            <div id="__next"></div>
            <script id="__NEXT_DATA__" type="application/json">
                {"props": {"pageProps": {"article": {"body": "A full article body that only exists inside the hydration state of this page and nowhere in the markup."}}}}
            </script>
        </body></html>"#;
        let strategy = LightweightStrategy::new(fetcher_serving(SHELL));

        let output = strategy
            .execute(request_for("https://app.example.com/article"))
            .await
            .unwrap();
        assert_eq!(output.extraction_strategy, "embedded-state");
        assert!(output.content.text.contains("hydration state"));
        assert!(output.json_paths_used.contains(&"props.pageProps".to_string()));
    }

    #[tokio::test]
    async fn challenge_page_requests_upgrade() {
        const CHALLENGE: &str =
            r#"<html><body>Just a moment<div class="cf-challenge"></div></body></html>"#;
        let strategy = LightweightStrategy::new(fetcher_serving(CHALLENGE));

        let error = strategy
            .execute(request_for("https://guarded.example.com/"))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NeedUpgrade);
    }

    #[tokio::test]
    async fn empty_shell_requests_upgrade() {
        const SHELL: &str =
            r#"<html><body><div id="root"></div><script src="/bundle.js"></script></body></html>"#;
        let strategy = LightweightStrategy::new(fetcher_serving(SHELL));

        let error = strategy
            .execute(request_for("https://spa.example.com/"))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NeedUpgrade);
    }

    #[test]
    fn meta_refresh_parsing() {
        let base = url::Url::parse("https://example.com/start").unwrap();
        let html = r#"<html><head>
            <meta http-equiv="refresh" content="0; url=/landed">
        </head></html>"#;

        let target = meta_refresh_target(html, &base).unwrap();
        assert_eq!(target.as_str(), "https://example.com/landed");

        assert!(meta_refresh_target("<html></html>", &base).is_none());
    }
}
