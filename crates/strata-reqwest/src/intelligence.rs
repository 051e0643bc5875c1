//! The cheapest tier: one GET plus content intelligence.

use strata_core::extract;
use strata_core::learn::path::PathSegment;
use strata_core::result::{NetworkCapture, PageContent};
use strata_core::strategy::{FetchStrategy, StrategyOutput, StrategyRequest};
use strata_core::tier::RenderTier;
use strata_core::{Error, ErrorKind, Result};

use crate::client::{status_failure, HttpExchange, HttpFetcher};

/// Plain HTTP fetch with extraction, and direct API bypass when the
/// knowledge base offers a validated pattern for the URL.
#[derive(Debug, Clone)]
pub struct IntelligenceStrategy {
    http: HttpFetcher,
}

impl IntelligenceStrategy {
    /// Creates the strategy over the given HTTP plumbing.
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }

    /// Satisfies the request straight from a learned API endpoint.
    async fn execute_bypass(
        &self,
        request: &StrategyRequest,
        pattern: &strata_core::learn::knowledge::LearnedApiPattern,
    ) -> Result<StrategyOutput> {
        let endpoint = url::Url::parse(&pattern.endpoint).map_err(|error| {
            Error::with_source(
                ErrorKind::Other,
                "learned endpoint is not a valid URL",
                Box::new(error),
            )
        })?;

        let exchange = self
            .http
            .get(
                &endpoint,
                request.proxy.as_ref(),
                request.quirks.as_ref(),
                request.timeout,
            )
            .await?;
        if let Some(error) = status_failure(exchange.status) {
            return Err(error);
        }

        let document: serde_json::Value =
            serde_json::from_str(&exchange.body).map_err(|error| {
                Error::with_source(
                    ErrorKind::ValidationIncomplete,
                    "bypass endpoint did not return JSON",
                    Box::new(error),
                )
            })?;

        for field in &pattern.validation.required_fields {
            if document.get(field).is_none() {
                return Err(Error::new(
                    ErrorKind::ValidationIncomplete,
                    format!("bypass response is missing required field {field:?}"),
                ));
            }
        }

        let title = PathSegment::resolve(&pattern.content_mapping.title_path, &document)
            .and_then(|value| value.as_str())
            .map(ToString::to_string);
        let text = PathSegment::resolve(&pattern.content_mapping.body_path, &document)
            .and_then(|value| value.as_str())
            .map(ToString::to_string)
            .unwrap_or_else(|| document.to_string());

        if text.len() < pattern.validation.min_length {
            return Err(Error::new(
                ErrorKind::ValidationShort,
                format!(
                    "bypass body too short: {} < {}",
                    text.len(),
                    pattern.validation.min_length,
                ),
            ));
        }

        let structured = document.as_object().cloned();
        let json_paths_used = [
            &pattern.content_mapping.title_path,
            &pattern.content_mapping.body_path,
        ]
        .into_iter()
        .filter(|path| !path.is_empty())
        .map(|path| PathSegment::format_path(path))
        .collect();

        Ok(StrategyOutput {
            html: None,
            content: PageContent {
                title,
                markdown: text.clone(),
                text,
                structured,
            },
            final_url: exchange.final_url,
            status: Some(exchange.status),
            headers: exchange.headers,
            network: vec![NetworkCapture {
                url: pattern.endpoint.clone(),
                method: pattern.method.clone(),
                status: Some(exchange.status),
                content_type: Some(pattern.response_format.clone()),
                json: Some(document),
            }],
            discovered_apis: Vec::new(),
            extraction_strategy: "api-bypass".to_string(),
            selectors_used: Vec::new(),
            json_paths_used,
        })
    }

    fn page_output(request: &StrategyRequest, exchange: HttpExchange) -> StrategyOutput {
        let extraction = extract::extract_page(&exchange.body, &request.url);

        let selectors_used = selector_trail(&request.quirks, &extraction.content);
        let json_paths_used = extraction
            .content
            .structured
            .as_ref()
            .map(|structured| structured.keys().cloned().collect())
            .unwrap_or_default();

        StrategyOutput {
            content: extraction.content,
            final_url: exchange.final_url,
            status: Some(exchange.status),
            headers: exchange.headers,
            network: Vec::new(),
            discovered_apis: extraction.discovered_apis,
            extraction_strategy: "html-scrape".to_string(),
            selectors_used,
            json_paths_used,
            html: Some(exchange.body),
        }
    }
}

#[async_trait::async_trait]
impl FetchStrategy for IntelligenceStrategy {
    fn tier(&self) -> RenderTier {
        RenderTier::Intelligence
    }

    async fn execute(&self, request: StrategyRequest) -> Result<StrategyOutput> {
        // A validated pattern short-circuits rendering entirely; if the
        // endpoint misbehaves, fall through to the page itself.
        if let Some(pattern) = request.bypass.clone() {
            match self.execute_bypass(&request, &pattern).await {
                Ok(output) => return Ok(output),
                Err(_bypass_error) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        endpoint = %pattern.endpoint,
                        "api bypass failed, fetching the page",
                    );
                }
            }
        }

        let exchange = self
            .http
            .get(
                &request.url,
                request.proxy.as_ref(),
                request.quirks.as_ref(),
                request.timeout,
            )
            .await?;
        if let Some(error) = status_failure(exchange.status) {
            return Err(error);
        }

        Ok(Self::page_output(&request, exchange))
    }
}

/// Selectors the extraction is known to have used, for handler learning.
fn selector_trail(
    quirks: &Option<strata_core::learn::quirks::SiteQuirks>,
    content: &PageContent,
) -> Vec<String> {
    let mut trail = Vec::new();
    if let Some(quirks) = quirks {
        trail.extend(quirks.selector_overrides.values().cloned());
    }
    if content.title.is_some() {
        trail.push("h1".to_string());
    }
    if !content.markdown.is_empty() {
        trail.push("article".to_string());
    }
    trail
}
