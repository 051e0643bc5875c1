//! Per-domain learned extraction handlers.
//!
//! The registry accumulates [`SiteObservation`]s per domain. Once enough
//! evidence exists it synthesizes a [`LearnedSiteHandler`]: the dominant
//! strategy becomes the template, recurring selectors and JSON paths become
//! extraction rules, and observed API calls are normalised into URL
//! templates. Handlers shortcut tier selection only while promoted; a
//! handler whose success rate collapses is demoted but keeps learning.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use jiff::Timestamp;

use crate::learn::observation::SiteObservation;
use crate::learn::quirks::{AntiBotHint, SiteQuirks};

/// Observations kept per domain.
const OBSERVATION_RING: usize = 100;

/// Outcome window per handler for promotion and demotion decisions.
const HANDLER_WINDOW: usize = 20;

/// Initial confidence for a rule every observation agreed on.
const RULE_CONFIDENCE_UNANIMOUS: f64 = 0.8;

/// Initial confidence for a rule most observations agreed on.
const RULE_CONFIDENCE_MAJORITY: f64 = 0.7;

/// Extraction template family a handler applies.
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
#[serde(rename_all = "kebab-case")]
pub enum HandlerTemplate {
    /// Storefront with a `/products.json`-style API.
    #[display("shopify-like")]
    ShopifyLike,
    /// Server-side rendered app with hydration state.
    #[display("nextjs-ssr")]
    NextjsSsr,
    /// GraphQL endpoint drives the content.
    #[display("graphql")]
    GraphQl,
    /// Plain REST API drives the content.
    #[display("rest-api")]
    RestApi,
    /// JSON-LD or microdata carries the content.
    #[display("structured-data")]
    StructuredData,
    /// Straight HTML scraping.
    #[display("html-scrape")]
    HtmlScrape,
}

/// One selector or JSON path a handler extracts with.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRule {
    /// CSS selector, when rule is markup-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Dotted JSON path, when rule is state-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    /// Initial confidence from synthesis, adjusted by outcomes.
    pub confidence: f64,
}

/// Normalised API endpoint a handler may call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPattern {
    /// URL template with `{id}` placeholders for numeric segments.
    pub url_template: String,
    /// HTTP method.
    pub method: String,
}

/// A synthesized per-domain handler.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedSiteHandler {
    /// Domain the handler covers.
    pub domain: String,
    /// Template family.
    pub template: HandlerTemplate,
    /// Extraction rules, most reliable first.
    pub rules: Vec<ExtractionRule>,
    /// Normalised API endpoints observed on the domain.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_patterns: Vec<ApiPattern>,
    /// `true` while the handler shortcuts selection.
    pub promoted: bool,
    /// Recent outcomes, newest last. Bounded by the handler window.
    #[serde(default, skip_serializing_if = "VecDeque::is_empty")]
    pub outcomes: VecDeque<bool>,
    /// When the handler was synthesized.
    pub created_at: Timestamp,
    /// Last time the handler was consulted.
    pub last_used: Timestamp,
}

impl LearnedSiteHandler {
    /// Success rate over the recent outcome window; `1.0` when unused.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        let successes = self.outcomes.iter().filter(|outcome| **outcome).count();
        successes as f64 / self.outcomes.len() as f64
    }

    /// Overall confidence the fetcher weighs the handler with.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        let rule_confidence = self
            .rules
            .iter()
            .map(|rule| rule.confidence)
            .fold(0.0f64, f64::max);
        rule_confidence * self.success_rate()
    }
}

/// Extra context a failure carries into quirk learning.
#[derive(Debug, Clone, Default)]
pub struct FailureContext {
    /// HTTP status, when the failure had one.
    pub status: Option<u16>,
    /// Parsed `Retry-After` delay, when the response sent one.
    pub retry_after: Option<Duration>,
    /// Response body excerpt for marker scanning.
    pub body_excerpt: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    handlers: HashMap<String, LearnedSiteHandler>,
    observations: HashMap<String, VecDeque<SiteObservation>>,
    quirks: HashMap<String, SiteQuirks>,
}

/// Persisted form of the registry.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrySnapshot {
    version: u32,
    handlers: Vec<LearnedSiteHandler>,
    learned_sites: Vec<String>,
    quirks: Vec<SiteQuirks>,
    observations: Vec<SiteObservation>,
}

/// Accumulates observations per domain and promotes them into handlers.
pub struct DynamicHandlerRegistry {
    state: Mutex<RegistryState>,
    min_observations: usize,
    demotion_threshold: f64,
    handler_ttl: Duration,
}

impl DynamicHandlerRegistry {
    /// Current snapshot format version.
    pub const VERSION: u32 = 1;

    /// Creates an empty registry.
    pub fn new(min_observations: usize, demotion_threshold: f64, handler_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            min_observations: min_observations.max(1),
            demotion_threshold,
            handler_ttl,
        }
    }

    /// Records one successful extraction's evidence.
    ///
    /// An observation whose dedup key already exists in the domain ring
    /// replaces the old entry, so replayed traces do not inflate evidence.
    /// Once the ring holds enough observations and no handler exists yet,
    /// one is synthesized.
    pub fn record_observation(&self, observation: SiteObservation) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let domain = observation.domain.clone();
        let key = observation.dedup_key();

        let ring = state.observations.entry(domain.clone()).or_default();
        if let Some(existing) = ring
            .iter_mut()
            .find(|candidate| candidate.dedup_key() == key)
        {
            *existing = observation;
        } else {
            if ring.len() == OBSERVATION_RING {
                ring.pop_front();
            }
            ring.push_back(observation);
        }

        let evidence: Option<Vec<SiteObservation>> = (ring.len() >= self.min_observations)
            .then(|| ring.iter().cloned().collect());

        if let Some(observations) = evidence
            && !state.handlers.contains_key(&domain)
        {
            let handler = synthesize_handler(&domain, &observations);
            #[cfg(feature = "tracing")]
            tracing::info!(
                target: crate::TRACING_TARGET_LEARN,
                domain = %domain,
                template = %handler.template,
                "synthesized site handler",
            );
            state.handlers.insert(domain, handler);
        }
    }

    /// Records a failed fetch, updating the domain's quirks.
    pub fn record_failure(&self, url: &url::Url, context: &FailureContext) {
        let Some(domain) = url.host_str() else {
            return;
        };
        let domain = domain.to_ascii_lowercase();

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let quirks = state
            .quirks
            .entry(domain.clone())
            .or_insert_with(|| SiteQuirks::new(domain.as_str()));

        match context.status {
            Some(403) => quirks.require_stealth("403 from origin"),
            Some(429) => quirks.tighten_rate_limit(),
            _ => {}
        }

        if let Some(delay) = context.retry_after {
            quirks.raise_min_delay(delay);
        }

        if let Some(body) = &context.body_excerpt
            && (body.contains("cf-challenge") || body.contains("Just a moment"))
        {
            quirks.anti_bot = Some(AntiBotHint {
                vendor: "cloudflare".to_string(),
                evidence: "challenge markup in body".to_string(),
            });
        }
    }

    /// Returns the promoted handler covering `url`, with its confidence.
    #[must_use]
    pub fn find_handler(&self, url: &url::Url) -> Option<(LearnedSiteHandler, f64)> {
        let domain = url.host_str()?.to_ascii_lowercase();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let handler = state.handlers.get_mut(&domain)?;

        if !handler.promoted {
            return None;
        }
        handler.last_used = Timestamp::now();
        let confidence = handler.confidence();
        Some((handler.clone(), confidence))
    }

    /// Records the outcome of using a domain's handler.
    ///
    /// A promoted handler whose windowed success rate falls below the
    /// demotion threshold stops shortcutting selection; observations keep
    /// accumulating and outcomes can promote it again.
    pub fn record_handler_outcome(&self, domain: &str, success: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(handler) = state.handlers.get_mut(domain) else {
            return;
        };

        if handler.outcomes.len() == HANDLER_WINDOW {
            handler.outcomes.pop_front();
        }
        handler.outcomes.push_back(success);

        let rate = handler.success_rate();
        if handler.promoted && rate < self.demotion_threshold {
            handler.promoted = false;
            #[cfg(feature = "tracing")]
            tracing::warn!(
                target: crate::TRACING_TARGET_LEARN,
                domain,
                rate,
                "demoted site handler",
            );
        } else if !handler.promoted && rate >= self.demotion_threshold && success {
            handler.promoted = true;
        }
    }

    /// Returns the learned quirks for a domain.
    #[must_use]
    pub fn quirks(&self, domain: &str) -> Option<SiteQuirks> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.quirks.get(domain).cloned()
    }

    /// Drops handlers idle past the handler TTL.
    pub fn prune_idle(&self) {
        let now = Timestamp::now();
        let ttl = self.handler_ttl;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.handlers.retain(|_, handler| {
            let idle = now.duration_since(handler.last_used);
            idle.as_secs_f64() < ttl.as_secs_f64()
        });
    }

    /// Serializes the registry to its versioned JSON form.
    pub fn to_snapshot_json(&self) -> serde_json::Result<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let mut handlers: Vec<LearnedSiteHandler> = state.handlers.values().cloned().collect();
        handlers.sort_by(|a, b| a.domain.cmp(&b.domain));

        let mut learned_sites: Vec<String> = state.observations.keys().cloned().collect();
        learned_sites.sort();

        let mut quirks: Vec<SiteQuirks> = state.quirks.values().cloned().collect();
        quirks.sort_by(|a, b| a.domain.cmp(&b.domain));

        let mut observations: Vec<SiteObservation> = state
            .observations
            .values()
            .flat_map(|ring| ring.iter().cloned())
            .collect();
        observations.sort_by(|a, b| a.domain.cmp(&b.domain).then(a.url.cmp(&b.url)));

        let snapshot = RegistrySnapshot {
            version: Self::VERSION,
            handlers,
            learned_sites,
            quirks,
            observations,
        };
        serde_json::to_string_pretty(&snapshot)
    }

    /// Restores a registry from its versioned JSON form.
    pub fn from_snapshot_json(
        json: &str,
        min_observations: usize,
        demotion_threshold: f64,
        handler_ttl: Duration,
    ) -> serde_json::Result<Self> {
        let snapshot: RegistrySnapshot = serde_json::from_str(json)?;

        let mut state = RegistryState::default();
        for handler in snapshot.handlers {
            state.handlers.insert(handler.domain.clone(), handler);
        }
        for quirks in snapshot.quirks {
            state.quirks.insert(quirks.domain.clone(), quirks);
        }
        for observation in snapshot.observations {
            state
                .observations
                .entry(observation.domain.clone())
                .or_default()
                .push_back(observation);
        }

        Ok(Self {
            state: Mutex::new(state),
            min_observations: min_observations.max(1),
            demotion_threshold,
            handler_ttl,
        })
    }
}

impl fmt::Debug for DynamicHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("DynamicHandlerRegistry")
            .field("handlers", &state.handlers.len())
            .field("domains_observed", &state.observations.len())
            .finish_non_exhaustive()
    }
}

/// Builds a handler from a domain's observation ring.
fn synthesize_handler(domain: &str, observations: &[SiteObservation]) -> LearnedSiteHandler {
    let template = infer_template(observations);

    // Rules: selectors first, ranked by how many observations used them.
    let mut selector_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut path_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for observation in observations {
        for selector in &observation.selectors {
            *selector_counts.entry(selector).or_default() += 1;
        }
        for path in &observation.json_paths {
            *path_counts.entry(path).or_default() += 1;
        }
    }

    let total = observations.len();
    let confidence_for = |count: usize| {
        if count == total {
            RULE_CONFIDENCE_UNANIMOUS
        } else {
            RULE_CONFIDENCE_MAJORITY
        }
    };

    let mut rules: Vec<ExtractionRule> = selector_counts
        .iter()
        .filter(|(_, count)| **count * 2 > total)
        .map(|(selector, count)| ExtractionRule {
            selector: Some((*selector).to_string()),
            json_path: None,
            confidence: confidence_for(*count),
        })
        .collect();
    rules.extend(
        path_counts
            .iter()
            .filter(|(_, count)| **count * 2 > total)
            .map(|(path, count)| ExtractionRule {
                selector: None,
                json_path: Some((*path).to_string()),
                confidence: confidence_for(*count),
            }),
    );
    rules.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    // API patterns: normalise numeric path segments to {id}, dedup.
    let mut api_patterns: Vec<ApiPattern> = Vec::new();
    for observation in observations {
        for call in &observation.api_calls {
            let template = normalize_api_url(call);
            if !api_patterns.iter().any(|p| p.url_template == template) {
                api_patterns.push(ApiPattern {
                    url_template: template,
                    method: "GET".to_string(),
                });
            }
        }
    }

    let now = Timestamp::now();
    LearnedSiteHandler {
        domain: domain.to_string(),
        template,
        rules,
        api_patterns,
        promoted: true,
        outcomes: VecDeque::new(),
        created_at: now,
        last_used: now,
    }
}

/// Picks the template family the observations point at.
fn infer_template(observations: &[SiteObservation]) -> HandlerTemplate {
    let calls = |needle: &str| {
        observations
            .iter()
            .flat_map(|observation| observation.api_calls.iter())
            .any(|call| call.contains(needle))
    };
    let paths = |needle: &str| {
        observations
            .iter()
            .flat_map(|observation| observation.json_paths.iter())
            .any(|path| path.contains(needle))
    };
    let strategy_majority = dominant_strategy(observations);

    if calls("/graphql") {
        HandlerTemplate::GraphQl
    } else if calls("/products.json") || calls("/collections/") {
        HandlerTemplate::ShopifyLike
    } else if paths("props.pageProps") || strategy_majority == "embedded-state" {
        HandlerTemplate::NextjsSsr
    } else if strategy_majority == "api-bypass" {
        HandlerTemplate::RestApi
    } else if strategy_majority == "structured-data" {
        HandlerTemplate::StructuredData
    } else {
        HandlerTemplate::HtmlScrape
    }
}

fn dominant_strategy(observations: &[SiteObservation]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for observation in observations {
        *counts.entry(observation.strategy.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(strategy, _)| strategy.to_string())
        .unwrap_or_default()
}

/// Replaces numeric path segments with `{id}`.
fn normalize_api_url(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return raw.to_string();
    };

    let normalized: Vec<String> = url
        .path()
        .split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                "{id}".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect();
    url.set_path(&normalized.join("/"));
    url.set_query(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(url: &str, strategy: &str, selectors: &[&str]) -> SiteObservation {
        SiteObservation {
            url: url.to_string(),
            domain: "example.com".to_string(),
            strategy: strategy.to_string(),
            selectors: selectors.iter().map(ToString::to_string).collect(),
            json_paths: Vec::new(),
            api_calls: Vec::new(),
            duration: Duration::from_millis(300),
            observed_at: Timestamp::now(),
        }
    }

    fn registry() -> DynamicHandlerRegistry {
        DynamicHandlerRegistry::new(3, 0.3, Duration::from_secs(30 * 24 * 60 * 60))
    }

    #[test]
    fn handler_appears_after_min_observations() {
        let registry = registry();
        let url = url::Url::parse("https://example.com/a").unwrap();

        for index in 0..2 {
            registry.record_observation(observation(
                &format!("https://example.com/a{index}"),
                "html-scrape",
                &["article h1", "article .body"],
            ));
            assert!(registry.find_handler(&url).is_none());
        }

        registry.record_observation(observation(
            "https://example.com/a2",
            "html-scrape",
            &["article h1", "article .body"],
        ));

        let (handler, confidence) = registry.find_handler(&url).unwrap();
        assert_eq!(handler.template, HandlerTemplate::HtmlScrape);
        assert!(handler.promoted);
        assert!((confidence - RULE_CONFIDENCE_UNANIMOUS).abs() < f64::EPSILON);
        assert_eq!(handler.rules.len(), 2);
    }

    #[test]
    fn duplicate_observation_does_not_promote() {
        let registry = registry();
        let url = url::Url::parse("https://example.com/a").unwrap();

        let same = observation("https://example.com/a", "html-scrape", &["article"]);
        for _ in 0..5 {
            registry.record_observation(same.clone());
        }
        assert!(registry.find_handler(&url).is_none());
    }

    #[test]
    fn graphql_calls_pick_graphql_template() {
        let registry = registry();
        for index in 0..3 {
            let mut obs = observation(
                &format!("https://example.com/p{index}"),
                "embedded-state",
                &[],
            );
            obs.api_calls = vec!["https://example.com/graphql".to_string()];
            registry.record_observation(obs);
        }

        let url = url::Url::parse("https://example.com/p0").unwrap();
        let (handler, _) = registry.find_handler(&url).unwrap();
        assert_eq!(handler.template, HandlerTemplate::GraphQl);
    }

    #[test]
    fn api_urls_are_normalized() {
        let registry = registry();
        for index in 0..3 {
            let mut obs = observation(
                &format!("https://example.com/item/{index}"),
                "html-scrape",
                &["h1"],
            );
            obs.api_calls = vec![format!("https://example.com/api/items/{index}?full=1")];
            registry.record_observation(obs);
        }

        let url = url::Url::parse("https://example.com/item/0").unwrap();
        let (handler, _) = registry.find_handler(&url).unwrap();
        assert_eq!(handler.api_patterns.len(), 1);
        assert_eq!(
            handler.api_patterns[0].url_template,
            "https://example.com/api/items/{id}"
        );
    }

    #[test]
    fn demotion_below_threshold() {
        let registry = registry();
        for index in 0..3 {
            registry.record_observation(observation(
                &format!("https://example.com/a{index}"),
                "html-scrape",
                &["article"],
            ));
        }
        let url = url::Url::parse("https://example.com/a0").unwrap();
        assert!(registry.find_handler(&url).is_some());

        // 1 success then 4 failures: rate 0.2 < 0.3 → demoted.
        registry.record_handler_outcome("example.com", true);
        for _ in 0..4 {
            registry.record_handler_outcome("example.com", false);
        }
        assert!(registry.find_handler(&url).is_none());

        // Recovery: successes push the window back over the threshold.
        for _ in 0..3 {
            registry.record_handler_outcome("example.com", true);
        }
        assert!(registry.find_handler(&url).is_some());
    }

    #[test]
    fn failures_update_quirks() {
        let registry = registry();
        let url = url::Url::parse("https://fussy.com/page").unwrap();

        registry.record_failure(
            &url,
            &FailureContext {
                status: Some(403),
                ..FailureContext::default()
            },
        );
        registry.record_failure(
            &url,
            &FailureContext {
                status: Some(429),
                retry_after: Some(Duration::from_secs(12)),
                ..FailureContext::default()
            },
        );

        let quirks = registry.quirks("fussy.com").unwrap();
        assert!(quirks.stealth_required);
        assert!(quirks.rate_limit.is_some());
        assert_eq!(quirks.min_delay, Some(Duration::from_secs(12)));
    }

    #[test]
    fn snapshot_round_trip_preserves_find_handler() {
        let registry = registry();
        for index in 0..3 {
            registry.record_observation(observation(
                &format!("https://example.com/a{index}"),
                "html-scrape",
                &["article h1"],
            ));
        }

        let json = registry.to_snapshot_json().unwrap();
        let restored = DynamicHandlerRegistry::from_snapshot_json(
            &json,
            3,
            0.3,
            Duration::from_secs(30 * 24 * 60 * 60),
        )
        .unwrap();

        let url = url::Url::parse("https://example.com/a0").unwrap();
        let (original, original_confidence) = registry.find_handler(&url).unwrap();
        let (reloaded, reloaded_confidence) = restored.find_handler(&url).unwrap();
        assert_eq!(original.template, reloaded.template);
        assert_eq!(original.rules, reloaded.rules);
        assert!((original_confidence - reloaded_confidence).abs() < f64::EPSILON);
    }
}
