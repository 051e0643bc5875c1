//! The tiered fetch orchestrator.
//!
//! [`TieredFetcher`] runs the cascade: pick a start tier, route through a
//! proxy, invoke the tier's strategy, validate, learn, and either return
//! or escalate. [`Core`] owns every stateful component, so tests get a
//! fresh world by building a fresh `Core`.

pub mod preference;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::cache::{AdaptiveCache, CacheControl, CachePolicy};
use crate::config::CoreConfig;
use crate::learn::handlers::{
    DynamicHandlerRegistry, FailureContext, HandlerTemplate, LearnedSiteHandler,
};
use crate::learn::knowledge::{Confidence, KnowledgeBase, LearnedApiPattern};
use crate::learn::observation::SiteObservation;
use crate::learn::pagination::{self, PaginationContext, PaginationDiscovery};
use crate::limit::DomainRateLimiter;
use crate::perf::{PerformanceTracker, Timings};
use crate::persist::{self, JsonStore};
use crate::proxy::health::{FailureReason, ProxyHealthTracker};
use crate::proxy::manager::{ProxyManager, SelectRequest, SelectedProxy};
use crate::proxy::risk::DomainRiskClassifier;
use crate::request::{FetchRequest, Freshness};
use crate::result::{FetchResult, TierAttempt};
use crate::ssrf;
use crate::strategy::{FetchStrategy, StrategyOutput, StrategyRequest};
use crate::tier::RenderTier;
use crate::validate::validate_content;
use crate::{Error, ErrorKind, Result};

pub use preference::{DomainPreference, PreferenceStore};

/// Recent page URLs remembered per domain for pagination analysis.
const HISTORY_RING: usize = 10;

/// Owns every stateful component of the engine.
///
/// Construct one per process (or per test) and share it behind an `Arc`.
/// Nothing in here is global; two `Core`s never observe each other.
pub struct Core {
    config: CoreConfig,
    health: Arc<ProxyHealthTracker>,
    risk: DomainRiskClassifier,
    proxies: ProxyManager,
    knowledge: KnowledgeBase,
    pagination: PaginationDiscovery,
    handlers: DynamicHandlerRegistry,
    cache: AdaptiveCache<Arc<FetchResult>>,
    perf: PerformanceTracker,
    limiter: DomainRateLimiter,
    preferences: PreferenceStore,
    browser_required: Mutex<HashSet<String>>,
    history: Mutex<HashMap<String, VecDeque<String>>>,
}

impl Core {
    /// Creates a core with empty learning state.
    pub fn new(config: CoreConfig) -> Self {
        let health = Arc::new(ProxyHealthTracker::new(
            config.health_window,
            config.block_threshold,
            config.sticky_session_ttl,
        ));

        Self {
            health: health.clone(),
            risk: DomainRiskClassifier::new(config.risk_cache, config.enable_risk_learning),
            proxies: ProxyManager::new(health),
            knowledge: KnowledgeBase::new(),
            pagination: PaginationDiscovery::new(),
            handlers: DynamicHandlerRegistry::new(
                config.min_observations,
                config.demotion_threshold,
                config.handler_ttl,
            ),
            cache: AdaptiveCache::new(
                config.cache_capacity,
                config.default_page_ttl,
                config.min_ttl,
                config.max_ttl,
            ),
            perf: PerformanceTracker::new(config.perf_window),
            limiter: DomainRateLimiter::new(),
            preferences: PreferenceStore::new(),
            browser_required: Mutex::new(HashSet::new()),
            history: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Creates a core, restoring learning stores from the configured data
    /// directory where snapshot files exist.
    pub async fn restore(config: CoreConfig) -> Self {
        let mut core = Self::new(config);
        let Some(data_dir) = core.config.data_dir.clone() else {
            return core;
        };

        let knowledge_store = JsonStore::new(&data_dir, persist::KNOWLEDGE_BASE_FILE);
        if let Ok(Some(json)) = knowledge_store.load().await
            && let Ok(restored) = KnowledgeBase::from_snapshot_json(&json)
        {
            core.knowledge = restored;
        }

        let pagination_store = JsonStore::new(&data_dir, persist::PAGINATION_FILE);
        if let Ok(Some(json)) = pagination_store.load().await
            && let Ok(restored) = PaginationDiscovery::from_snapshot_json(&json)
        {
            core.pagination = restored;
        }

        let handler_store = JsonStore::new(&data_dir, persist::HANDLERS_FILE);
        if let Ok(Some(json)) = handler_store.load().await
            && let Ok(restored) = DynamicHandlerRegistry::from_snapshot_json(
                &json,
                core.config.min_observations,
                core.config.demotion_threshold,
                core.config.handler_ttl,
            )
        {
            core.handlers = restored;
        }

        core
    }

    /// Snapshots the learning stores to the configured data directory.
    ///
    /// A failed write is logged and swallowed per store; the engine keeps
    /// running on its in-memory state.
    pub async fn snapshot(&self) -> Result<()> {
        let Some(data_dir) = self.config.data_dir.clone() else {
            return Ok(());
        };

        let mut first_error = None;

        let stores: [(&str, serde_json::Result<String>); 3] = [
            (persist::KNOWLEDGE_BASE_FILE, self.knowledge.to_snapshot_json()),
            (persist::PAGINATION_FILE, self.pagination.to_snapshot_json()),
            (persist::HANDLERS_FILE, self.handlers.to_snapshot_json()),
        ];

        for (file_name, serialized) in stores {
            let contents = match serialized {
                Ok(contents) => contents,
                Err(error) => {
                    first_error.get_or_insert(Error::with_source(
                        ErrorKind::Persistence,
                        format!("failed to serialize {file_name}"),
                        Box::new(error),
                    ));
                    continue;
                }
            };

            let store = JsonStore::new(&data_dir, file_name);
            if let Err(error) = store.save(&contents).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    target: crate::TRACING_TARGET_LEARN,
                    file = file_name,
                    error = %error,
                    "snapshot failed, continuing in memory",
                );
                first_error.get_or_insert(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Marks a domain as requiring the browser tier from the start.
    pub fn mark_browser_required(&self, domain: &str) {
        let mut set = self.browser_required.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(domain.to_ascii_lowercase());
    }

    fn is_browser_required(&self, domain: &str) -> bool {
        let set = self.browser_required.lock().unwrap_or_else(|e| e.into_inner());
        set.contains(domain)
    }

    fn remember_url(&self, domain: &str, url: &str) -> Vec<String> {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let ring = history.entry(domain.to_string()).or_default();
        if ring.back().map(String::as_str) != Some(url) {
            if ring.len() == HISTORY_RING {
                ring.pop_front();
            }
            ring.push_back(url.to_string());
        }
        ring.iter().cloned().collect()
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Proxy health tracker.
    #[must_use]
    pub fn health(&self) -> &ProxyHealthTracker {
        &self.health
    }

    /// Domain risk classifier.
    #[must_use]
    pub fn risk(&self) -> &DomainRiskClassifier {
        &self.risk
    }

    /// Proxy manager.
    #[must_use]
    pub fn proxies(&self) -> &ProxyManager {
        &self.proxies
    }

    /// API pattern knowledge base.
    #[must_use]
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Pagination pattern store.
    #[must_use]
    pub fn pagination(&self) -> &PaginationDiscovery {
        &self.pagination
    }

    /// Handler registry.
    #[must_use]
    pub fn handlers(&self) -> &DynamicHandlerRegistry {
        &self.handlers
    }

    /// Adaptive result cache.
    #[must_use]
    pub fn cache(&self) -> &AdaptiveCache<Arc<FetchResult>> {
        &self.cache
    }

    /// Performance tracker.
    #[must_use]
    pub fn perf(&self) -> &PerformanceTracker {
        &self.perf
    }

    /// Learned tier preferences.
    #[must_use]
    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core").finish_non_exhaustive()
    }
}

/// Orchestrates fetches across registered strategies.
///
/// Strategies are registered per tier; the fetcher walks them in cost
/// order, enforcing the request's budgets and recording every outcome to
/// the learners.
pub struct TieredFetcher {
    core: Arc<Core>,
    strategies: BTreeMap<RenderTier, Arc<dyn FetchStrategy>>,
}

impl TieredFetcher {
    /// Creates a fetcher with no strategies registered.
    pub fn new(core: Arc<Core>) -> Self {
        Self {
            core,
            strategies: BTreeMap::new(),
        }
    }

    /// Registers a strategy for its tier, replacing any previous one.
    pub fn with_strategy(mut self, strategy: Arc<dyn FetchStrategy>) -> Self {
        self.strategies.insert(strategy.tier(), strategy);
        self
    }

    /// The shared core.
    #[must_use]
    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// Fetches a URL under the request's budgets.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResult> {
        self.fetch_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Fetches a URL; cancelling the token aborts between suspension
    /// points without recording anything to the learners.
    pub async fn fetch_with_cancel(
        &self,
        request: FetchRequest,
        cancel: CancellationToken,
    ) -> Result<FetchResult> {
        let core = &self.core;
        let url = ssrf::check_url(&request.url)?;
        let domain = ssrf::domain_of(&url);
        let min_content_length = request
            .min_content_length
            .unwrap_or(core.config.min_content_length);

        // Cache consult. Realtime callers never read the cache.
        let cache_key = AdaptiveCache::<Arc<FetchResult>>::cache_key(&request.url, None);
        if request.freshness != Freshness::Realtime
            && let Some(hit) = core.cache.get(&cache_key)
        {
            let mut result = (*hit).clone();
            result.from_cache = true;
            return Ok(result);
        }

        // A promoted handler suggests the route that has been working.
        let handler = core.handlers.find_handler(&url);

        let order = self.tier_order(&request, &domain, handler.as_ref())?;
        let skipped: Vec<RenderTier> = RenderTier::ALL
            .into_iter()
            .filter(|tier| *tier > request.max_cost_tier)
            .collect();

        let budget = request
            .max_latency
            .unwrap_or(core.config.global_timeout)
            .min(core.config.global_timeout);
        let started = Instant::now();

        let mut attempts: Vec<TierAttempt> = Vec::new();
        let mut last_error: Option<Error> = None;

        for tier in order {
            if started.elapsed() >= budget {
                let error = Error::new(
                    ErrorKind::LatencyBudget,
                    format!(
                        "latency budget of {budget:?} exhausted after {} attempts",
                        attempts.len(),
                    ),
                );
                return Err(error.with_attempts(attempts));
            }

            // Per-domain pacing from risk level and learned quirks.
            let quirks = core.handlers.quirks(&domain);
            let pace = core
                .risk
                .recommended_delay(&domain)
                .max(quirks.as_ref().and_then(|q| q.min_delay).unwrap_or_default());
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(Error::new(ErrorKind::Cancelled, "fetch cancelled")
                        .with_attempts(attempts));
                }
                () = core.limiter.acquire(&domain, pace) => {}
            }

            // Proxy selection. An engine with no pools connects directly.
            let selected = match self.select_proxy(&request, &domain) {
                Ok(selected) => selected,
                Err(error) => return Err(error.with_attempts(attempts)),
            };

            let bypass = (tier == RenderTier::Intelligence)
                .then(|| {
                    core.knowledge
                        .get_bypassable_patterns(&domain)
                        .into_iter()
                        .find(|pattern| pattern.matches_path(url.path()))
                })
                .flatten();

            let remaining = budget.saturating_sub(started.elapsed());
            let attempt_timeout = core.config.tier_timeout.min(remaining);
            let strategy_request = StrategyRequest {
                url: url.clone(),
                proxy: selected.as_ref().map(|s| s.endpoint.clone()),
                quirks,
                timeout: attempt_timeout,
                bypass,
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(
                target: crate::TRACING_TARGET_FETCHER,
                url = %url,
                tier = %tier,
                proxy = selected.as_ref().map(|s| s.endpoint.id.as_str()),
                "attempting tier",
            );

            let Some(strategy) = self.strategies.get(&tier).cloned() else {
                continue;
            };

            let attempt_start = Instant::now();
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    // Cancelled attempts record nothing to the learners.
                    return Err(Error::new(ErrorKind::Cancelled, "fetch cancelled")
                        .with_attempts(attempts));
                }
                outcome = tokio::time::timeout(attempt_timeout, strategy.execute(strategy_request)) => outcome,
            };
            let duration = attempt_start.elapsed();

            match outcome {
                Err(_elapsed) => {
                    let reason = format!("tier timed out after {attempt_timeout:?}");
                    self.record_failed_attempt(
                        &domain,
                        &url,
                        tier,
                        duration,
                        selected.as_ref(),
                        ErrorKind::Transport,
                        None,
                    );
                    attempts.push(attempt_record(
                        tier,
                        duration,
                        ErrorKind::Transport,
                        &reason,
                        selected.as_ref(),
                    ));
                    last_error = Some(Error::new(ErrorKind::Transport, reason));
                }
                Ok(Err(error)) => {
                    let kind = error.kind();
                    self.record_failed_attempt(
                        &domain,
                        &url,
                        tier,
                        duration,
                        selected.as_ref(),
                        kind,
                        None,
                    );
                    attempts.push(attempt_record(
                        tier,
                        duration,
                        kind,
                        error.message(),
                        selected.as_ref(),
                    ));
                    let escalates = kind.escalates();
                    last_error = Some(error);
                    if !escalates {
                        break;
                    }
                }
                Ok(Ok(output)) => {
                    let report = validate_content(
                        output.html.as_deref(),
                        &output.content.text,
                        min_content_length,
                    );

                    if report.valid {
                        let mut attempt = TierAttempt::success(tier, duration)
                            .with_validation(report);
                        if let Some(selected) = &selected {
                            attempt = attempt.with_proxy(&selected.endpoint.id);
                        }
                        attempts.push(attempt);

                        if handler.is_some() {
                            core.handlers.record_handler_outcome(&domain, true);
                        }

                        let result = self.record_success(
                            &request,
                            &url,
                            &domain,
                            tier,
                            duration,
                            selected.as_ref(),
                            output,
                            attempts,
                            &cache_key,
                        );
                        return Ok(result);
                    }

                    let kind = report.kind.unwrap_or(ErrorKind::ValidationShort);
                    let reason = report
                        .reason
                        .clone()
                        .unwrap_or_else(|| "content failed validation".to_string());
                    self.record_failed_attempt(
                        &domain,
                        &url,
                        tier,
                        duration,
                        selected.as_ref(),
                        kind,
                        Some(&output),
                    );
                    let mut attempt =
                        attempt_record(tier, duration, kind, &reason, selected.as_ref());
                    attempt.validation = Some(report);
                    attempts.push(attempt);
                    last_error = Some(Error::new(kind, reason));
                }
            }
        }

        if handler.is_some() {
            core.handlers.record_handler_outcome(&domain, false);
        }

        let error = match last_error {
            Some(error) if skipped.is_empty() => error,
            Some(error) => {
                let names: Vec<&str> = skipped.iter().map(|tier| tier.as_str()).collect();
                Error::new(
                    error.kind(),
                    format!("{}; tiers beyond cost budget: {names:?}", error.message()),
                )
            }
            None => Error::new(ErrorKind::Other, "no tier was attempted"),
        };
        Err(error.with_attempts(attempts))
    }

    /// Computes the tier walk for a request.
    ///
    /// The start tier comes from the caller's override, then the learned
    /// preference, then the promoted handler's template, then the
    /// browser-required list, then the cheapest tier. The walk is clamped
    /// to the cost budget and filtered to registered strategies; when the
    /// clamp leaves nothing, the cheapest registered strategy is used
    /// anyway so the fetch can still succeed.
    fn tier_order(
        &self,
        request: &FetchRequest,
        domain: &str,
        handler: Option<&(LearnedSiteHandler, f64)>,
    ) -> Result<Vec<RenderTier>> {
        let core = &self.core;
        let start = request
            .force_tier
            .or_else(|| core.preferences.start_tier(domain))
            .or_else(|| handler.map(|(handler, _)| handler_start_tier(&handler.template)))
            .or_else(|| {
                core.is_browser_required(domain)
                    .then_some(RenderTier::Browser)
            })
            .unwrap_or(RenderTier::Intelligence);

        let start = start.min(request.max_cost_tier);
        let planned: Vec<RenderTier> = start
            .and_above()
            .filter(|tier| *tier <= request.max_cost_tier)
            .filter(|tier| self.strategies.contains_key(tier))
            .collect();

        if !planned.is_empty() {
            return Ok(planned);
        }

        match self.strategies.keys().next() {
            Some(cheapest) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    target: crate::TRACING_TARGET_FETCHER,
                    domain,
                    tier = %cheapest,
                    "no tier within cost budget, using cheapest available",
                );
                Ok(vec![*cheapest])
            }
            None => Err(Error::new(
                ErrorKind::CostBudget,
                "no fetch strategies registered",
            )),
        }
    }

    fn select_proxy(
        &self,
        request: &FetchRequest,
        domain: &str,
    ) -> Result<Option<SelectedProxy>> {
        let core = &self.core;
        let recommended = core.risk.classify(domain).recommended_tier;
        let select = SelectRequest {
            domain,
            plan: request.plan,
            override_tier: None,
            recommended_tier: recommended,
            country: request.country.as_deref(),
            sticky_session: request.sticky_session.as_deref(),
        };

        match core.proxies.select(&select) {
            Ok(selected) => Ok(Some(selected)),
            Err(error)
                if error.kind() == ErrorKind::NoProxy && !core.config.require_proxy =>
            {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Learning fan-out for a failed attempt.
    #[allow(clippy::too_many_arguments)]
    fn record_failed_attempt(
        &self,
        domain: &str,
        url: &url::Url,
        tier: RenderTier,
        duration: Duration,
        selected: Option<&SelectedProxy>,
        kind: ErrorKind,
        output: Option<&StrategyOutput>,
    ) {
        let core = &self.core;
        let was_blocked = kind == ErrorKind::Blocked;

        if let Some(selected) = selected {
            let failure = match kind {
                ErrorKind::Blocked => Some(FailureReason::Blocked),
                ErrorKind::Transport => Some(FailureReason::Transport),
                // Validation failures mean the exchange itself worked.
                ErrorKind::ValidationShort | ErrorKind::ValidationIncomplete => None,
                ErrorKind::NeedUpgrade => None,
                _ => Some(FailureReason::Transport),
            };
            match failure {
                Some(failure) => {
                    core.health
                        .record_failure(&selected.endpoint.id, domain, failure);
                }
                None => core
                    .health
                    .record_success(&selected.endpoint.id, domain, duration),
            }
        }

        core.risk.record_failure(domain, was_blocked);
        core.preferences.record_failure(domain);
        core.perf.record(
            domain,
            Timings {
                total: duration,
                ..Timings::default()
            },
            tier,
            false,
        );

        if was_blocked {
            let status = output.and_then(|output| output.status);
            core.handlers.record_failure(
                url,
                &FailureContext {
                    status: status.or(Some(403)),
                    retry_after: None,
                    body_excerpt: output.and_then(|output| output.html.clone()),
                },
            );
        }
    }

    /// Learning fan-out for a success, and the final result assembly.
    #[allow(clippy::too_many_arguments)]
    fn record_success(
        &self,
        request: &FetchRequest,
        url: &url::Url,
        domain: &str,
        tier: RenderTier,
        duration: Duration,
        selected: Option<&SelectedProxy>,
        output: StrategyOutput,
        attempts: Vec<TierAttempt>,
        cache_key: &str,
    ) -> FetchResult {
        let core = &self.core;

        if let Some(selected) = selected {
            core.health
                .record_success(&selected.endpoint.id, domain, duration);
        }
        core.risk.record_success(domain);
        core.preferences.record_success(domain, tier, duration);
        core.perf.record(
            domain,
            Timings {
                total: duration,
                ..Timings::default()
            },
            tier,
            true,
        );

        // Protection markers on a successful response still raise risk.
        if let Some(html) = &output.html {
            let _ = core
                .risk
                .detect_protection_from_response(domain, &output.headers, html);
        }

        // Observation for the handler registry.
        let strategy_tag = if output.extraction_strategy.is_empty() {
            tier.as_str().to_string()
        } else {
            output.extraction_strategy.clone()
        };
        core.handlers.record_observation(SiteObservation {
            url: request.url.clone(),
            domain: domain.to_string(),
            strategy: strategy_tag,
            selectors: output.selectors_used.clone(),
            json_paths: output.json_paths_used.clone(),
            api_calls: output
                .discovered_apis
                .iter()
                .map(|api| api.url.clone())
                .collect(),
            duration,
            observed_at: jiff::Timestamp::now(),
        });

        // Discovered endpoints enter the knowledge base at low confidence.
        let learned: Vec<LearnedApiPattern> = output
            .discovered_apis
            .iter()
            .map(|api| {
                let now = jiff::Timestamp::now();
                let is_graphql = api.response_format.as_deref() == Some("graphql");
                LearnedApiPattern {
                    template_type: if is_graphql {
                        "graphql".to_string()
                    } else {
                        "rest-resource".to_string()
                    },
                    url_patterns: vec![url.path().to_string()],
                    endpoint: api.url.clone(),
                    method: api.method.clone(),
                    required_headers: Default::default(),
                    response_format: api
                        .response_format
                        .clone()
                        .unwrap_or_else(|| "json".to_string()),
                    content_mapping: Default::default(),
                    validation: Default::default(),
                    confidence: Confidence::Low,
                    can_bypass: false,
                    success_count: 0,
                    failure_count: 0,
                    success_rate: 1.0,
                    domains_seen: 1,
                    created_at: now,
                    updated_at: now,
                }
            })
            .collect();
        core.knowledge.learn(domain, learned);

        // Pagination analysis when this fetch participated in a paginated
        // flow.
        let page_urls = core.remember_url(domain, &request.url);
        if pagination::looks_paginated(url) && !output.network.is_empty() {
            let context = PaginationContext {
                page_urls,
                captures: output.network.clone(),
            };
            let _ = core.pagination.analyze(&context);
        }

        // Cache write, honouring the response's own caching wishes.
        let cache_control: Option<CacheControl> = output
            .headers
            .get(http::header::CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        let policy = CachePolicy {
            freshness: request.freshness,
            cache_control,
        };
        let decision = core.cache.compute_ttl(domain, &policy);

        if let Some(html) = &output.html {
            core.cache.set_content(&request.url, html);
        }

        let final_url = if output.final_url.is_empty() {
            request.url.clone()
        } else {
            output.final_url
        };
        let fell_back = attempts.len() > 1;
        let result = FetchResult {
            final_url,
            content: output.content,
            tier,
            attempts,
            network: output.network,
            discovered_apis: output.discovered_apis,
            fell_back,
            from_cache: false,
        };

        core.cache
            .insert(cache_key, Arc::new(result.clone()), decision);

        #[cfg(feature = "tracing")]
        tracing::info!(
            target: crate::TRACING_TARGET_FETCHER,
            url = %request.url,
            tier = %tier,
            fell_back,
            duration_ms = duration.as_millis() as u64,
            "fetch succeeded",
        );

        result
    }
}

impl fmt::Debug for TieredFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tiers: Vec<RenderTier> = self.strategies.keys().copied().collect();
        f.debug_struct("TieredFetcher")
            .field("strategies", &tiers)
            .finish_non_exhaustive()
    }
}

/// The tier a handler's template implies content can be had from.
fn handler_start_tier(template: &HandlerTemplate) -> RenderTier {
    match template {
        HandlerTemplate::ShopifyLike
        | HandlerTemplate::GraphQl
        | HandlerTemplate::RestApi
        | HandlerTemplate::StructuredData
        | HandlerTemplate::HtmlScrape => RenderTier::Intelligence,
        HandlerTemplate::NextjsSsr => RenderTier::Lightweight,
    }
}

fn attempt_record(
    tier: RenderTier,
    duration: Duration,
    kind: ErrorKind,
    reason: &str,
    selected: Option<&SelectedProxy>,
) -> TierAttempt {
    let mut attempt = TierAttempt::failed(tier, duration, kind, reason);
    if let Some(selected) = selected {
        attempt = attempt.with_proxy(&selected.endpoint.id);
    }
    attempt
}
