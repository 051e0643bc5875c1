//! Proxy selection.
//!
//! The manager owns the tier → pool registry. Selection is lock-light:
//! `select` takes the registry read-lock, health checks take the tracker's
//! short mutex, counters are atomic. Pool mutation takes the write-lock.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::proxy::health::ProxyHealthTracker;
use crate::proxy::pool::{ProxyEndpoint, ProxyPool};
use crate::tier::{ProxyTier, TenantPlan};
use crate::{Error, ErrorKind, Recommendation, Result};

/// Fallback retry hint when no cooldown deadline is known.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Why a particular proxy was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// The proxy came from the tier the classifier recommended.
    OptimalTier,
    /// The recommended tier had no healthy proxy; selection escalated.
    EscalatedFrom(ProxyTier),
    /// A sticky session pinned the proxy.
    StickySession,
}

/// A selected proxy plus the bookkeeping the fetcher records.
#[derive(Debug, Clone)]
pub struct SelectedProxy {
    /// The endpoint to route through.
    pub endpoint: ProxyEndpoint,
    /// Tier the endpoint belongs to.
    pub tier: ProxyTier,
    /// Why this endpoint was chosen.
    pub reason: SelectionReason,
}

/// Inputs to one selection.
#[derive(Debug, Clone)]
pub struct SelectRequest<'a> {
    /// Domain the fetch targets.
    pub domain: &'a str,
    /// Tenant plan, clipping the reachable tiers.
    pub plan: TenantPlan,
    /// Caller-forced tier, overriding the classifier.
    pub override_tier: Option<ProxyTier>,
    /// Tier the risk classifier recommends for the domain.
    pub recommended_tier: ProxyTier,
    /// Required exit country, if any.
    pub country: Option<&'a str>,
    /// Sticky session id, if any.
    pub sticky_session: Option<&'a str>,
}

/// Tier → pool registry with the selection algorithm over it.
pub struct ProxyManager {
    pools: RwLock<Vec<Arc<ProxyPool>>>,
    health: Arc<ProxyHealthTracker>,
}

impl ProxyManager {
    /// Creates an empty manager sharing the given health tracker.
    pub fn new(health: Arc<ProxyHealthTracker>) -> Self {
        Self {
            pools: RwLock::new(Vec::new()),
            health,
        }
    }

    /// Registers a pool and initializes health state for its endpoints.
    pub fn add_pool(&self, pool: ProxyPool) {
        for endpoint in pool.endpoints() {
            self.health.initialize(&endpoint.id, pool.id(), pool.tier());
        }
        let mut pools = self.pools.write().unwrap_or_else(|e| e.into_inner());
        pools.push(Arc::new(pool));
    }

    /// Removes a pool by id. Selections already holding the pool's
    /// endpoints are unaffected.
    pub fn remove_pool(&self, pool_id: &str) -> bool {
        let mut pools = self.pools.write().unwrap_or_else(|e| e.into_inner());
        let before = pools.len();
        pools.retain(|pool| pool.id() != pool_id);
        pools.len() != before
    }

    /// Returns `true` if no pool is registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let pools = self.pools.read().unwrap_or_else(|e| e.into_inner());
        pools.is_empty()
    }

    /// Total endpoints across all pools.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        let pools = self.pools.read().unwrap_or_else(|e| e.into_inner());
        pools.iter().map(|pool| pool.len()).sum()
    }

    /// Selects a proxy for the request.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::NoProxy`] when no pool exists for any allowed tier;
    /// [`ErrorKind::ProxyExhausted`] when pools exist but every candidate is
    /// blocked or cooling down.
    pub fn select(&self, request: &SelectRequest<'_>) -> Result<SelectedProxy> {
        // 1. A live sticky session wins outright.
        if let Some(session) = request.sticky_session
            && let Some(proxy_id) = self.health.get_sticky_proxy(session)
            && self.health.is_healthy_for_domain(&proxy_id, request.domain)
            && let Some((endpoint, tier)) = self.find_endpoint(&proxy_id)
        {
            return Ok(SelectedProxy {
                endpoint,
                tier,
                reason: SelectionReason::StickySession,
            });
        }

        // 2. Target tier, clipped to what the plan allows.
        let max_tier = request.plan.max_proxy_tier();
        let target = request
            .override_tier
            .unwrap_or(request.recommended_tier)
            .min(max_tier);

        // 3. Walk tiers upward from the target.
        let pools = self.pools.read().unwrap_or_else(|e| e.into_inner());
        let mut attempted_tiers = Vec::new();
        let mut saw_pool = false;

        for tier in target.and_above().filter(|tier| *tier <= max_tier) {
            attempted_tiers.push(tier);

            for pool in pools
                .iter()
                .filter(|pool| pool.tier() == tier && pool.is_enabled())
            {
                saw_pool = true;
                let eligible: Vec<usize> = pool
                    .endpoints()
                    .enumerate()
                    .filter(|(_, endpoint)| {
                        self.health
                            .is_healthy_for_domain(&endpoint.id, request.domain)
                    })
                    .filter(|(_, endpoint)| match request.country {
                        Some(country) => endpoint
                            .country
                            .as_deref()
                            .is_some_and(|c| c.eq_ignore_ascii_case(country)),
                        None => true,
                    })
                    .map(|(index, _)| index)
                    .collect();

                let picked = pool.pick(&eligible, |id| self.health.success_rate(id));
                if let Some(endpoint) = picked {
                    let endpoint = endpoint.clone();
                    if let Some(session) = request.sticky_session {
                        self.health.set_sticky_proxy(session, &endpoint.id);
                    }

                    let reason = if tier == target {
                        SelectionReason::OptimalTier
                    } else {
                        SelectionReason::EscalatedFrom(target)
                    };

                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        target: crate::TRACING_TARGET_PROXY,
                        proxy = %endpoint.id,
                        tier = %tier,
                        domain = request.domain,
                        "selected proxy",
                    );

                    return Ok(SelectedProxy {
                        endpoint,
                        tier,
                        reason,
                    });
                }
            }
        }

        // 4. Exhaustion. Distinguish "nothing configured" from "all down".
        if !saw_pool {
            let any_pool_above_plan = pools
                .iter()
                .any(|pool| pool.tier() > max_tier && pool.is_enabled() && !pool.is_empty());

            let error = Error::new(
                ErrorKind::NoProxy,
                format!(
                    "no proxy pool configured for tiers {:?}",
                    attempted_tiers
                        .iter()
                        .map(|tier| tier.as_str())
                        .collect::<Vec<_>>(),
                ),
            );
            return Err(if any_pool_above_plan {
                error.with_recommendation(Recommendation::UpgradePlan)
            } else {
                error
            });
        }

        let retry_after = self
            .health
            .earliest_cooldown_end()
            .map(|until| until.saturating_duration_since(std::time::Instant::now()))
            .unwrap_or(DEFAULT_RETRY_AFTER);

        Err(Error::new(
            ErrorKind::ProxyExhausted,
            format!(
                "all proxies blocked or cooling down for {} (tiers {:?})",
                request.domain,
                attempted_tiers
                    .iter()
                    .map(|tier| tier.as_str())
                    .collect::<Vec<_>>(),
            ),
        )
        .with_recommendation(Recommendation::RetryAfter { retry_after }))
    }

    /// Same-tier retry excluding the failing endpoint, then one tier up.
    pub fn select_fallback(
        &self,
        original: &ProxyEndpoint,
        original_tier: ProxyTier,
        domain: &str,
        plan: TenantPlan,
    ) -> Result<SelectedProxy> {
        let pools = self.pools.read().unwrap_or_else(|e| e.into_inner());
        let max_tier = plan.max_proxy_tier();

        let mut tiers: Vec<ProxyTier> = vec![original_tier];
        if let Some(next) = original_tier
            .and_above()
            .find(|tier| *tier > original_tier && *tier <= max_tier)
        {
            tiers.push(next);
        }

        for tier in tiers {
            for pool in pools
                .iter()
                .filter(|pool| pool.tier() == tier && pool.is_enabled())
            {
                let eligible: Vec<usize> = pool
                    .endpoints()
                    .enumerate()
                    .filter(|(_, endpoint)| endpoint.id != original.id)
                    .filter(|(_, endpoint)| self.health.is_healthy_for_domain(&endpoint.id, domain))
                    .map(|(index, _)| index)
                    .collect();

                if let Some(endpoint) = pool.pick(&eligible, |id| self.health.success_rate(id)) {
                    let reason = if tier == original_tier {
                        SelectionReason::OptimalTier
                    } else {
                        SelectionReason::EscalatedFrom(original_tier)
                    };
                    return Ok(SelectedProxy {
                        endpoint: endpoint.clone(),
                        tier,
                        reason,
                    });
                }
            }
        }

        Err(Error::new(
            ErrorKind::ProxyExhausted,
            format!("no fallback proxy available for {domain}"),
        ))
    }

    /// Resolves an endpoint id to its endpoint and tier.
    fn find_endpoint(&self, proxy_id: &str) -> Option<(ProxyEndpoint, ProxyTier)> {
        let pools = self.pools.read().unwrap_or_else(|e| e.into_inner());
        pools.iter().find_map(|pool| {
            pool.endpoint(proxy_id)
                .map(|endpoint| (endpoint.clone(), pool.tier()))
        })
    }

    /// Shared health tracker.
    #[must_use]
    pub fn health(&self) -> &Arc<ProxyHealthTracker> {
        &self.health
    }
}

impl fmt::Debug for ProxyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pools = self.pools.read().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("ProxyManager")
            .field("pools", &pools.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::health::FailureReason;
    use crate::proxy::pool::RotationStrategy;

    fn tracker() -> Arc<ProxyHealthTracker> {
        Arc::new(ProxyHealthTracker::new(
            100,
            0.3,
            Duration::from_secs(600),
        ))
    }

    fn residential_pool(id: &str, endpoints: &[&str]) -> ProxyPool {
        let endpoints = endpoints
            .iter()
            .map(|endpoint_id| {
                ProxyEndpoint::new(
                    *endpoint_id,
                    id,
                    format!("http://user:pass@{endpoint_id}.exit.example:8080"),
                )
                .with_residential(true)
            })
            .collect();
        ProxyPool::new(
            id,
            "residential",
            ProxyTier::Residential,
            RotationStrategy::RoundRobin,
            endpoints,
        )
    }

    fn request<'a>(domain: &'a str, plan: TenantPlan) -> SelectRequest<'a> {
        SelectRequest {
            domain,
            plan,
            override_tier: None,
            recommended_tier: ProxyTier::Datacenter,
            country: None,
            sticky_session: None,
        }
    }

    #[test]
    fn no_pools_is_no_proxy() {
        let manager = ProxyManager::new(tracker());
        let error = manager
            .select(&request("example.com", TenantPlan::Enterprise))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NoProxy);
    }

    #[test]
    fn plan_clip_recommends_upgrade() {
        let manager = ProxyManager::new(tracker());
        manager.add_pool(residential_pool("resi", &["r1"]));

        // Free plan cannot reach the only (residential) pool.
        let error = manager
            .select(&request("example.com", TenantPlan::Free))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NoProxy);
        assert_eq!(
            error.recommendation(),
            Some(&Recommendation::UpgradePlan)
        );
    }

    #[test]
    fn escalates_when_target_tier_empty() {
        let manager = ProxyManager::new(tracker());
        manager.add_pool(residential_pool("resi", &["r1", "r2"]));

        let selected = manager
            .select(&request("example.com", TenantPlan::Pro))
            .unwrap();
        assert_eq!(selected.tier, ProxyTier::Residential);
        assert_eq!(
            selected.reason,
            SelectionReason::EscalatedFrom(ProxyTier::Datacenter)
        );
    }

    #[test]
    fn blocked_domain_moves_to_next_endpoint() {
        let health = tracker();
        let manager = ProxyManager::new(health.clone());
        manager.add_pool(residential_pool("resi", &["a", "b"]));

        // Keep a's window above the health threshold so only the block set
        // and cooldown are in play.
        for _ in 0..20 {
            health.record_success("a", "warmup.com", Duration::from_millis(50));
        }
        for _ in 0..3 {
            health.record_failure("a", "site.com", FailureReason::Blocked);
        }
        health.clear_cooldown("a");

        // a is blocked for site.com, so every selection lands on b.
        for _ in 0..3 {
            let selected = manager
                .select(&SelectRequest {
                    recommended_tier: ProxyTier::Residential,
                    ..request("site.com", TenantPlan::Pro)
                })
                .unwrap();
            assert_eq!(selected.endpoint.id, "b");
        }

        // Other domains may still use a.
        let mut seen = std::collections::HashSet::new();
        for _ in 0..4 {
            let selected = manager
                .select(&SelectRequest {
                    recommended_tier: ProxyTier::Residential,
                    ..request("other.com", TenantPlan::Pro)
                })
                .unwrap();
            seen.insert(selected.endpoint.id.clone());
        }
        assert!(seen.contains("a"));
    }

    #[test]
    fn exhaustion_reports_retry_after() {
        let health = tracker();
        let manager = ProxyManager::new(health.clone());
        manager.add_pool(residential_pool("resi", &["a"]));
        health.force_cooldown("a", "test", Duration::from_secs(120));

        let error = manager
            .select(&SelectRequest {
                recommended_tier: ProxyTier::Residential,
                ..request("site.com", TenantPlan::Pro)
            })
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ProxyExhausted);
        match error.recommendation() {
            Some(Recommendation::RetryAfter { retry_after }) => {
                assert!(*retry_after <= Duration::from_secs(120));
                assert!(*retry_after > Duration::from_secs(60));
            }
            other => panic!("unexpected recommendation: {other:?}"),
        }
    }

    #[test]
    fn sticky_session_pins_endpoint() {
        let manager = ProxyManager::new(tracker());
        manager.add_pool(residential_pool("resi", &["a", "b", "c"]));

        let first = manager
            .select(&SelectRequest {
                recommended_tier: ProxyTier::Residential,
                sticky_session: Some("sess-1"),
                ..request("shop.com", TenantPlan::Pro)
            })
            .unwrap();

        for _ in 0..5 {
            let again = manager
                .select(&SelectRequest {
                    recommended_tier: ProxyTier::Residential,
                    sticky_session: Some("sess-1"),
                    ..request("shop.com", TenantPlan::Pro)
                })
                .unwrap();
            assert_eq!(again.endpoint.id, first.endpoint.id);
            assert_eq!(again.reason, SelectionReason::StickySession);
        }
    }

    #[test]
    fn country_filter_applies() {
        let health = tracker();
        let manager = ProxyManager::new(health);
        let endpoints = vec![
            ProxyEndpoint::new("us-1", "dc", "http://u:p@us.exit:8080").with_country("US"),
            ProxyEndpoint::new("de-1", "dc", "http://u:p@de.exit:8080").with_country("DE"),
        ];
        manager.add_pool(ProxyPool::new(
            "dc",
            "datacenter",
            ProxyTier::Datacenter,
            RotationStrategy::RoundRobin,
            endpoints,
        ));

        let selected = manager
            .select(&SelectRequest {
                country: Some("de"),
                ..request("example.com", TenantPlan::Free)
            })
            .unwrap();
        assert_eq!(selected.endpoint.id, "de-1");
    }

    #[test]
    fn fallback_excludes_failing_endpoint() {
        let manager = ProxyManager::new(tracker());
        manager.add_pool(residential_pool("resi", &["a", "b"]));

        let original = ProxyEndpoint::new("a", "resi", "http://u:p@a.exit:8080");
        let fallback = manager
            .select_fallback(
                &original,
                ProxyTier::Residential,
                "site.com",
                TenantPlan::Pro,
            )
            .unwrap();
        assert_eq!(fallback.endpoint.id, "b");
    }
}
