//! Environment-driven configuration.
//!
//! Everything here is read once, at engine construction. A missing
//! variable simply means "no pool of that tier" or "keep the default";
//! a malformed value is skipped rather than failing the build.
//!
//! The parsing is written against a lookup function rather than
//! `std::env` directly, so tests never mutate process state.

use std::time::Duration;

use strata_core::proxy::pool::{ProxyEndpoint, ProxyPool, RotationStrategy};
use strata_core::tier::ProxyTier;
use strata_core::CoreConfig;

/// Comma-separated datacenter proxy credential URLs.
pub const ENV_DATACENTER: &str = "STRATA_DATACENTER_PROXIES";
/// Comma-separated residential proxy credential URLs.
pub const ENV_RESIDENTIAL: &str = "STRATA_RESIDENTIAL_PROXIES";
/// Comma-separated unblocker proxy credential URLs.
pub const ENV_UNBLOCKER: &str = "STRATA_UNBLOCKER_PROXIES";
/// Exit country applied to every environment-configured endpoint.
pub const ENV_COUNTRY: &str = "STRATA_PROXY_COUNTRY";
/// Validation floor override.
pub const ENV_MIN_CONTENT_LENGTH: &str = "STRATA_MIN_CONTENT_LENGTH";
/// Proxy health window override.
pub const ENV_HEALTH_WINDOW: &str = "STRATA_HEALTH_WINDOW";
/// Proxy block threshold override.
pub const ENV_BLOCK_THRESHOLD: &str = "STRATA_BLOCK_THRESHOLD";
/// Risk classification cache lifetime override, in minutes.
pub const ENV_RISK_CACHE_MINUTES: &str = "STRATA_RISK_CACHE_MINUTES";
/// Cache capacity override.
pub const ENV_CACHE_CAPACITY: &str = "STRATA_CACHE_CAPACITY";
/// Directory for persisted learning stores.
pub const ENV_DATA_DIR: &str = "STRATA_DATA_DIR";

/// Builds proxy pools from the process environment.
#[must_use]
pub fn pools_from_env() -> Vec<ProxyPool> {
    pools_from(|variable| std::env::var(variable).ok())
}

/// Applies process-environment knob overrides onto a config.
#[must_use]
pub fn apply_env(config: CoreConfig) -> CoreConfig {
    apply(config, |variable| std::env::var(variable).ok())
}

/// Builds proxy pools from a variable lookup, one per configured tier.
pub fn pools_from(lookup: impl Fn(&str) -> Option<String>) -> Vec<ProxyPool> {
    let country = lookup(ENV_COUNTRY);
    let tiers = [
        (ENV_DATACENTER, ProxyTier::Datacenter, "datacenter"),
        (ENV_RESIDENTIAL, ProxyTier::Residential, "residential"),
        (ENV_UNBLOCKER, ProxyTier::Unblocker, "unblocker"),
    ];

    tiers
        .into_iter()
        .filter_map(|(variable, tier, name)| {
            let raw = lookup(variable)?;
            let endpoints: Vec<ProxyEndpoint> = raw
                .split(',')
                .map(str::trim)
                .filter(|candidate| !candidate.is_empty())
                .enumerate()
                .map(|(index, url)| {
                    let mut endpoint = ProxyEndpoint::new(format!("{name}-{index}"), name, url)
                        .with_residential(tier != ProxyTier::Datacenter);
                    if let Some(country) = &country {
                        endpoint = endpoint.with_country(country.clone());
                    }
                    endpoint
                })
                .collect();

            if endpoints.is_empty() {
                return None;
            }
            Some(ProxyPool::new(
                name,
                name,
                tier,
                RotationStrategy::RoundRobin,
                endpoints,
            ))
        })
        .collect()
}

/// Applies knob overrides from a variable lookup onto a config.
pub fn apply(mut config: CoreConfig, lookup: impl Fn(&str) -> Option<String>) -> CoreConfig {
    if let Some(value) = parse::<usize>(&lookup, ENV_MIN_CONTENT_LENGTH) {
        config.min_content_length = value;
    }
    if let Some(value) = parse::<usize>(&lookup, ENV_HEALTH_WINDOW)
        && value > 0
    {
        config.health_window = value;
    }
    if let Some(value) = parse::<f64>(&lookup, ENV_BLOCK_THRESHOLD)
        && (0.0..=1.0).contains(&value)
    {
        config.block_threshold = value;
    }
    if let Some(value) = parse::<u64>(&lookup, ENV_RISK_CACHE_MINUTES) {
        config.risk_cache = Duration::from_secs(value * 60);
    }
    if let Some(value) = parse::<usize>(&lookup, ENV_CACHE_CAPACITY)
        && value > 0
    {
        config.cache_capacity = value;
    }
    if let Some(value) = lookup(ENV_DATA_DIR)
        && !value.trim().is_empty()
    {
        config.data_dir = Some(value.into());
    }
    config
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    variable: &str,
) -> Option<T> {
    let raw = lookup(variable)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(variable, raw, "ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_in<'a>(vars: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |variable| vars.get(variable).map(ToString::to_string)
    }

    #[test]
    fn pools_per_configured_tier() {
        let vars = HashMap::from([
            (
                ENV_RESIDENTIAL,
                "http://u:p@r1.exit:8080, http://u:p@r2.exit:8080",
            ),
            (ENV_COUNTRY, "DE"),
        ]);

        let pools = pools_from(lookup_in(&vars));
        assert_eq!(pools.len(), 1);

        let residential = &pools[0];
        assert_eq!(residential.tier(), ProxyTier::Residential);
        assert_eq!(residential.len(), 2);

        let endpoint = residential.endpoints().next().unwrap();
        assert_eq!(endpoint.id, "residential-0");
        assert_eq!(endpoint.country.as_deref(), Some("DE"));
        assert!(endpoint.residential);
    }

    #[test]
    fn absent_variables_mean_no_pools() {
        let vars = HashMap::new();
        assert!(pools_from(lookup_in(&vars)).is_empty());
    }

    #[test]
    fn knob_overrides_and_malformed_values() {
        let vars = HashMap::from([
            (ENV_MIN_CONTENT_LENGTH, "300"),
            (ENV_RISK_CACHE_MINUTES, "15"),
            (ENV_BLOCK_THRESHOLD, "not-a-number"),
            (ENV_DATA_DIR, "/var/lib/strata"),
        ]);

        let config = apply(CoreConfig::default(), lookup_in(&vars));
        assert_eq!(config.min_content_length, 300);
        assert_eq!(config.risk_cache, Duration::from_secs(900));
        assert!((config.block_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(
            config.data_dir.as_deref(),
            Some(std::path::Path::new("/var/lib/strata"))
        );
    }
}
