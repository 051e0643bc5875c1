//! Adaptive TTL cache.
//!
//! A fixed-capacity LRU keyed by URL (plus optional request parameters,
//! sorted by key). Every entry's TTL is computed from the hostname's
//! [`DomainCategory`], the request's freshness hint, and the response's
//! `Cache-Control`, in that order of precedence:
//!
//! 1. `realtime` freshness clamps to the minimum TTL regardless of domain.
//! 2. Explicit `Cache-Control` overrides the domain multiplier: `no-store`
//!    and `no-cache` clamp to the minimum, `max-age`/`s-maxage` are used
//!    directly (still clamped to the configured bounds).
//! 3. Otherwise `base × multiplier`, doubled for `cached` freshness,
//!    clamped.
//!
//! The store is sharded by key hash; each shard holds its own lock around a
//! map plus recency stamps, so readers on different shards never contend.
//! Expired entries may linger until [`AdaptiveCache::cleanup`] but are
//! never returned to readers.

pub mod category;
pub mod control;

pub use category::DomainCategory;
pub use control::CacheControl;

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::request::Freshness;

/// Shard count. Power of two so the hash masks cleanly.
const NUM_SHARDS: usize = 16;

/// How a TTL was decided, recorded next to the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlDecision {
    /// The TTL the entry got.
    pub ttl: Duration,
    /// `true` when explicit `Cache-Control` drove the decision.
    pub respected_headers: bool,
    /// Category the hostname classified into.
    pub category: DomainCategory,
}

/// Inputs to a TTL computation.
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    /// Freshness hint of the request being cached.
    pub freshness: Freshness,
    /// Parsed `Cache-Control` of the response, when present.
    pub cache_control: Option<CacheControl>,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    stamp: u64,
    decision: TtlDecision,
}

struct Shard<V> {
    entries: HashMap<String, Entry<V>>,
    // Recency queue of (stamp, key); stale pairs are skipped on eviction.
    order: VecDeque<(u64, String)>,
}

impl<V> Shard<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn evict_lru(&mut self) {
        while let Some((stamp, key)) = self.order.pop_front() {
            let is_current = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.stamp == stamp);
            if is_current {
                self.entries.remove(&key);
                return;
            }
        }
    }

    /// Drops stale recency pairs so read-heavy workloads cannot grow the
    /// queue without bound.
    fn compact_order(&mut self, capacity: usize) {
        if self.order.len() <= capacity.saturating_mul(8) {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(stamp, key)| entries.get(key).is_some_and(|entry| entry.stamp == *stamp));
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ContentTrack {
    hash: u64,
    checks: u64,
    changes: u64,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Live entries (including not-yet-collected expired ones).
    pub entries: usize,
    /// Reads that returned a value.
    pub hits: u64,
    /// Reads that found nothing fresh.
    pub misses: u64,
}

/// Sharded LRU cache with domain-aware TTLs.
pub struct AdaptiveCache<V> {
    shards: Vec<Mutex<Shard<V>>>,
    capacity_per_shard: usize,
    base_ttl: Duration,
    min_ttl: Duration,
    max_ttl: Duration,
    stamp: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    content: Mutex<HashMap<String, ContentTrack>>,
}

impl<V: Clone> AdaptiveCache<V> {
    /// Creates a cache with the given total capacity and TTL bounds.
    pub fn new(capacity: usize, base_ttl: Duration, min_ttl: Duration, max_ttl: Duration) -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Mutex::new(Shard::new())).collect();
        Self {
            shards,
            capacity_per_shard: capacity.div_ceil(NUM_SHARDS).max(1),
            base_ttl,
            min_ttl,
            max_ttl,
            stamp: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            content: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a cache key from a URL and optional request parameters.
    ///
    /// Parameters are appended sorted by key, so equivalent requests map to
    /// the same entry regardless of argument order.
    #[must_use]
    pub fn cache_key(url: &str, params: Option<&BTreeMap<String, String>>) -> String {
        match params {
            Some(params) if !params.is_empty() => {
                let suffix: Vec<String> = params
                    .iter()
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect();
                format!("{url}::{}", suffix.join("&"))
            }
            _ => url.to_string(),
        }
    }

    /// Computes the TTL an entry for `host` gets under `policy`.
    #[must_use]
    pub fn compute_ttl(&self, host: &str, policy: &CachePolicy) -> TtlDecision {
        let category = DomainCategory::classify(host);

        // Realtime callers never read the cache, so anything stored for
        // them gets the shortest possible life.
        if policy.freshness == Freshness::Realtime {
            return TtlDecision {
                ttl: self.min_ttl,
                respected_headers: false,
                category,
            };
        }

        if let Some(control) = &policy.cache_control
            && !control.is_empty()
        {
            if control.forbids_caching() {
                return TtlDecision {
                    ttl: self.min_ttl,
                    respected_headers: true,
                    category,
                };
            }
            if let Some(secs) = control.effective_max_age() {
                let ttl = Duration::from_secs(secs).clamp(self.min_ttl, self.max_ttl);
                return TtlDecision {
                    ttl,
                    respected_headers: true,
                    category,
                };
            }
        }

        let mut ttl = self.base_ttl.mul_f64(category.multiplier());
        if policy.freshness == Freshness::Cached {
            ttl = ttl.saturating_mul(2);
        }

        TtlDecision {
            ttl: ttl.clamp(self.min_ttl, self.max_ttl),
            respected_headers: false,
            category,
        }
    }

    /// Stores a value under a key with a precomputed TTL decision.
    pub fn insert(&self, key: &str, value: V, decision: TtlDecision) {
        let stamp = self.stamp.fetch_add(1, Ordering::Relaxed);
        let mut shard = self.shard_for(key).lock().unwrap_or_else(|e| e.into_inner());

        shard.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + decision.ttl,
                stamp,
                decision,
            },
        );
        shard.order.push_back((stamp, key.to_string()));

        if shard.entries.len() > self.capacity_per_shard {
            shard.evict_lru();
        }
    }

    /// Returns the fresh value under `key`, touching its recency.
    ///
    /// Expired entries are invisible here regardless of cleanup timing.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let stamp = self.stamp.fetch_add(1, Ordering::Relaxed);
        let mut shard = self.shard_for(key).lock().unwrap_or_else(|e| e.into_inner());

        let entry = match shard.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => entry,
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        entry.stamp = stamp;
        let value = entry.value.clone();
        shard.order.push_back((stamp, key.to_string()));
        shard.compact_order(self.capacity_per_shard);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Returns the TTL decision recorded for a key, fresh or not.
    #[must_use]
    pub fn decision(&self, key: &str) -> Option<TtlDecision> {
        let shard = self.shard_for(key).lock().unwrap_or_else(|e| e.into_inner());
        shard.entries.get(key).map(|entry| entry.decision)
    }

    /// Removes every expired entry.
    pub fn cleanup(&self) {
        let now = Instant::now();
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(|e| e.into_inner());
            shard.entries.retain(|_, entry| entry.expires_at > now);
        }
    }

    /// Removes entries whose hostname equals `domain` or is a subdomain.
    pub fn clear_domain(&self, domain: &str) {
        let domain = domain.to_ascii_lowercase();
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(|e| e.into_inner());
            shard.entries.retain(|key, _| {
                let host = url::Url::parse(key.split("::").next().unwrap_or(key))
                    .ok()
                    .and_then(|url| url.host_str().map(str::to_ascii_lowercase));
                match host {
                    Some(host) => host != domain && !host.ends_with(&format!(".{domain}")),
                    None => true,
                }
            });
        }
    }

    /// Records a content hash for change tracking.
    pub fn set_content(&self, url: &str, html: &str) {
        let hash = content_hash(html);
        let mut content = self.content.lock().unwrap_or_else(|e| e.into_inner());
        content
            .entry(url.to_string())
            .and_modify(|track| track.hash = hash)
            .or_insert(ContentTrack {
                hash,
                checks: 0,
                changes: 0,
            });
    }

    /// Returns `true` when the URL's content is absent or differs from the
    /// recorded hash, updating the per-URL change rate either way.
    pub fn has_content_changed(&self, url: &str, new_html: &str) -> bool {
        let hash = content_hash(new_html);
        let mut content = self.content.lock().unwrap_or_else(|e| e.into_inner());

        match content.get_mut(url) {
            Some(track) => {
                track.checks += 1;
                let changed = track.hash != hash;
                if changed {
                    track.changes += 1;
                    track.hash = hash;
                }
                changed
            }
            None => true,
        }
    }

    /// Share of checks that saw changed content, the volatility signal.
    ///
    /// Exposed for observability; not currently fed back into TTLs.
    #[must_use]
    pub fn change_rate(&self, url: &str) -> Option<f64> {
        let content = self.content.lock().unwrap_or_else(|e| e.into_inner());
        content.get(url).map(|track| {
            if track.checks == 0 {
                0.0
            } else {
                track.changes as f64 / track.checks as f64
            }
        })
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self
            .shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .entries
                    .len()
            })
            .sum();
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn shard_for(&self, key: &str) -> &Mutex<Shard<V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) & (NUM_SHARDS - 1);
        &self.shards[index]
    }
}

impl<V> fmt::Debug for AdaptiveCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveCache")
            .field("shards", &NUM_SHARDS)
            .field("capacity_per_shard", &self.capacity_per_shard)
            .field("base_ttl", &self.base_ttl)
            .finish_non_exhaustive()
    }
}

fn content_hash(html: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    html.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> AdaptiveCache<String> {
        AdaptiveCache::new(
            64,
            Duration::from_secs(900),
            Duration::from_secs(30),
            Duration::from_secs(86_400),
        )
    }

    #[test]
    fn get_returns_fresh_value() {
        let cache = cache();
        let decision = cache.compute_ttl("example.com", &CachePolicy::default());
        cache.insert("https://example.com/a", "hello".to_string(), decision);

        assert_eq!(
            cache.get("https://example.com/a"),
            Some("hello".to_string())
        );
        assert_eq!(cache.get("https://example.com/b"), None);
    }

    #[test]
    fn expired_entries_are_invisible() {
        let cache = cache();
        let decision = TtlDecision {
            ttl: Duration::ZERO,
            respected_headers: false,
            category: DomainCategory::Default,
        };
        cache.insert("https://example.com/a", "stale".to_string(), decision);

        assert_eq!(cache.get("https://example.com/a"), None);
        // The entry still occupies a slot until cleanup.
        assert_eq!(cache.stats().entries, 1);
        cache.cleanup();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn realtime_clamps_to_min_ttl_regardless_of_domain() {
        let cache = cache();
        let decision = cache.compute_ttl(
            "whitehouse.gov",
            &CachePolicy {
                freshness: Freshness::Realtime,
                cache_control: None,
            },
        );
        assert_eq!(decision.ttl, Duration::from_secs(30));
        assert_eq!(decision.category, DomainCategory::StaticGov);
    }

    #[test]
    fn cache_control_overrides_domain_multiplier() {
        let cache = cache();
        let control: CacheControl = "max-age=300".parse().unwrap();
        let decision = cache.compute_ttl(
            "whitehouse.gov",
            &CachePolicy {
                freshness: Freshness::Any,
                cache_control: Some(control),
            },
        );

        // 300 s, not base 900 × 4.0.
        assert_eq!(decision.ttl, Duration::from_secs(300));
        assert!(decision.respected_headers);
    }

    #[test]
    fn no_store_clamps_to_min() {
        let cache = cache();
        let control: CacheControl = "no-store".parse().unwrap();
        let decision = cache.compute_ttl(
            "docs.rs",
            &CachePolicy {
                freshness: Freshness::Any,
                cache_control: Some(control),
            },
        );
        assert_eq!(decision.ttl, Duration::from_secs(30));
        assert!(decision.respected_headers);
    }

    #[test]
    fn category_multiplier_applies_without_headers() {
        let cache = cache();
        let decision = cache.compute_ttl("whitehouse.gov", &CachePolicy::default());
        assert_eq!(decision.ttl, Duration::from_secs(3600));
        assert!(!decision.respected_headers);

        let decision = cache.compute_ttl("twitter.com", &CachePolicy::default());
        // 900 × 0.25 = 225.
        assert_eq!(decision.ttl, Duration::from_secs(225));
    }

    #[test]
    fn cached_freshness_doubles_ttl() {
        let cache = cache();
        let decision = cache.compute_ttl(
            "example.com",
            &CachePolicy {
                freshness: Freshness::Cached,
                cache_control: None,
            },
        );
        assert_eq!(decision.ttl, Duration::from_secs(1800));
    }

    #[test]
    fn max_age_still_clamped() {
        let cache = cache();
        let control: CacheControl = "max-age=999999999".parse().unwrap();
        let decision = cache.compute_ttl(
            "example.com",
            &CachePolicy {
                freshness: Freshness::Any,
                cache_control: Some(control),
            },
        );
        assert_eq!(decision.ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn capacity_eviction_drops_lru() {
        let cache: AdaptiveCache<u32> = AdaptiveCache::new(
            NUM_SHARDS, // one entry per shard
            Duration::from_secs(900),
            Duration::from_secs(30),
            Duration::from_secs(86_400),
        );
        let decision = TtlDecision {
            ttl: Duration::from_secs(900),
            respected_headers: false,
            category: DomainCategory::Default,
        };

        // Fill well past capacity; every shard holds at most one entry.
        for index in 0..200u32 {
            cache.insert(&format!("https://example.com/{index}"), index, decision);
        }
        assert!(cache.stats().entries <= NUM_SHARDS);
    }

    #[test]
    fn recent_reads_survive_eviction() {
        let cache: AdaptiveCache<u32> = AdaptiveCache::new(
            32,
            Duration::from_secs(900),
            Duration::from_secs(30),
            Duration::from_secs(86_400),
        );
        let decision = TtlDecision {
            ttl: Duration::from_secs(900),
            respected_headers: false,
            category: DomainCategory::Default,
        };

        cache.insert("https://example.com/keep", 1, decision);
        for index in 0..500u32 {
            cache.insert(&format!("https://example.com/filler{index}"), index, decision);
            // Touch the protected key so it never becomes LRU.
            let _ = cache.get("https://example.com/keep");
        }
        assert_eq!(cache.get("https://example.com/keep"), Some(1));
    }

    #[test]
    fn clear_domain_matches_subdomains() {
        let cache = cache();
        let decision = cache.compute_ttl("example.com", &CachePolicy::default());
        cache.insert("https://example.com/a", "a".to_string(), decision);
        cache.insert("https://sub.example.com/b", "b".to_string(), decision);
        cache.insert("https://other.com/c", "c".to_string(), decision);

        cache.clear_domain("example.com");
        assert_eq!(cache.get("https://example.com/a"), None);
        assert_eq!(cache.get("https://sub.example.com/b"), None);
        assert_eq!(cache.get("https://other.com/c"), Some("c".to_string()));
    }

    #[test]
    fn content_change_tracking() {
        let cache = cache();
        assert!(cache.has_content_changed("https://example.com/", "<html>v1</html>"));

        cache.set_content("https://example.com/", "<html>v1</html>");
        assert!(!cache.has_content_changed("https://example.com/", "<html>v1</html>"));
        assert!(cache.has_content_changed("https://example.com/", "<html>v2</html>"));

        // One unchanged check, one changed check.
        let rate = cache.change_rate("https://example.com/").unwrap();
        assert!((rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn cache_key_sorts_params() {
        let mut params = BTreeMap::new();
        params.insert("b".to_string(), "2".to_string());
        params.insert("a".to_string(), "1".to_string());

        let key = AdaptiveCache::<String>::cache_key("https://example.com/", Some(&params));
        assert_eq!(key, "https://example.com/::a=1&b=2");
        assert_eq!(
            AdaptiveCache::<String>::cache_key("https://example.com/", None),
            "https://example.com/"
        );
    }
}
