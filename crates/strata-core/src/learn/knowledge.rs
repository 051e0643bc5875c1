//! Learned API endpoint patterns.
//!
//! The knowledge base remembers, per domain, which API endpoints can serve
//! a page's content directly. High-confidence patterns let the intelligence
//! tier skip rendering entirely.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use jiff::Timestamp;

use crate::learn::path::PathSegment;

/// AIMD parameters for the per-pattern success rate.
const RATE_INCREASE: f64 = 0.05;
const RATE_DECREASE: f64 = 0.8;

/// Rate under which a high-confidence pattern drops to medium.
const DEMOTION_RATE: f64 = 0.6;

/// How much the engine trusts a pattern.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Seen once or twice; not used for bypass.
    Low,
    /// Worked repeatedly on one domain.
    Medium,
    /// Worked across calls; eligible for bypass.
    High,
}

/// Where a piece of content lives in an API response.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMapping {
    /// Path to the title.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub title_path: Vec<PathSegment>,
    /// Path to the body text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body_path: Vec<PathSegment>,
}

/// Minimal checks a bypass response must pass.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    /// Fields that must exist at the document root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_fields: Vec<String>,
    /// Minimum body length.
    #[serde(default)]
    pub min_length: usize,
}

/// One learned API endpoint.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedApiPattern {
    /// Template family (`rest-resource`, `query-api`, `graphql`).
    pub template_type: String,
    /// URL path templates this pattern matches, with `{id}`-style
    /// placeholders for variable segments.
    pub url_patterns: Vec<String>,
    /// Endpoint template to call.
    pub endpoint: String,
    /// HTTP method.
    pub method: String,
    /// Headers the endpoint requires.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub required_headers: BTreeMap<String, String>,
    /// Response format tag (`json`, `graphql`).
    pub response_format: String,
    /// Where the content lives in the response.
    #[serde(default)]
    pub content_mapping: ContentMapping,
    /// Checks a response must pass.
    #[serde(default)]
    pub validation: ValidationRule,
    /// Trust level.
    pub confidence: Confidence,
    /// Whether a direct API call is permitted.
    #[serde(default)]
    pub can_bypass: bool,
    /// Successes recorded against the pattern.
    #[serde(default)]
    pub success_count: u64,
    /// Failures recorded against the pattern.
    #[serde(default)]
    pub failure_count: u64,
    /// Windowless success rate driven by AIMD updates.
    #[serde(default = "default_rate")]
    pub success_rate: f64,
    /// Distinct domains the pattern was seen on.
    #[serde(default)]
    pub domains_seen: u32,
    /// First learned.
    pub created_at: Timestamp,
    /// Last update.
    pub updated_at: Timestamp,
}

fn default_rate() -> f64 {
    1.0
}

impl LearnedApiPattern {
    /// Returns `true` if the pattern may satisfy a fetch directly.
    #[must_use]
    pub fn is_bypassable(&self) -> bool {
        self.can_bypass && self.confidence == Confidence::High
    }

    /// Returns `true` if `path` matches any of the pattern's URL templates.
    ///
    /// Template segments of the form `{…}` match any single path segment.
    #[must_use]
    pub fn matches_path(&self, path: &str) -> bool {
        self.url_patterns
            .iter()
            .any(|pattern| template_matches(pattern, path))
    }
}

fn template_matches(template: &str, path: &str) -> bool {
    let template_segments: Vec<&str> = template.trim_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    template_segments.len() == path_segments.len()
        && template_segments
            .iter()
            .zip(&path_segments)
            .all(|(template_segment, path_segment)| {
                (template_segment.starts_with('{') && template_segment.ends_with('}'))
                    || template_segment == path_segment
            })
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomainKnowledge {
    patterns: Vec<LearnedApiPattern>,
    usage_count: u64,
    success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_used: Option<Timestamp>,
}

/// Persisted form of the knowledge base.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct KnowledgeSnapshot {
    version: u32,
    domains: BTreeMap<String, DomainKnowledge>,
}

/// Domain → learned API patterns.
pub struct KnowledgeBase {
    inner: Mutex<BTreeMap<String, DomainKnowledge>>,
}

impl KnowledgeBase {
    /// Current snapshot format version.
    pub const VERSION: u32 = 1;

    /// Creates an empty knowledge base.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    /// Merges freshly observed patterns into the domain's entry.
    ///
    /// Patterns are keyed by `(endpoint, method)`; on conflict the pattern
    /// with the higher confidence wins.
    pub fn learn(&self, domain: &str, patterns: Vec<LearnedApiPattern>) {
        if patterns.is_empty() {
            return;
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = inner.entry(domain.to_string()).or_default();

        for pattern in patterns {
            let existing = entry.patterns.iter_mut().find(|candidate| {
                candidate.endpoint == pattern.endpoint && candidate.method == pattern.method
            });

            match existing {
                Some(existing) if pattern.confidence > existing.confidence => *existing = pattern,
                Some(_) => {}
                None => entry.patterns.push(pattern),
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: crate::TRACING_TARGET_LEARN,
            domain,
            patterns = entry.patterns.len(),
            "knowledge base updated",
        );
    }

    /// Patterns eligible to satisfy fetches for `domain` directly.
    #[must_use]
    pub fn get_bypassable_patterns(&self, domain: &str) -> Vec<LearnedApiPattern> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .get(domain)
            .map(|entry| {
                entry
                    .patterns
                    .iter()
                    .filter(|pattern| pattern.is_bypassable())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Finds the pattern matching a URL: exact path match first, then the
    /// longest matching prefix of the path.
    #[must_use]
    pub fn find_pattern(&self, url: &url::Url) -> Option<LearnedApiPattern> {
        let domain = url.host_str()?.to_ascii_lowercase();
        let path = url.path();

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = inner.get_mut(&domain)?;

        let found = entry
            .patterns
            .iter()
            .find(|pattern| pattern.matches_path(path))
            .cloned()
            .or_else(|| {
                // Longest-prefix fallback: peel path segments from the right.
                let mut prefix = path.trim_end_matches('/');
                while let Some(cut) = prefix.rfind('/') {
                    prefix = &prefix[..cut];
                    if prefix.is_empty() {
                        break;
                    }
                    if let Some(pattern) = entry
                        .patterns
                        .iter()
                        .find(|pattern| pattern.matches_path(prefix))
                    {
                        return Some(pattern.clone());
                    }
                }
                None
            });

        if found.is_some() {
            entry.usage_count += 1;
            entry.last_used = Some(Timestamp::now());
        }
        found
    }

    /// AIMD success-rate update for one pattern.
    ///
    /// High-confidence patterns drop to medium when the rate falls below
    /// the demotion threshold, which also revokes bypass eligibility.
    pub fn update_success_rate(&self, domain: &str, endpoint: &str, success: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = inner.get_mut(domain) else {
            return;
        };
        let Some(pattern) = entry
            .patterns
            .iter_mut()
            .find(|pattern| pattern.endpoint == endpoint)
        else {
            return;
        };

        if success {
            pattern.success_count += 1;
            pattern.success_rate = (pattern.success_rate + RATE_INCREASE).min(1.0);
            if pattern.confidence == Confidence::Medium
                && pattern.success_count >= 5
                && pattern.success_rate >= 0.9
            {
                pattern.confidence = Confidence::High;
            }
        } else {
            pattern.failure_count += 1;
            pattern.success_rate *= RATE_DECREASE;
            if pattern.confidence == Confidence::High && pattern.success_rate < DEMOTION_RATE {
                pattern.confidence = Confidence::Medium;
            }
        }
        pattern.updated_at = Timestamp::now();

        let total: u64 = entry
            .patterns
            .iter()
            .map(|pattern| pattern.success_count + pattern.failure_count)
            .sum();
        let successes: u64 = entry
            .patterns
            .iter()
            .map(|pattern| pattern.success_count)
            .sum();
        entry.success_rate = if total == 0 {
            0.0
        } else {
            successes as f64 / total as f64
        };
    }

    /// Serializes the store to its versioned JSON form.
    pub fn to_snapshot_json(&self) -> serde_json::Result<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = KnowledgeSnapshot {
            version: Self::VERSION,
            domains: inner
                .iter()
                .map(|(domain, knowledge)| {
                    (
                        domain.clone(),
                        DomainKnowledge {
                            patterns: knowledge.patterns.clone(),
                            usage_count: knowledge.usage_count,
                            success_rate: knowledge.success_rate,
                            last_used: knowledge.last_used,
                        },
                    )
                })
                .collect(),
        };
        serde_json::to_string_pretty(&snapshot)
    }

    /// Restores a store from its versioned JSON form.
    pub fn from_snapshot_json(json: &str) -> serde_json::Result<Self> {
        let snapshot: KnowledgeSnapshot = serde_json::from_str(json)?;
        Ok(Self {
            inner: Mutex::new(snapshot.domains),
        })
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("KnowledgeBase")
            .field("domains", &inner.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(endpoint: &str, confidence: Confidence) -> LearnedApiPattern {
        LearnedApiPattern {
            template_type: "rest-resource".into(),
            url_patterns: vec!["/products/{id}".into()],
            endpoint: endpoint.into(),
            method: "GET".into(),
            required_headers: BTreeMap::new(),
            response_format: "json".into(),
            content_mapping: ContentMapping {
                title_path: PathSegment::parse_path("title"),
                body_path: PathSegment::parse_path("description"),
            },
            validation: ValidationRule {
                required_fields: vec!["title".into()],
                min_length: 50,
            },
            confidence,
            can_bypass: true,
            success_count: 0,
            failure_count: 0,
            success_rate: 1.0,
            domains_seen: 1,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        }
    }

    #[test]
    fn learn_keeps_higher_confidence() {
        let kb = KnowledgeBase::new();
        kb.learn("shop.com", vec![pattern("/api/products/{id}", Confidence::High)]);
        kb.learn("shop.com", vec![pattern("/api/products/{id}", Confidence::Low)]);

        let bypassable = kb.get_bypassable_patterns("shop.com");
        assert_eq!(bypassable.len(), 1);
        assert_eq!(bypassable[0].confidence, Confidence::High);
    }

    #[test]
    fn only_high_confidence_is_bypassable() {
        let kb = KnowledgeBase::new();
        kb.learn("shop.com", vec![pattern("/api/products/{id}", Confidence::Medium)]);
        assert!(kb.get_bypassable_patterns("shop.com").is_empty());
    }

    #[test]
    fn find_pattern_exact_then_prefix() {
        let kb = KnowledgeBase::new();
        let mut listing = pattern("/api/products", Confidence::High);
        listing.url_patterns = vec!["/products".into()];
        kb.learn("shop.com", vec![listing]);

        let url = url::Url::parse("https://shop.com/products").unwrap();
        assert!(kb.find_pattern(&url).is_some());

        // Deeper path falls back to the /products prefix.
        let url = url::Url::parse("https://shop.com/products/42/reviews").unwrap();
        assert!(kb.find_pattern(&url).is_some());

        let url = url::Url::parse("https://shop.com/checkout").unwrap();
        assert!(kb.find_pattern(&url).is_none());
    }

    #[test]
    fn aimd_demotes_below_threshold() {
        let kb = KnowledgeBase::new();
        kb.learn("shop.com", vec![pattern("/api/products/{id}", Confidence::High)]);

        // Two failures: 1.0 × 0.8 × 0.8 = 0.64, still High.
        kb.update_success_rate("shop.com", "/api/products/{id}", false);
        kb.update_success_rate("shop.com", "/api/products/{id}", false);
        assert_eq!(kb.get_bypassable_patterns("shop.com").len(), 1);

        // Third failure: 0.512 < 0.6 → Medium, bypass revoked.
        kb.update_success_rate("shop.com", "/api/products/{id}", false);
        assert!(kb.get_bypassable_patterns("shop.com").is_empty());
    }

    #[test]
    fn snapshot_round_trip() {
        let kb = KnowledgeBase::new();
        kb.learn("shop.com", vec![pattern("/api/products/{id}", Confidence::High)]);

        let json = kb.to_snapshot_json().unwrap();
        assert!(json.contains("\"version\": 1"));

        let restored = KnowledgeBase::from_snapshot_json(&json).unwrap();
        assert_eq!(restored.get_bypassable_patterns("shop.com").len(), 1);
    }

    #[test]
    fn template_matching() {
        let pattern = pattern("/api/products/{id}", Confidence::High);
        assert!(pattern.matches_path("/products/42"));
        assert!(!pattern.matches_path("/products/42/reviews"));
        assert!(!pattern.matches_path("/orders/42"));
    }
}
