//! Extraction observations.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use jiff::Timestamp;

/// One successful extraction's worth of evidence.
///
/// Observations accumulate per domain in the handler registry until enough
/// exist to synthesize a handler.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteObservation {
    /// Page URL the observation came from.
    pub url: String,
    /// Domain the observation belongs to.
    pub domain: String,
    /// Extraction strategy tag that worked (`html-scrape`, `embedded-state`,
    /// `api-bypass`, `browser`).
    pub strategy: String,
    /// CSS selectors that yielded content, in application order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<String>,
    /// Dotted JSON paths that yielded content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_paths: Vec<String>,
    /// API calls the page made.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_calls: Vec<String>,
    /// How long the extraction took.
    pub duration: Duration,
    /// When the observation was recorded.
    pub observed_at: Timestamp,
}

impl SiteObservation {
    /// Content-derived identity of the observation.
    ///
    /// Replayed traces produce equal keys, so recording the same evidence
    /// twice replaces the ring entry instead of double-counting it.
    #[must_use]
    pub fn dedup_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.url.hash(&mut hasher);
        self.strategy.hash(&mut hasher);

        let mut selectors = self.selectors.clone();
        selectors.sort();
        selectors.hash(&mut hasher);

        let mut json_paths = self.json_paths.clone();
        json_paths.sort();
        json_paths.hash(&mut hasher);

        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(url: &str, selectors: &[&str]) -> SiteObservation {
        SiteObservation {
            url: url.to_string(),
            domain: "example.com".to_string(),
            strategy: "html-scrape".to_string(),
            selectors: selectors.iter().map(ToString::to_string).collect(),
            json_paths: Vec::new(),
            api_calls: Vec::new(),
            duration: Duration::from_millis(250),
            observed_at: Timestamp::now(),
        }
    }

    #[test]
    fn dedup_key_ignores_selector_order() {
        let a = observation("https://example.com/x", &["article h1", ".body"]);
        let b = observation("https://example.com/x", &[".body", "article h1"]);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn dedup_key_differs_per_url() {
        let a = observation("https://example.com/x", &["article"]);
        let b = observation("https://example.com/y", &["article"]);
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
