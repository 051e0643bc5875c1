//! Built-in knowledge for well-known hosts.
//!
//! Preset pagination patterns skip the observation phase entirely: they
//! are injected at engine construction already validated. The
//! browser-required list seeds start-tier choice for domains that never
//! serve useful markup to a plain client.

use jiff::Timestamp;
use strata_core::learn::pagination::{
    PageValue, PaginationApiPattern, PaginationParam, ParamKind, ParamLocation, PatternMetrics,
    ResponseStructure,
};
use strata_core::learn::path::PathSegment;

/// Domains that are pointless to fetch below the browser tier.
pub const BROWSER_REQUIRED: &[&str] = &[
    "twitter.com",
    "x.com",
    "instagram.com",
    "facebook.com",
    "linkedin.com",
    "tiktok.com",
];

/// Pagination patterns for hosts whose APIs are stable public knowledge.
#[must_use]
pub fn pagination_presets() -> Vec<PaginationApiPattern> {
    let now = Timestamp::now();

    vec![
        PaginationApiPattern {
            id: "preset:hn.algolia.com/api/v1/search#page".to_string(),
            domain: "hn.algolia.com".to_string(),
            base_url: "https://hn.algolia.com/api/v1/search".to_string(),
            param: PaginationParam {
                name: "page".to_string(),
                kind: ParamKind::Page,
                start: PageValue::Number(0),
                increment: 1,
                location: ParamLocation::Query,
                next_value_path: Vec::new(),
            },
            response: ResponseStructure {
                data_path: PathSegment::parse_path("hits"),
                total_count_path: PathSegment::parse_path("nbHits"),
                has_more_path: Vec::new(),
                next_cursor_path: Vec::new(),
                items_per_page: Some(20),
            },
            metrics: PatternMetrics::default(),
            validated: false, // add_preset validates
            preset: false,
            created_at: now,
        },
        PaginationApiPattern {
            id: "preset:www.reddit.com/.json#after".to_string(),
            domain: "www.reddit.com".to_string(),
            base_url: "https://www.reddit.com/.json".to_string(),
            param: PaginationParam {
                name: "after".to_string(),
                kind: ParamKind::Cursor,
                start: PageValue::Token(String::new()),
                increment: 0,
                location: ParamLocation::Query,
                next_value_path: PathSegment::parse_path("data.after"),
            },
            response: ResponseStructure {
                data_path: PathSegment::parse_path("data.children"),
                total_count_path: Vec::new(),
                has_more_path: Vec::new(),
                next_cursor_path: PathSegment::parse_path("data.after"),
                items_per_page: Some(25),
            },
            metrics: PatternMetrics::default(),
            validated: false,
            preset: false,
            created_at: now,
        },
        PaginationApiPattern {
            id: "preset:api.github.com#page".to_string(),
            domain: "api.github.com".to_string(),
            base_url: "https://api.github.com/search/repositories".to_string(),
            param: PaginationParam {
                name: "page".to_string(),
                kind: ParamKind::Page,
                start: PageValue::Number(1),
                increment: 1,
                location: ParamLocation::Query,
                next_value_path: Vec::new(),
            },
            response: ResponseStructure {
                data_path: PathSegment::parse_path("items"),
                total_count_path: PathSegment::parse_path("total_count"),
                has_more_path: Vec::new(),
                next_cursor_path: Vec::new(),
                items_per_page: Some(30),
            },
            metrics: PatternMetrics::default(),
            validated: false,
            preset: false,
            created_at: now,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_generate_page_urls() {
        let presets = pagination_presets();
        let algolia = presets
            .iter()
            .find(|pattern| pattern.domain == "hn.algolia.com")
            .unwrap();

        assert_eq!(
            algolia.generate_page_url(&PageValue::Number(3)),
            "https://hn.algolia.com/api/v1/search?page=3"
        );
        assert_eq!(
            algolia.next_page_value(&PageValue::Number(3)),
            Some(PageValue::Number(4))
        );
    }

    #[test]
    fn reddit_preset_is_cursor_driven() {
        let presets = pagination_presets();
        let reddit = presets
            .iter()
            .find(|pattern| pattern.domain == "www.reddit.com")
            .unwrap();

        assert!(reddit.next_page_value(&reddit.param.start).is_none());
        let response = serde_json::json!({
            "data": { "children": [], "after": "t3_abc" }
        });
        assert_eq!(
            reddit.next_cursor_from(&response),
            Some(PageValue::Token("t3_abc".to_string()))
        );
    }
}
