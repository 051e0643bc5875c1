//! Paginated-API discovery.
//!
//! Given the captured traffic of a browsing session that paginated, the
//! detector scores every JSON exchange on three signals: a pagination-like
//! request parameter, a data array in the response, and pagination metadata
//! next to it. The best scorer becomes a [`PaginationApiPattern`] that can
//! replay the feed directly, page by page, at the cheapest tier.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use jiff::Timestamp;
use serde_json::Value;

use crate::learn::path::PathSegment;
use crate::result::NetworkCapture;

/// Successful uses after which a discovered pattern is validated.
const VALIDATION_USES: u32 = 3;

/// Minimum detection score for a pattern to be emitted.
const DETECTION_FLOOR: f64 = 0.6;

/// Score weights for the three detection signals.
const PARAM_WEIGHT: f64 = 0.4;
const DATA_WEIGHT: f64 = 0.4;
const META_WEIGHT: f64 = 0.2;

/// Query parameter names that page by number.
const PAGE_PARAMS: &[&str] = &["page", "p", "page_number", "pagenumber", "pg"];

/// Query parameter names that page by offset.
const OFFSET_PARAMS: &[&str] = &["offset", "start", "skip", "from"];

/// Query parameter names that page by cursor.
const CURSOR_PARAMS: &[&str] = &["cursor", "after", "next"];

/// Query parameter names that page by opaque token.
const TOKEN_PARAMS: &[&str] = &["token", "page_token", "pagetoken", "continuation"];

/// Response fields that hold the data array.
const DATA_FIELDS: &[&str] = &[
    "data", "items", "results", "products", "posts", "entries", "hits", "edges",
];

/// Response fields that signal more pages exist.
const HAS_MORE_FIELDS: &[&str] = &["has_more", "hasMore", "more", "hasNextPage"];

/// Response fields that carry the next cursor.
const NEXT_CURSOR_FIELDS: &[&str] = &["next_cursor", "nextCursor", "next", "continuation"];

/// Response fields that carry the total count.
const TOTAL_FIELDS: &[&str] = &["total", "totalCount", "total_count", "count"];

/// How the pagination parameter advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// 1-based page number.
    Page,
    /// Item offset.
    Offset,
    /// Cursor returned by the previous response.
    Cursor,
    /// Opaque continuation token.
    Token,
}

/// Where the pagination parameter travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    /// Query string parameter.
    Query,
    /// Path segment, `{page}` placeholder in the base URL.
    Path,
    /// JSON body field.
    Body,
}

/// A concrete value of the pagination parameter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum PageValue {
    /// Numeric page or offset.
    Number(i64),
    /// Cursor or token.
    Token(String),
}

impl fmt::Display for PageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Token(token) => f.write_str(token),
        }
    }
}

/// Descriptor of the pagination parameter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParam {
    /// Parameter name.
    pub name: String,
    /// How the parameter advances.
    pub kind: ParamKind,
    /// First value of the sequence.
    pub start: PageValue,
    /// Step between numeric values; `1` for pages, items-per-page for
    /// offsets, unused for cursors.
    pub increment: i64,
    /// Where the parameter travels.
    pub location: ParamLocation,
    /// Path to the next value inside a response, for cursor flows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_value_path: Vec<PathSegment>,
}

/// Descriptor of where pagination data lives in responses.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStructure {
    /// Path to the data array.
    pub data_path: Vec<PathSegment>,
    /// Path to the total count, when present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub total_count_path: Vec<PathSegment>,
    /// Path to the has-more flag, when present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub has_more_path: Vec<PathSegment>,
    /// Path to the next cursor, when present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_cursor_path: Vec<PathSegment>,
    /// Items per page observed at discovery time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_per_page: Option<usize>,
}

/// Usage metrics of one pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMetrics {
    /// Successful replays.
    pub success_count: u32,
    /// Failed replays.
    pub failure_count: u32,
    /// Items fetched through the pattern.
    pub items_fetched: u64,
    /// Cumulative rendering time the pattern avoided.
    pub time_saved: Duration,
    /// Mean replay response time.
    pub avg_response_time: Duration,
}

/// A discovered (or preset) paginated-API pattern.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationApiPattern {
    /// Stable pattern id.
    pub id: String,
    /// Domain the pattern belongs to.
    pub domain: String,
    /// Endpoint URL without the pagination parameter.
    pub base_url: String,
    /// Pagination parameter descriptor.
    pub param: PaginationParam,
    /// Response structure descriptor.
    pub response: ResponseStructure,
    /// Usage metrics.
    #[serde(default)]
    pub metrics: PatternMetrics,
    /// `true` once the pattern replayed successfully three times, or was
    /// injected as a preset. Only validated patterns shortcut fetches.
    pub validated: bool,
    /// `true` for start-up injected patterns.
    #[serde(default)]
    pub preset: bool,
    /// Discovery time.
    pub created_at: Timestamp,
}

impl PaginationApiPattern {
    /// Builds the URL for one page value. Deterministic.
    pub fn generate_page_url(&self, value: &PageValue) -> String {
        match self.param.location {
            ParamLocation::Query => {
                let Ok(url) = url::Url::parse(&self.base_url) else {
                    return self.base_url.clone();
                };
                let mut out = url.clone();
                {
                    let mut pairs = out.query_pairs_mut();
                    pairs.clear();
                    for (key, existing) in url.query_pairs() {
                        if key != self.param.name.as_str() {
                            pairs.append_pair(&key, &existing);
                        }
                    }
                    pairs.append_pair(&self.param.name, &value.to_string());
                }
                out.to_string()
            }
            ParamLocation::Path => self.base_url.replace("{page}", &value.to_string()),
            ParamLocation::Body => self.base_url.clone(),
        }
    }

    /// Builds the JSON body for one page value, for body-located params.
    #[must_use]
    pub fn generate_page_body(&self, value: &PageValue) -> Option<Value> {
        if self.param.location != ParamLocation::Body {
            return None;
        }
        let value = match value {
            PageValue::Number(number) => Value::from(*number),
            PageValue::Token(token) => Value::from(token.clone()),
        };
        let mut body = serde_json::Map::new();
        body.insert(self.param.name.clone(), value);
        Some(Value::Object(body))
    }

    /// Advances a numeric page value. Cursor and token flows advance from
    /// responses via [`next_cursor_from`] instead.
    ///
    /// [`next_cursor_from`]: Self::next_cursor_from
    #[must_use]
    pub fn next_page_value(&self, current: &PageValue) -> Option<PageValue> {
        match (self.param.kind, current) {
            (ParamKind::Page | ParamKind::Offset, PageValue::Number(number)) => {
                Some(PageValue::Number(number + self.param.increment))
            }
            _ => None,
        }
    }

    /// Pulls the next cursor out of a response.
    #[must_use]
    pub fn next_cursor_from(&self, response: &Value) -> Option<PageValue> {
        let path = if self.param.next_value_path.is_empty() {
            &self.response.next_cursor_path
        } else {
            &self.param.next_value_path
        };
        let value = PathSegment::resolve(path, response)?;
        match value {
            Value::String(token) => Some(PageValue::Token(token.clone())),
            Value::Number(number) => number.as_i64().map(PageValue::Number),
            _ => None,
        }
    }

    /// Items of one replayed response.
    #[must_use]
    pub fn items_of<'a>(&self, response: &'a Value) -> Option<&'a Vec<Value>> {
        PathSegment::resolve(&self.response.data_path, response)?.as_array()
    }

    /// Has-more flag of one replayed response, when the structure has one.
    #[must_use]
    pub fn has_more(&self, response: &Value) -> Option<bool> {
        if self.response.has_more_path.is_empty() {
            return None;
        }
        PathSegment::resolve(&self.response.has_more_path, response)?.as_bool()
    }
}

/// Returns `true` if a URL carries a pagination-like query parameter,
/// meaning a fetch of it participates in a paginated flow.
#[must_use]
pub fn looks_paginated(url: &url::Url) -> bool {
    find_pagination_param(url).is_some()
}

/// Input to one discovery run: the pages visited and what they requested.
#[derive(Debug, Clone, Default)]
pub struct PaginationContext {
    /// Page URLs in visit order.
    pub page_urls: Vec<String>,
    /// Network exchanges captured across the session.
    pub captures: Vec<NetworkCapture>,
}

/// Outcome of one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    /// `true` when a pattern was detected.
    pub detected: bool,
    /// The detected pattern.
    pub pattern: Option<PaginationApiPattern>,
    /// Detection score of the winner, 0 to 1.
    pub confidence: f64,
    /// Why the winner scored what it did.
    pub reasons: Vec<String>,
}

/// Persisted form of the store.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginationSnapshot {
    version: u32,
    patterns: BTreeMap<String, PaginationApiPattern>,
}

/// Store of discovered and preset pagination patterns.
pub struct PaginationDiscovery {
    patterns: Mutex<BTreeMap<String, PaginationApiPattern>>,
}

impl PaginationDiscovery {
    /// Current snapshot format version.
    pub const VERSION: u32 = 1;

    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            patterns: Mutex::new(BTreeMap::new()),
        }
    }

    /// Runs detection over a session and stores the winning pattern.
    pub fn analyze(&self, context: &PaginationContext) -> DiscoveryOutcome {
        let mut best: Option<(f64, Vec<String>, PaginationApiPattern)> = None;

        for capture in context.captures.iter().filter(|capture| capture.is_json()) {
            let Some(candidate) = score_capture(capture, &context.captures) else {
                continue;
            };

            let replace = match &best {
                Some((score, _, _)) => candidate.0 > *score,
                None => true,
            };
            if replace {
                best = Some(candidate);
            }
        }

        match best {
            Some((score, reasons, pattern)) if score >= DETECTION_FLOOR => {
                let mut patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
                patterns
                    .entry(pattern.id.clone())
                    .or_insert_with(|| pattern.clone());

                #[cfg(feature = "tracing")]
                tracing::info!(
                    target: crate::TRACING_TARGET_LEARN,
                    pattern = %pattern.id,
                    score,
                    "pagination pattern detected",
                );

                DiscoveryOutcome {
                    detected: true,
                    pattern: Some(pattern),
                    confidence: score,
                    reasons,
                }
            }
            Some((score, reasons, _)) => DiscoveryOutcome {
                detected: false,
                pattern: None,
                confidence: score,
                reasons,
            },
            None => DiscoveryOutcome {
                detected: false,
                pattern: None,
                confidence: 0.0,
                reasons: vec!["no JSON captures to score".to_string()],
            },
        }
    }

    /// Injects a preset pattern. Presets are born validated.
    pub fn add_preset(&self, mut pattern: PaginationApiPattern) {
        pattern.preset = true;
        pattern.validated = true;
        let mut patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        patterns.insert(pattern.id.clone(), pattern);
    }

    /// Finds a validated pattern whose base URL covers `url`.
    #[must_use]
    pub fn find_matching_pattern(&self, url: &url::Url) -> Option<PaginationApiPattern> {
        let domain = url.host_str()?.to_ascii_lowercase();
        let patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        patterns
            .values()
            .filter(|pattern| pattern.validated && pattern.domain == domain)
            .find(|pattern| {
                url::Url::parse(&pattern.base_url)
                    .is_ok_and(|base| url.path().starts_with(base.path()))
            })
            .cloned()
    }

    /// Records one replay of a pattern. The third success validates it.
    pub fn record_usage(
        &self,
        pattern_id: &str,
        success: bool,
        response_time: Duration,
        items: usize,
        time_saved: Duration,
    ) {
        let mut patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        let Some(pattern) = patterns.get_mut(pattern_id) else {
            return;
        };

        if success {
            pattern.metrics.success_count += 1;
            pattern.metrics.items_fetched += items as u64;
            pattern.metrics.time_saved += time_saved;
        } else {
            pattern.metrics.failure_count += 1;
        }

        let uses = pattern.metrics.success_count + pattern.metrics.failure_count;
        let previous_total = pattern
            .metrics
            .avg_response_time
            .saturating_mul(uses.saturating_sub(1));
        pattern.metrics.avg_response_time = (previous_total + response_time) / uses.max(1);

        if pattern.metrics.success_count >= VALIDATION_USES {
            pattern.validated = true;
        }
    }

    /// Returns the pattern with the given id.
    #[must_use]
    pub fn get(&self, pattern_id: &str) -> Option<PaginationApiPattern> {
        let patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        patterns.get(pattern_id).cloned()
    }

    /// Serializes the store to its versioned JSON form.
    pub fn to_snapshot_json(&self) -> serde_json::Result<String> {
        let patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = PaginationSnapshot {
            version: Self::VERSION,
            patterns: patterns.clone(),
        };
        serde_json::to_string_pretty(&snapshot)
    }

    /// Restores a store from its versioned JSON form.
    pub fn from_snapshot_json(json: &str) -> serde_json::Result<Self> {
        let snapshot: PaginationSnapshot = serde_json::from_str(json)?;
        Ok(Self {
            patterns: Mutex::new(snapshot.patterns),
        })
    }
}

impl Default for PaginationDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PaginationDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("PaginationDiscovery")
            .field("patterns", &patterns.len())
            .finish_non_exhaustive()
    }
}

/// Scores one capture; returns `(score, reasons, pattern)` when the capture
/// could plausibly be the pagination API.
fn score_capture(
    capture: &NetworkCapture,
    all: &[NetworkCapture],
) -> Option<(f64, Vec<String>, PaginationApiPattern)> {
    let url = url::Url::parse(&capture.url).ok()?;
    let json = capture.json.as_ref()?;
    let mut score = 0.0;
    let mut reasons = Vec::new();

    // (a) pagination-like request parameter.
    let param = find_pagination_param(&url);
    if let Some((name, kind, _)) = &param {
        score += PARAM_WEIGHT;
        reasons.push(format!("request parameter {name:?} looks like a {kind:?}"));
    }

    // (b) data array in the response.
    let data_path = find_data_array(json);
    if let Some((path, len)) = &data_path {
        score += DATA_WEIGHT;
        reasons.push(format!(
            "response has an array of {len} items at {:?}",
            PathSegment::format_path(path),
        ));
    }

    // (c) pagination metadata next to the array.
    let has_more_path = find_field(json, HAS_MORE_FIELDS);
    let next_cursor_path = find_field(json, NEXT_CURSOR_FIELDS);
    let total_path = find_field(json, TOTAL_FIELDS);
    if has_more_path.is_some() || next_cursor_path.is_some() || total_path.is_some() {
        score += META_WEIGHT;
        reasons.push("response carries pagination metadata".to_string());
    }

    let (name, kind, _) = param?;
    let (data_path, items_len) = data_path?;

    // Increment: numeric values observed for this parameter across the
    // session, else 1 per page / items-per-page per offset.
    let increment = infer_increment(&name, all).unwrap_or(match kind {
        ParamKind::Offset => items_len.max(1) as i64,
        _ => 1,
    });

    let start = match kind {
        ParamKind::Page => PageValue::Number(1),
        ParamKind::Offset => PageValue::Number(0),
        ParamKind::Cursor | ParamKind::Token => PageValue::Token(String::new()),
    };

    let mut base = url.clone();
    {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != name.as_str())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        base.set_query(None);
        if !pairs.is_empty() {
            let mut serializer = base.query_pairs_mut();
            for (key, value) in &pairs {
                serializer.append_pair(key, value);
            }
        }
    }

    let domain = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let pattern = PaginationApiPattern {
        id: format!("{domain}{}#{name}", url.path()),
        domain,
        base_url: base.to_string(),
        param: PaginationParam {
            name,
            kind,
            start,
            increment,
            location: ParamLocation::Query,
            next_value_path: next_cursor_path.clone().unwrap_or_default(),
        },
        response: ResponseStructure {
            data_path,
            total_count_path: total_path.unwrap_or_default(),
            has_more_path: has_more_path.unwrap_or_default(),
            next_cursor_path: next_cursor_path.unwrap_or_default(),
            items_per_page: Some(items_len),
        },
        metrics: PatternMetrics::default(),
        validated: false,
        preset: false,
        created_at: Timestamp::now(),
    };

    Some((score, reasons, pattern))
}

/// Finds the first pagination-like query parameter of a request URL.
fn find_pagination_param(url: &url::Url) -> Option<(String, ParamKind, PageValue)> {
    for (key, value) in url.query_pairs() {
        let lowered = key.to_ascii_lowercase();
        let kind = if PAGE_PARAMS.contains(&lowered.as_str()) {
            ParamKind::Page
        } else if OFFSET_PARAMS.contains(&lowered.as_str()) {
            ParamKind::Offset
        } else if CURSOR_PARAMS.contains(&lowered.as_str()) {
            ParamKind::Cursor
        } else if TOKEN_PARAMS.contains(&lowered.as_str()) {
            ParamKind::Token
        } else {
            continue;
        };

        // Value shape refines name-based inference: an opaque value under a
        // numeric-sounding name is really a cursor.
        let observed = match value.parse::<i64>() {
            Ok(number) => PageValue::Number(number),
            Err(_) => PageValue::Token(value.into_owned()),
        };
        let kind = match (&observed, kind) {
            (PageValue::Token(_), ParamKind::Page | ParamKind::Offset) => ParamKind::Cursor,
            (_, kind) => kind,
        };

        return Some((key.into_owned(), kind, observed));
    }
    None
}

/// Finds the array holding the response data.
fn find_data_array(json: &Value) -> Option<(Vec<PathSegment>, usize)> {
    if let Some(array) = json.as_array() {
        return Some((Vec::new(), array.len()));
    }

    for field in DATA_FIELDS {
        if let Some(value) = json.get(*field) {
            if let Some(array) = value.as_array() {
                return Some((vec![PathSegment::Field((*field).to_string())], array.len()));
            }
            // One level of nesting: {"data": {"items": [...]}}.
            if let Some(object) = value.as_object() {
                for (key, nested) in object {
                    if let Some(array) = nested.as_array()
                        && DATA_FIELDS.contains(&key.as_str())
                    {
                        return Some((
                            vec![
                                PathSegment::Field((*field).to_string()),
                                PathSegment::Field(key.clone()),
                            ],
                            array.len(),
                        ));
                    }
                }
            }
        }
    }
    None
}

/// Finds the first of `names` at the root or one level deep.
fn find_field(json: &Value, names: &[&str]) -> Option<Vec<PathSegment>> {
    let object = json.as_object()?;

    for name in names {
        if object.contains_key(*name) {
            return Some(vec![PathSegment::Field((*name).to_string())]);
        }
    }

    for (key, value) in object {
        if let Some(nested) = value.as_object() {
            for name in names {
                if nested.contains_key(*name) {
                    return Some(vec![
                        PathSegment::Field(key.clone()),
                        PathSegment::Field((*name).to_string()),
                    ]);
                }
            }
        }
    }
    None
}

/// Infers the increment from values of `name` observed across the session.
fn infer_increment(name: &str, captures: &[NetworkCapture]) -> Option<i64> {
    let mut values: Vec<i64> = captures
        .iter()
        .filter_map(|capture| url::Url::parse(&capture.url).ok())
        .flat_map(|url| {
            url.query_pairs()
                .filter(|(key, _)| key == name)
                .filter_map(|(_, value)| value.parse::<i64>().ok())
                .collect::<Vec<_>>()
        })
        .collect();

    values.sort_unstable();
    values.dedup();
    if values.len() < 2 {
        return None;
    }

    let increment = values[1] - values[0];
    values
        .windows(2)
        .all(|pair| pair[1] - pair[0] == increment)
        .then_some(increment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn capture(url: &str, body: Value) -> NetworkCapture {
        NetworkCapture {
            url: url.to_string(),
            method: "GET".to_string(),
            status: Some(200),
            content_type: Some("application/json".to_string()),
            json: Some(body),
        }
    }

    fn paged_session() -> PaginationContext {
        let body = |page: i64| {
            json!({
                "items": [
                    { "id": page * 10, "title": format!("item {page}-1") },
                    { "id": page * 10 + 1, "title": format!("item {page}-2") },
                ],
                "hasMore": true,
            })
        };

        PaginationContext {
            page_urls: (1..=3)
                .map(|page| format!("https://example.com/list?page={page}"))
                .collect(),
            captures: (1..=3)
                .map(|page| {
                    capture(
                        &format!("https://example.com/api/items?page={page}"),
                        body(page),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn detects_page_parameter_pattern() {
        let discovery = PaginationDiscovery::new();
        let outcome = discovery.analyze(&paged_session());

        assert!(outcome.detected);
        assert!(outcome.confidence >= 0.99);

        let pattern = outcome.pattern.unwrap();
        assert_eq!(pattern.param.name, "page");
        assert_eq!(pattern.param.kind, ParamKind::Page);
        assert_eq!(pattern.param.increment, 1);
        assert_eq!(
            PathSegment::format_path(&pattern.response.data_path),
            "items"
        );
        assert_eq!(pattern.response.items_per_page, Some(2));
    }

    #[test]
    fn generates_next_page_url() {
        let discovery = PaginationDiscovery::new();
        let pattern = discovery.analyze(&paged_session()).pattern.unwrap();

        let url = pattern.generate_page_url(&PageValue::Number(4));
        assert_eq!(url, "https://example.com/api/items?page=4");

        // Parsed back, the value sits at the advertised location.
        let parsed = url::Url::parse(&url).unwrap();
        let value: Option<String> = parsed
            .query_pairs()
            .find(|(key, _)| key == "page")
            .map(|(_, value)| value.into_owned());
        assert_eq!(value.as_deref(), Some("4"));
    }

    #[test]
    fn page_url_round_trip_over_sequence() {
        let discovery = PaginationDiscovery::new();
        let pattern = discovery.analyze(&paged_session()).pattern.unwrap();

        let mut value = pattern.param.start.clone();
        for expected in 1..=5 {
            let url = pattern.generate_page_url(&value);
            let parsed = url::Url::parse(&url).unwrap();
            let observed: i64 = parsed
                .query_pairs()
                .find(|(key, _)| key == "page")
                .and_then(|(_, value)| value.parse().ok())
                .unwrap();
            assert_eq!(observed, expected);
            value = pattern.next_page_value(&value).unwrap();
        }
    }

    #[test]
    fn offset_increment_inferred_from_observations() {
        let discovery = PaginationDiscovery::new();
        let body = json!({ "results": [1, 2, 3, 4, 5], "total": 50 });
        let context = PaginationContext {
            page_urls: Vec::new(),
            captures: vec![
                capture("https://example.com/api/search?offset=0&q=rust", body.clone()),
                capture("https://example.com/api/search?offset=20&q=rust", body.clone()),
                capture("https://example.com/api/search?offset=40&q=rust", body),
            ],
        };

        let pattern = discovery.analyze(&context).pattern.unwrap();
        assert_eq!(pattern.param.kind, ParamKind::Offset);
        assert_eq!(pattern.param.increment, 20);
        // Non-pagination query parameters survive in the base URL.
        assert!(pattern.base_url.contains("q=rust"));
        assert!(!pattern.base_url.contains("offset"));
    }

    #[test]
    fn cursor_flow_advances_from_response() {
        let discovery = PaginationDiscovery::new();
        let body = json!({
            "data": [1, 2, 3],
            "nextCursor": "abc123",
        });
        let context = PaginationContext {
            page_urls: Vec::new(),
            captures: vec![capture("https://example.com/api/feed?cursor=", body.clone())],
        };

        let pattern = discovery.analyze(&context).pattern.unwrap();
        assert_eq!(pattern.param.kind, ParamKind::Cursor);
        assert!(pattern.next_page_value(&pattern.param.start).is_none());
        assert_eq!(
            pattern.next_cursor_from(&body),
            Some(PageValue::Token("abc123".to_string()))
        );
    }

    #[test]
    fn non_paginated_traffic_is_rejected() {
        let discovery = PaginationDiscovery::new();
        let context = PaginationContext {
            page_urls: Vec::new(),
            captures: vec![capture(
                "https://example.com/api/config",
                json!({ "theme": "dark" }),
            )],
        };

        let outcome = discovery.analyze(&context);
        assert!(!outcome.detected);
        assert!(outcome.pattern.is_none());
    }

    #[test]
    fn three_successes_validate() {
        let discovery = PaginationDiscovery::new();
        let pattern = discovery.analyze(&paged_session()).pattern.unwrap();
        assert!(!pattern.validated);

        for _ in 0..2 {
            discovery.record_usage(
                &pattern.id,
                true,
                Duration::from_millis(90),
                2,
                Duration::from_millis(400),
            );
        }
        assert!(!discovery.get(&pattern.id).unwrap().validated);

        discovery.record_usage(
            &pattern.id,
            true,
            Duration::from_millis(110),
            2,
            Duration::from_millis(400),
        );
        let stored = discovery.get(&pattern.id).unwrap();
        assert!(stored.validated);
        assert_eq!(stored.metrics.items_fetched, 6);
    }

    #[test]
    fn presets_are_validated_immediately() {
        let discovery = PaginationDiscovery::new();
        let mut pattern = discovery.analyze(&paged_session()).pattern.unwrap();
        pattern.id = "preset-example".to_string();
        discovery.add_preset(pattern);

        let stored = discovery.get("preset-example").unwrap();
        assert!(stored.validated);
        assert!(stored.preset);
    }

    #[test]
    fn find_matching_pattern_requires_validation() {
        let discovery = PaginationDiscovery::new();
        let pattern = discovery.analyze(&paged_session()).pattern.unwrap();
        let url = url::Url::parse("https://example.com/api/items?page=7").unwrap();

        assert!(discovery.find_matching_pattern(&url).is_none());

        for _ in 0..3 {
            discovery.record_usage(
                &pattern.id,
                true,
                Duration::from_millis(80),
                2,
                Duration::ZERO,
            );
        }
        assert!(discovery.find_matching_pattern(&url).is_some());
    }

    #[test]
    fn snapshot_round_trip() {
        let discovery = PaginationDiscovery::new();
        let pattern = discovery.analyze(&paged_session()).pattern.unwrap();

        let json = discovery.to_snapshot_json().unwrap();
        assert!(json.contains("\"version\": 1"));

        let restored = PaginationDiscovery::from_snapshot_json(&json).unwrap();
        assert_eq!(restored.get(&pattern.id).unwrap().param.name, "page");
    }
}
