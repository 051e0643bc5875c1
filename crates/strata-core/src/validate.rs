//! Response content validation.
//!
//! Validation decides whether a tier's output is worth returning or whether
//! the fetcher should escalate. The rules are deliberately cheap: length
//! floor, semantic-marker presence, and a scan for the tell-tale text of
//! challenge and loading shells.

use crate::error::ErrorKind;

/// Length at which content is accepted even without semantic markers.
const MARKERLESS_ACCEPT_LEN: usize = 1000;

/// Markup and metadata that indicate a real content page.
const SEMANTIC_MARKERS: &[&str] = &[
    "<article",
    "<main",
    "<h1",
    "og:title",
    "application/ld+json",
    "itemprop=\"headline\"",
    "property=\"article:",
];

/// Text fragments that indicate a challenge or loading shell.
const INCOMPLETE_MARKERS: &[&str] = &[
    "Just a moment",
    "Checking your browser",
    "Enable JavaScript and cookies",
    "Verifying you are human",
    "cf-challenge",
    "Please wait while we verify",
    "Loading...",
    "challenge-platform",
];

/// Outcome of validating one tier attempt's output.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationReport {
    /// `true` if the content passed every rule.
    pub valid: bool,
    /// Failure category when invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    /// Human-readable reason when invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Length of the extracted text that was judged.
    pub text_len: usize,
    /// Number of semantic markers found in the raw HTML.
    pub marker_hits: usize,
}

impl ValidationReport {
    fn ok(text_len: usize, marker_hits: usize) -> Self {
        Self {
            valid: true,
            kind: None,
            reason: None,
            text_len,
            marker_hits,
        }
    }

    fn fail(
        kind: ErrorKind,
        reason: impl Into<String>,
        text_len: usize,
        marker_hits: usize,
    ) -> Self {
        Self {
            valid: false,
            kind: Some(kind),
            reason: Some(reason.into()),
            text_len,
            marker_hits,
        }
    }
}

/// Validates extracted content against the configured floor.
///
/// `min_content_length` is the single effective floor: the incomplete-marker
/// rule fires below the same floor, so tightening or loosening it moves both
/// checks together.
pub fn validate_content(
    html: Option<&str>,
    text: &str,
    min_content_length: usize,
) -> ValidationReport {
    let text_len = text.trim().len();
    let marker_hits = html
        .map(|html| {
            SEMANTIC_MARKERS
                .iter()
                .filter(|marker| html.contains(**marker))
                .count()
        })
        .unwrap_or(0);

    // Challenge shells are short; a long page containing "Loading..." in a
    // widget is fine.
    if text_len < min_content_length {
        let haystack = html.unwrap_or(text);
        if let Some(marker) = INCOMPLETE_MARKERS
            .iter()
            .find(|marker| haystack.contains(**marker))
        {
            return ValidationReport::fail(
                ErrorKind::ValidationIncomplete,
                format!("Incomplete content marker: {marker:?}"),
                text_len,
                marker_hits,
            );
        }
    }

    if text_len < min_content_length {
        return ValidationReport::fail(
            ErrorKind::ValidationShort,
            format!("Content too short: {text_len} < {min_content_length}"),
            text_len,
            marker_hits,
        );
    }

    if marker_hits == 0 && text_len < MARKERLESS_ACCEPT_LEN {
        return ValidationReport::fail(
            ErrorKind::ValidationShort,
            format!("No semantic markers and only {text_len} chars of text"),
            text_len,
            marker_hits,
        );
    }

    ValidationReport::ok(text_len, marker_hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_text(len: usize) -> String {
        let mut text = "loremipsum".repeat(len / 10 + 1);
        text.truncate(len);
        text
    }

    #[test]
    fn accepts_long_marked_content() {
        let text = long_text(800);
        let html = format!("<html><article>{text}</article></html>");
        let report = validate_content(Some(&html), &text, 500);
        assert!(report.valid);
        assert!(report.marker_hits >= 1);
    }

    #[test]
    fn rejects_short_content_with_counts() {
        let text = long_text(120);
        let report = validate_content(None, &text, 500);
        assert!(!report.valid);
        assert_eq!(report.kind, Some(ErrorKind::ValidationShort));
        assert_eq!(
            report.reason.as_deref(),
            Some("Content too short: 120 < 500")
        );
    }

    #[test]
    fn rejects_challenge_shell_as_incomplete() {
        let html = "<html><body>Just a moment...</body></html>";
        let report = validate_content(Some(html), "Just a moment...", 500);
        assert!(!report.valid);
        assert_eq!(report.kind, Some(ErrorKind::ValidationIncomplete));
    }

    #[test]
    fn long_unmarked_text_is_accepted() {
        let text = long_text(1200);
        let report = validate_content(None, &text, 500);
        assert!(report.valid);
        assert_eq!(report.marker_hits, 0);
    }

    #[test]
    fn caller_floor_moves_both_checks() {
        // With a floor of 100, a 150-char page containing a loading marker
        // is past the floor and therefore not judged incomplete.
        let html = format!("<html><main>{} Loading...</main></html>", long_text(150));
        let report = validate_content(Some(&html), &long_text(150), 100);
        assert!(report.valid);
    }
}
