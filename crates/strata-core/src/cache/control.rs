//! `Cache-Control` parsing and formatting.

use std::fmt;
use std::str::FromStr;

/// Parsed `Cache-Control` directives the cache acts on.
///
/// Parsing and formatting round-trip: `parse(format(d)) == d` for every
/// directive set, with directives emitted in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheControl {
    /// `no-store`.
    pub no_store: bool,
    /// `no-cache`.
    pub no_cache: bool,
    /// `public`.
    pub public: bool,
    /// `private`.
    pub private: bool,
    /// `must-revalidate`.
    pub must_revalidate: bool,
    /// `immutable`.
    pub immutable: bool,
    /// `max-age=<secs>`.
    pub max_age: Option<u64>,
    /// `s-maxage=<secs>`.
    pub s_maxage: Option<u64>,
    /// `stale-while-revalidate=<secs>`.
    pub stale_while_revalidate: Option<u64>,
}

impl CacheControl {
    /// Returns `true` if the header forbids caching.
    #[must_use]
    pub const fn forbids_caching(&self) -> bool {
        self.no_store || self.no_cache
    }

    /// Effective freshness lifetime: `s-maxage` wins over `max-age`.
    #[must_use]
    pub const fn effective_max_age(&self) -> Option<u64> {
        match self.s_maxage {
            Some(secs) => Some(secs),
            None => self.max_age,
        }
    }

    /// Returns `true` if no directive was present at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl FromStr for CacheControl {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut control = Self::default();

        for directive in value.split(',') {
            let directive = directive.trim();
            let (name, argument) = match directive.split_once('=') {
                Some((name, argument)) => (name.trim(), Some(argument.trim().trim_matches('"'))),
                None => (directive, None),
            };

            match name.to_ascii_lowercase().as_str() {
                "no-store" => control.no_store = true,
                "no-cache" => control.no_cache = true,
                "public" => control.public = true,
                "private" => control.private = true,
                "must-revalidate" => control.must_revalidate = true,
                "immutable" => control.immutable = true,
                "max-age" => control.max_age = argument.and_then(|a| a.parse().ok()),
                "s-maxage" => control.s_maxage = argument.and_then(|a| a.parse().ok()),
                "stale-while-revalidate" => {
                    control.stale_while_revalidate = argument.and_then(|a| a.parse().ok());
                }
                _ => {}
            }
        }

        Ok(control)
    }
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();

        if self.public {
            parts.push("public".to_string());
        }
        if self.private {
            parts.push("private".to_string());
        }
        if self.no_store {
            parts.push("no-store".to_string());
        }
        if self.no_cache {
            parts.push("no-cache".to_string());
        }
        if self.must_revalidate {
            parts.push("must-revalidate".to_string());
        }
        if self.immutable {
            parts.push("immutable".to_string());
        }
        if let Some(secs) = self.max_age {
            parts.push(format!("max-age={secs}"));
        }
        if let Some(secs) = self.s_maxage {
            parts.push(format!("s-maxage={secs}"));
        }
        if let Some(secs) = self.stale_while_revalidate {
            parts.push(format!("stale-while-revalidate={secs}"));
        }

        f.write_str(&parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_headers() {
        let control: CacheControl = "public, max-age=300".parse().unwrap();
        assert!(control.public);
        assert_eq!(control.max_age, Some(300));
        assert!(!control.forbids_caching());

        let control: CacheControl = "no-store".parse().unwrap();
        assert!(control.forbids_caching());
    }

    #[test]
    fn s_maxage_wins() {
        let control: CacheControl = "max-age=60, s-maxage=600".parse().unwrap();
        assert_eq!(control.effective_max_age(), Some(600));
    }

    #[test]
    fn parse_format_round_trip() {
        let cases = [
            "public, max-age=300",
            "private, no-cache",
            "no-store",
            "public, must-revalidate, max-age=86400, stale-while-revalidate=60",
            "public, immutable, s-maxage=604800",
            "",
        ];

        for case in cases {
            let parsed: CacheControl = case.parse().unwrap();
            let formatted = parsed.to_string();
            let reparsed: CacheControl = formatted.parse().unwrap();
            assert_eq!(parsed, reparsed, "case: {case:?}");
        }
    }

    #[test]
    fn unknown_directives_are_ignored() {
        let control: CacheControl = "max-age=10, x-proprietary=1, no-transform"
            .parse()
            .unwrap();
        assert_eq!(control.max_age, Some(10));
        assert!(control.stale_while_revalidate.is_none());
    }
}
