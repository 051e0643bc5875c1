//! Domain categories for TTL scaling.
//!
//! The category is used only by the cache: it scales the base TTL by how
//! volatile content of that kind tends to be. Classification is hostname
//! pattern matching, nothing more.

/// Content-volatility class of a hostname.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DomainCategory {
    /// Government sites; changes rarely.
    StaticGov,
    /// Documentation portals.
    StaticDocs,
    /// Universities.
    StaticEdu,
    /// Wikis.
    StaticWiki,
    /// Other static-leaning sites.
    StaticDefault,
    /// Social feeds; changes constantly.
    DynamicSocial,
    /// News sites.
    DynamicNews,
    /// Storefronts; prices move.
    DynamicCommerce,
    /// Everything else.
    #[default]
    Default,
}

impl DomainCategory {
    /// TTL multiplier of this category.
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::StaticGov => 4.0,
            Self::StaticDocs => 3.0,
            Self::StaticEdu => 3.0,
            Self::StaticWiki => 2.0,
            Self::StaticDefault => 2.0,
            Self::DynamicSocial => 0.25,
            Self::DynamicNews => 0.5,
            Self::DynamicCommerce => 0.75,
            Self::Default => 1.0,
        }
    }

    /// Classifies a hostname.
    #[must_use]
    pub fn classify(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        let has_label = |needle: &str| {
            host == needle
                || host.ends_with(&format!(".{needle}"))
                || host.starts_with(&format!("{needle}."))
        };

        if host.ends_with(".gov") || host.ends_with(".mil") {
            return Self::StaticGov;
        }
        if has_label("docs") || has_label("developer") || host.ends_with(".readthedocs.io") {
            return Self::StaticDocs;
        }
        if host.ends_with(".edu") || host.ends_with(".ac.uk") {
            return Self::StaticEdu;
        }
        if has_label("wiki") || host.contains("wikipedia.") || host.contains("wikimedia.") {
            return Self::StaticWiki;
        }

        const SOCIAL: &[&str] = &[
            "twitter.com",
            "x.com",
            "facebook.com",
            "instagram.com",
            "reddit.com",
            "tiktok.com",
            "threads.net",
            "bsky.app",
        ];
        if SOCIAL.iter().any(|social| host_is(&host, social)) {
            return Self::DynamicSocial;
        }

        const NEWS: &[&str] = &[
            "cnn.com",
            "bbc.com",
            "bbc.co.uk",
            "nytimes.com",
            "reuters.com",
            "theguardian.com",
            "apnews.com",
            "bloomberg.com",
        ];
        if NEWS.iter().any(|news| host_is(&host, news)) || has_label("news") {
            return Self::DynamicNews;
        }

        const COMMERCE: &[&str] = &["amazon.com", "ebay.com", "etsy.com", "walmart.com"];
        if COMMERCE.iter().any(|commerce| host_is(&host, commerce))
            || has_label("shop")
            || has_label("store")
        {
            return Self::DynamicCommerce;
        }

        if host.ends_with(".org") {
            return Self::StaticDefault;
        }

        Self::Default
    }
}

fn host_is(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipliers_are_exact() {
        assert_eq!(DomainCategory::StaticGov.multiplier(), 4.0);
        assert_eq!(DomainCategory::StaticDocs.multiplier(), 3.0);
        assert_eq!(DomainCategory::StaticEdu.multiplier(), 3.0);
        assert_eq!(DomainCategory::StaticWiki.multiplier(), 2.0);
        assert_eq!(DomainCategory::StaticDefault.multiplier(), 2.0);
        assert_eq!(DomainCategory::DynamicSocial.multiplier(), 0.25);
        assert_eq!(DomainCategory::DynamicNews.multiplier(), 0.5);
        assert_eq!(DomainCategory::DynamicCommerce.multiplier(), 0.75);
        assert_eq!(DomainCategory::Default.multiplier(), 1.0);
    }

    #[test]
    fn classification_samples() {
        assert_eq!(
            DomainCategory::classify("whitehouse.gov"),
            DomainCategory::StaticGov
        );
        assert_eq!(
            DomainCategory::classify("docs.rs"),
            DomainCategory::StaticDocs
        );
        assert_eq!(
            DomainCategory::classify("cs.stanford.edu"),
            DomainCategory::StaticEdu
        );
        assert_eq!(
            DomainCategory::classify("en.wikipedia.org"),
            DomainCategory::StaticWiki
        );
        assert_eq!(
            DomainCategory::classify("old.reddit.com"),
            DomainCategory::DynamicSocial
        );
        assert_eq!(
            DomainCategory::classify("edition.cnn.com"),
            DomainCategory::DynamicNews
        );
        assert_eq!(
            DomainCategory::classify("shop.example.com"),
            DomainCategory::DynamicCommerce
        );
        assert_eq!(
            DomainCategory::classify("archive.org"),
            DomainCategory::StaticDefault
        );
        assert_eq!(
            DomainCategory::classify("example.com"),
            DomainCategory::Default
        );
    }
}
