//! Tier and plan enumerations.
//!
//! A [`RenderTier`] names a rendering strategy family ordered by cost; a
//! [`ProxyTier`] names a proxy pool family ordered by cost. The two ladders
//! are independent: a cheap render tier may still need an expensive proxy
//! for a hostile domain.

use std::fmt;
use std::str::FromStr;

use crate::{Error, ErrorKind};

/// Rendering strategy family, ordered by cost.
///
/// The derived [`Ord`] follows declaration order, so
/// `Intelligence < Lightweight < Browser` and comparisons read as cost
/// comparisons.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RenderTier {
    /// Plain HTTP fetch with content intelligence. The cheapest tier.
    Intelligence,
    /// HTTP fetch plus lightweight rendering work (embedded state, redirects).
    Lightweight,
    /// A real browser session. The most expensive tier.
    Browser,
}

impl RenderTier {
    /// All tiers in ascending cost order.
    pub const ALL: [Self; 3] = [Self::Intelligence, Self::Lightweight, Self::Browser];

    /// Returns a string representation of the tier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Intelligence => "intelligence",
            Self::Lightweight => "lightweight",
            Self::Browser => "browser",
        }
    }

    /// Returns the next more expensive tier, if any.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Intelligence => Some(Self::Lightweight),
            Self::Lightweight => Some(Self::Browser),
            Self::Browser => None,
        }
    }

    /// Iterates this tier and every more expensive tier, in cost order.
    pub fn and_above(self) -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(move |tier| *tier >= self)
    }
}

impl fmt::Display for RenderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderTier {
    type Err = Error;

    /// Parses a tier name, accepting the aliases callers actually send.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "intelligence" | "smart" | "http" => Ok(Self::Intelligence),
            "lightweight" | "renderer" | "light" => Ok(Self::Lightweight),
            "browser" | "playwright" | "webdriver" => Ok(Self::Browser),
            other => Err(Error::new(
                ErrorKind::Other,
                format!("unknown render tier: {other}"),
            )),
        }
    }
}

/// Proxy pool family, ordered by cost.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProxyTier {
    /// Shared datacenter exits.
    Datacenter,
    /// Residential exits.
    Residential,
    /// Unblocker-grade exits for the most hostile domains.
    Unblocker,
}

impl ProxyTier {
    /// All tiers in ascending cost order.
    pub const ALL: [Self; 3] = [Self::Datacenter, Self::Residential, Self::Unblocker];

    /// Returns a string representation of the tier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Datacenter => "datacenter",
            Self::Residential => "residential",
            Self::Unblocker => "unblocker",
        }
    }

    /// Iterates this tier and every more expensive tier, in cost order.
    pub fn and_above(self) -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(move |tier| *tier >= self)
    }
}

impl fmt::Display for ProxyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant plan, clipping the proxy tiers a request may escalate to.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TenantPlan {
    /// Datacenter proxies only.
    #[default]
    Free,
    /// Datacenter proxies only, higher request quotas.
    Starter,
    /// Residential proxies unlocked.
    Pro,
    /// Unblocker proxies unlocked.
    Enterprise,
}

impl TenantPlan {
    /// The most expensive proxy tier the plan may use.
    pub const fn max_proxy_tier(self) -> ProxyTier {
        match self {
            Self::Free | Self::Starter => ProxyTier::Datacenter,
            Self::Pro => ProxyTier::Residential,
            Self::Enterprise => ProxyTier::Unblocker,
        }
    }

    /// Returns `true` if the plan permits the given proxy tier.
    pub fn allows(self, tier: ProxyTier) -> bool {
        tier <= self.max_proxy_tier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_tier_cost_order() {
        assert!(RenderTier::Intelligence < RenderTier::Lightweight);
        assert!(RenderTier::Lightweight < RenderTier::Browser);
    }

    #[test]
    fn render_tier_aliases() {
        assert_eq!(
            "playwright".parse::<RenderTier>().unwrap(),
            RenderTier::Browser
        );
        assert_eq!(
            "Renderer".parse::<RenderTier>().unwrap(),
            RenderTier::Lightweight
        );
        assert!("quantum".parse::<RenderTier>().is_err());
    }

    #[test]
    fn and_above_walks_up() {
        let tiers: Vec<_> = RenderTier::Lightweight.and_above().collect();
        assert_eq!(tiers, vec![RenderTier::Lightweight, RenderTier::Browser]);
    }

    #[test]
    fn plan_clips_proxy_tier() {
        assert!(TenantPlan::Free.allows(ProxyTier::Datacenter));
        assert!(!TenantPlan::Free.allows(ProxyTier::Residential));
        assert!(TenantPlan::Pro.allows(ProxyTier::Residential));
        assert!(!TenantPlan::Pro.allows(ProxyTier::Unblocker));
        assert!(TenantPlan::Enterprise.allows(ProxyTier::Unblocker));
    }
}
