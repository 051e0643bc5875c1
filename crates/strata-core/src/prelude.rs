//! Prelude module for convenient imports.

pub use crate::cache::{AdaptiveCache, CacheControl, DomainCategory};
pub use crate::config::CoreConfig;
pub use crate::error::{Error, ErrorKind, Recommendation};
pub use crate::fetcher::{Core, TieredFetcher};
pub use crate::learn::{
    DynamicHandlerRegistry, KnowledgeBase, LearnedApiPattern, PaginationApiPattern,
    PaginationDiscovery, SiteQuirks,
};
pub use crate::proxy::{
    ProxyEndpoint, ProxyHealthTracker, ProxyManager, ProxyPool, RotationStrategy,
};
pub use crate::request::{FetchRequest, Freshness};
pub use crate::result::{FetchResult, PageContent, TierAttempt};
pub use crate::strategy::{BrowserDriver, FetchStrategy, StrategyOutput, StrategyRequest};
pub use crate::tier::{ProxyTier, RenderTier, TenantPlan};
pub use crate::Result;
