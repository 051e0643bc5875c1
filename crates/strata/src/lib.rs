#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod engine;
pub mod env;
pub mod presets;

#[doc(inline)]
pub use engine::{Engine, EngineBuilder};
#[doc(no_inline)]
pub use strata_core::async_trait;
pub use strata_core::{
    cache, config, fetcher, learn, limit, perf, persist, proxy, request, result, ssrf, strategy,
    tier, validate, CoreConfig, Error, ErrorKind, FetchRequest, FetchResult, Freshness,
    PageContent, ProxyTier, Recommendation, RenderTier, Result, TenantPlan, TierAttempt,
};
#[cfg(feature = "reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
pub use strata_reqwest::{HttpFetcher, IntelligenceStrategy, LightweightStrategy};
#[cfg(feature = "thirtyfour")]
#[cfg_attr(docsrs, doc(cfg(feature = "thirtyfour")))]
pub use strata_thirtyfour::{
    BrowserError, BrowserStrategy, BrowserType, PoolConfig, WebDriverBrowser, WebDriverConfig,
};

#[doc(hidden)]
pub mod prelude;
