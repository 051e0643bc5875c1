#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod cache;
pub mod config;
mod error;
pub mod extract;
pub mod fetcher;
pub mod learn;
pub mod limit;
pub mod perf;
pub mod persist;
pub mod proxy;
pub mod request;
pub mod result;
pub mod ssrf;
pub mod strategy;
pub mod tier;
pub mod validate;

#[doc(hidden)]
pub mod prelude;

#[doc(no_inline)]
pub use async_trait::async_trait;

pub use crate::config::CoreConfig;
pub use crate::error::{BoxError, Error, ErrorKind, Recommendation};
pub use crate::fetcher::{Core, TieredFetcher};
pub use crate::request::{FetchRequest, Freshness};
pub use crate::result::{FetchResult, PageContent, TierAttempt};
pub use crate::tier::{ProxyTier, RenderTier, TenantPlan};

/// Specialized [`Result`] type for fetch processing.
///
/// [`Result`]: std::result::Result
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Tracing target for fetcher-related events.
#[cfg(feature = "tracing")]
pub(crate) const TRACING_TARGET_FETCHER: &str = "strata_core::fetcher";

/// Tracing target for proxy-related events.
#[cfg(feature = "tracing")]
pub(crate) const TRACING_TARGET_PROXY: &str = "strata_core::proxy";

/// Tracing target for learning-store events.
#[cfg(feature = "tracing")]
pub(crate) const TRACING_TARGET_LEARN: &str = "strata_core::learn";
