//! Per-domain learning stores.
//!
//! Everything the engine learns from traffic lives here:
//!
//! - [`KnowledgeBase`] - API endpoint patterns that can satisfy a page
//!   request without rendering it.
//! - [`PaginationDiscovery`] - paginated-API patterns detected from
//!   captured traffic.
//! - [`DynamicHandlerRegistry`] - per-domain extraction templates and
//!   [`SiteQuirks`] accumulated from observations and failures.
//!
//! Stores are bounded (rings per domain, capacity knobs) and snapshot to
//! versioned JSON through [`persist`].
//!
//! [`KnowledgeBase`]: knowledge::KnowledgeBase
//! [`PaginationDiscovery`]: pagination::PaginationDiscovery
//! [`DynamicHandlerRegistry`]: handlers::DynamicHandlerRegistry
//! [`SiteQuirks`]: quirks::SiteQuirks
//! [`persist`]: crate::persist

pub mod handlers;
pub mod knowledge;
pub mod observation;
pub mod pagination;
pub mod path;
pub mod quirks;

pub use handlers::{DynamicHandlerRegistry, HandlerTemplate, LearnedSiteHandler};
pub use knowledge::{Confidence, KnowledgeBase, LearnedApiPattern};
pub use observation::SiteObservation;
pub use pagination::{PaginationApiPattern, PaginationDiscovery};
pub use path::PathSegment;
pub use quirks::SiteQuirks;
