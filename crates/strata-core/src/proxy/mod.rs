//! Proxy pool management.
//!
//! Three components cooperate here:
//!
//! - [`ProxyHealthTracker`] keeps a sliding outcome window per endpoint,
//!   escalating cooldowns and per-domain block sets.
//! - [`DomainRiskClassifier`] maps a domain to a risk level and the proxy
//!   tier worth starting from.
//! - [`ProxyManager`] owns the tier → pool registry and runs the selection
//!   algorithm over both.
//!
//! [`ProxyHealthTracker`]: health::ProxyHealthTracker
//! [`DomainRiskClassifier`]: risk::DomainRiskClassifier
//! [`ProxyManager`]: manager::ProxyManager

pub mod health;
pub mod manager;
pub mod pool;
pub mod risk;

pub use health::{FailureReason, ProxyHealthTracker};
pub use manager::{ProxyManager, SelectedProxy, SelectionReason};
pub use pool::{ProxyEndpoint, ProxyPool, RotationStrategy};
pub use risk::{DomainRisk, DomainRiskClassifier, ProtectionSystem, RiskLevel};
