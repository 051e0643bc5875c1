#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

// Ensure at least one TLS feature is enabled
#[cfg(not(any(feature = "rustls-tls", feature = "native-tls")))]
compile_error!("At least one TLS feature must be enabled: 'rustls-tls' or 'native-tls'");

pub mod client;
pub mod intelligence;
pub mod lightweight;

pub use crate::client::{HttpExchange, HttpFetcher};
pub use crate::intelligence::IntelligenceStrategy;
pub use crate::lightweight::LightweightStrategy;

/// Prelude module for convenient imports.
#[doc(hidden)]
pub mod prelude;

#[cfg(test)]
mod tests {
    use strata_core::strategy::FetchStrategy;
    use strata_core::tier::RenderTier;

    use super::*;

    #[test]
    fn strategies_report_their_tiers() {
        let http = HttpFetcher::default();
        assert_eq!(
            IntelligenceStrategy::new(http.clone()).tier(),
            RenderTier::Intelligence
        );
        assert_eq!(
            LightweightStrategy::new(http).tier(),
            RenderTier::Lightweight
        );
    }
}
