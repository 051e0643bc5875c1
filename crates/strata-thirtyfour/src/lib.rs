#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

// Ensure at least one TLS feature is enabled
#[cfg(not(any(feature = "rustls-tls", feature = "native-tls")))]
compile_error!("At least one TLS feature must be enabled: 'rustls-tls' or 'native-tls'");

pub mod config;
pub mod driver;
pub mod error;
pub mod pool;
pub mod strategy;

// Re-export thirtyfour types for convenience
pub use thirtyfour::WebDriver;

pub use crate::config::{
    BrowserType, PoolConfig, PoolConfigBuilder, WebDriverConfig, WebDriverConfigBuilder,
};
pub use crate::driver::WebDriverBrowser;
pub use crate::error::{BrowserError, BrowserResult};
pub use crate::pool::{SessionManager, SessionPool};
pub use crate::strategy::BrowserStrategy;

/// Prelude module for convenient imports.
#[doc(hidden)]
pub mod prelude;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_browser_over_unreachable_server() {
        // Construction is lazy; no WebDriver server needs to be running.
        let browser = WebDriverBrowser::new(
            vec![WebDriverConfig::new("http://127.0.0.1:4444")],
            PoolConfig::default(),
        );
        assert!(browser.is_ok());
    }

    #[test]
    fn pool_config_validation() {
        let config = PoolConfig::builder()
            .with_max_size(10)
            .build()
            .expect("should build");
        assert_eq!(config.max_size, 10);

        assert!(PoolConfig::builder().with_max_size(0).build().is_err());
    }
}
