//! WebDriver session pool built on deadpool.
//!
//! The manager creates sessions with retry and backoff, health-checks
//! them on recycle by asking for the current URL, and distributes across
//! multiple WebDriver servers round-robin. Only direct-connection
//! sessions are pooled; proxied sessions are created per navigation by
//! the driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use deadpool::managed::{Manager, Metrics, Pool, RecycleError, RecycleResult};
use strata_core::proxy::pool::ProxyEndpoint;
use strata_core::{Error, ErrorKind, Result};
use thirtyfour::WebDriver;

use crate::config::{PoolConfig, WebDriverConfig};
use crate::error::BrowserError;

/// Creates and recycles WebDriver sessions for the pool.
#[derive(Debug, Clone)]
pub struct SessionManager {
    configs: Arc<Vec<WebDriverConfig>>,
    counter: Arc<AtomicU64>,
    health_check_on_recycle: bool,
    create_retries: usize,
}

impl SessionManager {
    /// Creates a manager over one or more WebDriver servers.
    pub fn new(configs: Vec<WebDriverConfig>, pool_config: &PoolConfig) -> Self {
        Self {
            configs: Arc::new(configs),
            counter: Arc::new(AtomicU64::new(0)),
            health_check_on_recycle: pool_config.health_check_on_recycle,
            create_retries: pool_config.create_retries.max(1),
        }
    }

    /// Returns `true` if no server is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Round-robin pick of the next server config.
    fn next_config(&self) -> Result<&WebDriverConfig> {
        if self.configs.is_empty() {
            return Err(Error::new(
                ErrorKind::Other,
                "no WebDriver servers configured",
            ));
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) as usize;
        Ok(&self.configs[index % self.configs.len()])
    }

    /// Opens a session, retrying with a short backoff.
    ///
    /// A proxy, when given, becomes part of the session capabilities; such
    /// sessions must not be pooled.
    pub async fn create_session(&self, proxy: Option<&ProxyEndpoint>) -> Result<WebDriver> {
        let config = self.next_config()?;
        let capabilities = config.capabilities(proxy);

        let mut last: Option<BrowserError> = None;
        for attempt in 1..=self.create_retries {
            match WebDriver::new(&config.url, capabilities.clone()).await {
                Ok(driver) => {
                    let _ = driver.set_page_load_timeout(config.navigation_timeout).await;
                    return Ok(driver);
                }
                Err(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        server = %config.url,
                        attempt,
                        error = %error,
                        "failed to open WebDriver session",
                    );
                    last = Some(BrowserError::ConnectionFailed {
                        url: config.url.clone(),
                        source: Box::new(error),
                    });
                    if attempt < self.create_retries {
                        tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                    }
                }
            }
        }

        Err(last
            .map(Error::from)
            .unwrap_or_else(|| Error::new(ErrorKind::Other, "session creation never ran")))
    }

    async fn session_is_healthy(&self, driver: &WebDriver) -> bool {
        driver.current_url().await.is_ok()
    }
}

impl Manager for SessionManager {
    type Type = WebDriver;
    type Error = Error;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        self.create_session(None).await
    }

    async fn recycle(&self, driver: &mut Self::Type, _metrics: &Metrics) -> RecycleResult<Error> {
        if !self.health_check_on_recycle {
            return Ok(());
        }
        if self.session_is_healthy(driver).await {
            Ok(())
        } else {
            Err(RecycleError::Backend(Error::new(
                ErrorKind::Other,
                "WebDriver session failed recycle health check",
            )))
        }
    }
}

/// Type alias for the session pool.
pub type SessionPool = Pool<SessionManager>;

/// Builds a [`SessionPool`] from configs.
pub fn build_pool(configs: Vec<WebDriverConfig>, pool_config: &PoolConfig) -> Result<SessionPool> {
    let manager = SessionManager::new(configs, pool_config);
    Pool::builder(manager)
        .max_size(pool_config.max_size)
        .build()
        .map_err(|error| {
            Error::with_source(
                ErrorKind::Other,
                "failed to build browser session pool",
                Box::new(error),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_round_robins_servers() {
        let manager = SessionManager::new(
            vec![
                WebDriverConfig::new("http://localhost:4444"),
                WebDriverConfig::new("http://localhost:4445"),
            ],
            &PoolConfig::default(),
        );

        let first = manager.next_config().unwrap().url.clone();
        let second = manager.next_config().unwrap().url.clone();
        let third = manager.next_config().unwrap().url.clone();
        assert_ne!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn empty_manager_errors() {
        let manager = SessionManager::new(Vec::new(), &PoolConfig::default());
        assert!(manager.is_empty());
        assert!(manager.next_config().is_err());
    }

    #[test]
    fn pool_construction() {
        let pool = build_pool(
            vec![WebDriverConfig::new("http://localhost:4444")],
            &PoolConfig::default(),
        );
        // No WebDriver server is running, but construction is lazy.
        assert!(pool.is_ok());
        assert_eq!(pool.unwrap().status().max_size, 4);
    }
}
