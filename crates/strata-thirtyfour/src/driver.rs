//! The `BrowserDriver` implementation over thirtyfour.

use std::time::Duration;

use strata_core::result::NetworkCapture;
use strata_core::strategy::{BrowserDriver, BrowsePage, PageCapture};
use strata_core::{Error, ErrorKind, Result};
use thirtyfour::prelude::*;

use crate::config::{PoolConfig, WebDriverConfig};
use crate::error::BrowserError;
use crate::pool::{build_pool, SessionManager, SessionPool};

/// Poll interval while awaiting a selector.
const WAIT_POLL: Duration = Duration::from_millis(250);

/// Pooled WebDriver sessions behind the narrow [`BrowserDriver`] interface.
///
/// Direct navigations borrow a pooled session; proxied navigations open a
/// dedicated session because WebDriver binds the proxy when the session is
/// created, and quit it afterwards.
pub struct WebDriverBrowser {
    pool: SessionPool,
    manager: SessionManager,
}

impl WebDriverBrowser {
    /// Creates a browser over one or more WebDriver servers.
    pub fn new(configs: Vec<WebDriverConfig>, pool_config: PoolConfig) -> Result<Self> {
        let manager = SessionManager::new(configs.clone(), &pool_config);
        let pool = build_pool(configs, &pool_config)?;
        Ok(Self { pool, manager })
    }

    async fn capture(
        driver: &WebDriver,
        url: &str,
        options: &BrowsePage,
    ) -> Result<PageCapture> {
        tokio::time::timeout(options.timeout, driver.goto(url))
            .await
            .map_err(|_| {
                Error::from(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: format!("navigation timed out after {:?}", options.timeout),
                })
            })?
            .map_err(|error| {
                Error::from(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: error.to_string(),
                })
            })?;

        if let Some(selector) = &options.wait_for {
            Self::await_selector(driver, selector, options.timeout).await?;
        }

        let html = driver
            .source()
            .await
            .map_err(|error| Error::from(BrowserError::from(error)))?;
        let final_url = driver
            .current_url()
            .await
            .map(|current| current.to_string())
            .unwrap_or_else(|_| url.to_string());

        let network = if options.capture_network {
            Self::resource_entries(driver).await
        } else {
            Vec::new()
        };

        // Console capture needs browser-specific log endpoints the W3C
        // protocol does not expose; callers get an empty list.
        Ok(PageCapture {
            html,
            final_url,
            network,
            console: Vec::new(),
        })
    }

    async fn await_selector(driver: &WebDriver, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if driver.find(By::Css(selector)).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::from(BrowserError::WaitTimeout {
                    selector: selector.to_string(),
                    timeout_secs: timeout.as_secs(),
                }));
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    /// Reads the page's resource timing entries; the portable way to see
    /// what the page fetched without browser-specific log channels.
    async fn resource_entries(driver: &WebDriver) -> Vec<NetworkCapture> {
        const SCRIPT: &str = r#"
            return performance.getEntriesByType('resource')
                .filter(e => e.initiatorType === 'fetch' || e.initiatorType === 'xmlhttprequest')
                .map(e => e.name);
        "#;

        let Ok(ret) = driver.execute(SCRIPT, Vec::new()).await else {
            return Vec::new();
        };
        let Some(urls) = ret.json().as_array() else {
            return Vec::new();
        };

        urls.iter()
            .filter_map(|value| value.as_str())
            .map(|url| NetworkCapture {
                url: url.to_string(),
                method: "GET".to_string(),
                status: None,
                content_type: None,
                json: None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl BrowserDriver for WebDriverBrowser {
    async fn browse(&self, url: &str, options: BrowsePage) -> Result<PageCapture> {
        if let Some(proxy) = options.proxy.clone() {
            // Dedicated session; the proxy is part of its capabilities.
            let driver = self.manager.create_session(Some(&proxy)).await?;
            let capture = Self::capture(&driver, url, &options).await;
            let _ = driver.quit().await;
            return capture;
        }

        let session = self.pool.get().await.map_err(|error| {
            Error::with_source(
                ErrorKind::Transport,
                "browser session pool unavailable",
                Box::new(error),
            )
        })?;
        Self::capture(&session, url, &options).await
    }
}

impl std::fmt::Debug for WebDriverBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDriverBrowser")
            .field("pool", &self.pool.status())
            .finish_non_exhaustive()
    }
}
