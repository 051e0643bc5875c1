//! Engine assembly.

use std::fmt;
use std::sync::Arc;

use strata_core::fetcher::{Core, TieredFetcher};
use strata_core::proxy::pool::ProxyPool;
use strata_core::request::FetchRequest;
use strata_core::result::FetchResult;
use strata_core::strategy::FetchStrategy;
use strata_core::{CoreConfig, Error, ErrorKind, Result};

use crate::env;
use crate::presets;

/// The assembled retrieval engine.
///
/// An `Engine` is a [`Core`] wired to a set of tier strategies. Every
/// engine is independent; tests build a fresh one per case and nothing
/// leaks between them.
pub struct Engine {
    fetcher: TieredFetcher,
}

impl Engine {
    /// Creates a builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Fetches a URL with default options.
    pub async fn fetch(&self, url: impl Into<String>) -> Result<FetchResult> {
        self.fetcher.fetch(FetchRequest::new(url)).await
    }

    /// Fetches with explicit options.
    pub async fn fetch_with(&self, request: FetchRequest) -> Result<FetchResult> {
        self.fetcher.fetch(request).await
    }

    /// The underlying fetcher, for cancellable fetches.
    #[must_use]
    pub fn fetcher(&self) -> &TieredFetcher {
        &self.fetcher
    }

    /// The shared component core.
    #[must_use]
    pub fn core(&self) -> &Arc<Core> {
        self.fetcher.core()
    }

    /// Snapshots the learning stores to the configured data directory.
    pub async fn snapshot(&self) -> Result<()> {
        self.core().snapshot().await
    }

    /// Spawns a background task snapshotting the learning stores every
    /// `interval`. Snapshot failures are logged by the core and do not
    /// stop the task. Abort the handle to stop.
    pub fn spawn_snapshot_task(
        &self,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let core = Arc::clone(self.core());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = core.snapshot().await;
            }
        })
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("fetcher", &self.fetcher)
            .finish()
    }
}

/// Assembles an [`Engine`] from config, pools, and strategies.
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<CoreConfig>,
    pools: Vec<ProxyPool>,
    strategies: Vec<Arc<dyn FetchStrategy>>,
    #[cfg(feature = "thirtyfour")]
    browser: Option<Arc<dyn strata_core::strategy::BrowserDriver>>,
    read_env: bool,
    with_presets: bool,
}

impl EngineBuilder {
    /// Uses the given config instead of defaults.
    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Reads proxy pools and knob overrides from the environment.
    pub fn from_env(mut self) -> Self {
        self.read_env = true;
        self
    }

    /// Registers a proxy pool.
    pub fn add_pool(mut self, pool: ProxyPool) -> Self {
        self.pools.push(pool);
        self
    }

    /// Registers a strategy, replacing the default for its tier.
    pub fn with_strategy(mut self, strategy: Arc<dyn FetchStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Drives the browser tier with this driver.
    #[cfg(feature = "thirtyfour")]
    #[cfg_attr(docsrs, doc(cfg(feature = "thirtyfour")))]
    pub fn with_browser_driver(
        mut self,
        driver: Arc<dyn strata_core::strategy::BrowserDriver>,
    ) -> Self {
        self.browser = Some(driver);
        self
    }

    /// Injects preset pagination patterns and the browser-required list.
    pub fn with_presets(mut self) -> Self {
        self.with_presets = true;
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Fails when no strategy ends up registered for any tier.
    pub async fn build(self) -> Result<Engine> {
        let mut config = self.config.unwrap_or_default();
        if self.read_env {
            config = env::apply_env(config);
        }

        let core = Arc::new(Core::restore(config).await);

        if self.read_env {
            for pool in env::pools_from_env() {
                core.proxies().add_pool(pool);
            }
        }
        for pool in self.pools {
            core.proxies().add_pool(pool);
        }

        if self.with_presets {
            for pattern in presets::pagination_presets() {
                core.pagination().add_preset(pattern);
            }
            for domain in presets::BROWSER_REQUIRED {
                core.mark_browser_required(domain);
            }
        }

        let mut fetcher = TieredFetcher::new(core);

        #[cfg(feature = "reqwest")]
        if self.strategies.is_empty() {
            let http = strata_reqwest::HttpFetcher::new();
            fetcher = fetcher
                .with_strategy(Arc::new(strata_reqwest::IntelligenceStrategy::new(
                    http.clone(),
                )))
                .with_strategy(Arc::new(strata_reqwest::LightweightStrategy::new(http)));
        }

        let mut registered = self.strategies.is_empty() && cfg!(feature = "reqwest");
        for strategy in self.strategies {
            fetcher = fetcher.with_strategy(strategy);
            registered = true;
        }

        #[cfg(feature = "thirtyfour")]
        if let Some(driver) = self.browser {
            fetcher =
                fetcher.with_strategy(Arc::new(strata_thirtyfour::BrowserStrategy::new(driver)));
            registered = true;
        }

        if !registered {
            return Err(Error::new(
                ErrorKind::CostBudget,
                "no fetch strategies registered; enable the `reqwest` feature or register one",
            ));
        }

        Ok(Engine { fetcher })
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("pools", &self.pools.len())
            .field("strategies", &self.strategies.len())
            .field("read_env", &self.read_env)
            .finish_non_exhaustive()
    }
}
