//! Prelude module for convenient imports.

pub use crate::config::{BrowserType, PoolConfig, WebDriverConfig};
pub use crate::driver::WebDriverBrowser;
pub use crate::error::{BrowserError, BrowserResult};
pub use crate::strategy::BrowserStrategy;
