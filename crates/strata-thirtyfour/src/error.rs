//! Error handling for browser automation operations.

use strata_core::{Error, ErrorKind};
use thirtyfour::error::WebDriverError;
use thiserror::Error as ThisError;

/// Specific error types for browser operations.
#[derive(Debug, ThisError)]
pub enum BrowserError {
    /// Failed to connect to the WebDriver server
    #[error("failed to connect to WebDriver server at '{url}': {source}")]
    ConnectionFailed {
        /// WebDriver server URL that failed
        url: String,
        /// Underlying connection error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The WebDriver server returned an error
    #[error("WebDriver error: {0}")]
    WebDriver(#[source] Box<WebDriverError>),

    /// Navigation did not complete
    #[error("navigation to '{url}' failed: {reason}")]
    Navigation {
        /// URL being navigated to
        url: String,
        /// What went wrong
        reason: String,
    },

    /// An awaited element never appeared
    #[error("selector '{selector}' did not appear within {timeout_secs}s")]
    WaitTimeout {
        /// Selector that was awaited
        selector: String,
        /// Seconds waited
        timeout_secs: u64,
    },

    /// The session pool is exhausted
    #[error("browser pool exhausted: {active}/{size} sessions active")]
    PoolExhausted {
        /// Pool size
        size: usize,
        /// Active sessions
        active: usize,
    },

    /// Configuration error
    #[error("browser configuration error: {0}")]
    Configuration(String),
}

impl BrowserError {
    /// Returns the error category for grouping similar errors.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "connection",
            Self::WebDriver(_) => "webdriver",
            Self::Navigation { .. } => "navigation",
            Self::WaitTimeout { .. } => "wait",
            Self::PoolExhausted { .. } => "pool",
            Self::Configuration(_) => "config",
        }
    }

    /// Returns whether this error type is generally retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::Navigation { .. }
                | Self::WaitTimeout { .. }
                | Self::PoolExhausted { .. }
        )
    }

    const fn error_kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed { .. }
            | Self::Navigation { .. }
            | Self::WaitTimeout { .. }
            | Self::PoolExhausted { .. } => ErrorKind::Transport,
            Self::WebDriver(_) | Self::Configuration(_) => ErrorKind::Other,
        }
    }
}

impl From<BrowserError> for Error {
    fn from(error: BrowserError) -> Self {
        Error::with_source(error.error_kind(), error.to_string(), Box::new(error))
    }
}

impl From<WebDriverError> for BrowserError {
    fn from(error: WebDriverError) -> Self {
        Self::WebDriver(Box::new(error))
    }
}

/// Type alias for `Result<T, BrowserError>`.
pub type BrowserResult<T> = Result<T, BrowserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(
            BrowserError::Configuration("bad".into()).category(),
            "config"
        );
        assert_eq!(
            BrowserError::PoolExhausted { size: 4, active: 4 }.category(),
            "pool"
        );
    }

    #[test]
    fn retryability() {
        assert!(BrowserError::PoolExhausted { size: 4, active: 4 }.is_retryable());
        assert!(!BrowserError::Configuration("bad".into()).is_retryable());
    }

    #[test]
    fn converts_to_core_error() {
        let error: Error = BrowserError::Navigation {
            url: "https://example.com/".into(),
            reason: "net::ERR_CONNECTION_RESET".into(),
        }
        .into();
        assert_eq!(error.kind(), ErrorKind::Transport);
    }
}
