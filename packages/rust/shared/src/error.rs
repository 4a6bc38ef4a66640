//! Error types for GrantScout.
//!
//! Library crates use [`GrantScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all GrantScout operations.
#[derive(Debug, thiserror::Error)]
pub enum GrantScoutError {
    /// Configuration loading or validation error. Fatal at startup.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status from a page, feed, or LLM endpoint.
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// Malformed response body or unparseable document.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// LLM extraction failure that retrying will not fix.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// A structured feed could not be ingested.
    #[error("feed error ({feed}): {message}")]
    Feed { feed: String, message: String },

    /// Headless browser re-render failed.
    #[error("render error: {0}")]
    Render(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-text conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Every seed and feed in a run failed.
    #[error("all sources failed: {0}")]
    AllSourcesFailed(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GrantScoutError>;

impl GrantScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a feed error tagged with the feed name.
    pub fn feed(feed: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Feed {
            feed: feed.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry has a chance of succeeding.
    ///
    /// Network failures, malformed bodies, request timeouts, rate limits and
    /// server errors are transient. Client errors (bad key, bad request) are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Parse { .. } => true,
            Self::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = GrantScoutError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = GrantScoutError::feed("grantconnect", "HTTP 503");
        assert_eq!(err.to_string(), "feed error (grantconnect): HTTP 503");
    }

    #[test]
    fn transient_classification() {
        assert!(GrantScoutError::Network("reset".into()).is_transient());
        assert!(GrantScoutError::parse("no grants key").is_transient());
        assert!(
            GrantScoutError::Http {
                url: "https://x".into(),
                status: 429
            }
            .is_transient()
        );
        assert!(
            GrantScoutError::Http {
                url: "https://x".into(),
                status: 502
            }
            .is_transient()
        );
        assert!(
            !GrantScoutError::Http {
                url: "https://x".into(),
                status: 401
            }
            .is_transient()
        );
        assert!(!GrantScoutError::config("bad").is_transient());
        assert!(!GrantScoutError::Extraction("refused".into()).is_transient());
    }
}
