//! Error types for query-cache
//!
//! All modules use `QueryCacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for query-cache operations
pub type QueryCacheResult<T> = Result<T, QueryCacheError>;

/// All errors that can occur in query-cache
#[derive(Error, Debug)]
pub enum QueryCacheError {
    // Startup and build-hook errors
    #[error("Cache server failed to start: {0}")]
    StartupFailure(String),

    #[error("Could not find a define-values plugin in the bundler plugin list. This is a bug in query-cache.")]
    MissingCollaboratorPlugin,

    #[error("Could not get the cache server port in time: the transform hook ran before rewrites resolved")]
    PortNotReady,

    // Request handler errors
    #[error("Upstream fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Cache key calculation failed: {0}")]
    CacheKey(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl QueryCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an upstream fetch error
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if error is retryable
    ///
    /// Startup and hook-ordering failures abort the build; only upstream
    /// fetches may succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::StartupFailure(_) => {
                Some("Pick a free port with --port, or use 0 to let the OS choose")
            }
            Self::PortNotReady => {
                Some("The build tool must await the rewrites hook before running the transform hook")
            }
            Self::ConfigInvalid { .. } => Some("Run: query-cache config init --force"),
            _ => None,
        }
    }
}
