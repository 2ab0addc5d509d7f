use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Convenient result alias for the everoute library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Dataset could not be located at the resolved path.
    #[error("dataset not found at {path}")]
    DatasetNotFound { path: PathBuf },

    /// Dataset exists but its contents cannot be turned into a starmap.
    #[error("dataset at {path} is corrupt: {message}")]
    DatasetCorrupt { path: PathBuf, message: String },

    /// Raised when attempting to load a schema that is not supported.
    #[error("unsupported dataset schema; expected systems/stargates tables")]
    UnsupportedSchema,

    /// No suitable project directories could be resolved for this platform.
    #[error("failed to resolve project directories for dataset and cache storage")]
    ProjectDirsUnavailable,

    /// Raised when a system name could not be found in the dataset.
    #[error("unknown system name: {name}{}", format_suggestions(.suggestions))]
    UnknownSystem {
        name: String,
        suggestions: Vec<String>,
    },

    /// Raised when no route could be found between two systems.
    #[error("no route found between {start} and {goal}")]
    RouteNotFound { start: String, goal: String },

    /// Upstream asked us to slow down (HTTP 429).
    #[error("rate limited by {url}")]
    RateLimited { url: String },

    /// A single attempt did not complete within its own timeout.
    #[error("request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    /// Upstream answered with a non-success status other than 429.
    #[error("{url} responded with HTTP {status}")]
    UpstreamStatus { url: String, status: u16 },

    /// Every attempt against an external endpoint failed.
    #[error("{url} unavailable after {attempts} attempts: {reason}")]
    ExternalUnavailable {
        url: String,
        attempts: usize,
        reason: String,
    },

    /// The planning request was superseded or cancelled by the caller.
    #[error("route request cancelled")]
    Cancelled,

    /// Wrapper for SQLite errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for HTTP client errors.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Wrapper for JSON decoding errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether another attempt against the same endpoint could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RateLimited { .. } | Error::Timeout { .. } => true,
            Error::UpstreamStatus { status, .. } => *status >= 500,
            Error::Http(err) => !err.is_decode() && !err.is_builder(),
            _ => false,
        }
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else if suggestions.len() == 1 {
        format!(". Did you mean '{}'?", suggestions[0])
    } else {
        format!(
            ". Did you mean one of: {}?",
            suggestions
                .iter()
                .map(|s| format!("'{}'", s))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}
