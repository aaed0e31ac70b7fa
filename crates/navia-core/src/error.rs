//! Error types for the Navia core

use thiserror::Error;

/// Result type alias for core operations
pub type NaviaResult<T> = Result<T, NaviaError>;

/// Errors raised by Navia collaborators and service clients.
///
/// None of these are fatal: the orchestrator converts every remote failure into
/// a "no result this cycle" outcome and, where a user is waiting, a spoken notice.
#[derive(Error, Debug)]
pub enum NaviaError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Inference quota exceeded")]
    QuotaExceeded,

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Speech error: {0}")]
    Speech(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for NaviaError {
    fn from(err: reqwest::Error) -> Self {
        NaviaError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for NaviaError {
    fn from(err: serde_json::Error) -> Self {
        NaviaError::Parse(err.to_string())
    }
}

impl NaviaError {
    /// Transient failures are logged and skipped; the next cycle may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NaviaError::Http(_)
                | NaviaError::Api { .. }
                | NaviaError::QuotaExceeded
                | NaviaError::Timeout(_)
                | NaviaError::Capture(_)
        )
    }
}
