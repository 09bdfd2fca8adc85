//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration. Fatal; blocks startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// OAuth validation or token lifecycle failure. Recoverable by
    /// re-login.
    #[error("Auth error: {0}")]
    Auth(#[from] listledger_oauth::Error),

    /// The feed endpoint rejected the request in a way that needs user
    /// action (re-login, API plan). Carries the actionable message.
    #[error("{0}")]
    AuthRequired(String),

    /// Transient fetch/download failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The feed endpoint answered with a non-auth failure status.
    /// Transient; the sync that hit it aborts and can be retried.
    #[error("Feed error: {0}")]
    Feed(String),

    /// Database operation failed. Fatal for the current sync call.
    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
