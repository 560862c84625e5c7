//! Error types for portfolio_chat
//!
//! Loading errors come from reading portfolio files, completion errors from
//! the chat-completion service. Both are shown to users, so the messages
//! should be clear and actionable.

use thiserror::Error;

/// Errors raised while loading a portfolio from a CSV file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing required column '{0}' (expected Symbol, Quantity, Cost, Current)")]
    MissingColumn(&'static str),

    #[error("Invalid row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error("Malformed CSV: {0}")]
    Csv(String),

    #[error("Duplicate portfolio name: {0}")]
    DuplicatePortfolio(String),
}

/// Whether retrying the same request could plausibly succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
}

/// Failures from the chat-completion service.
///
/// The assistant folds every variant into a single visible reply, but the
/// split between transient and permanent failures is kept so callers can
/// log or react to it.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CompletionError::Network(_)
            | CompletionError::RateLimited(_)
            | CompletionError::Server { .. } => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }
}
