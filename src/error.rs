//! Error types for lexideck.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("word entry not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: crate::model::WordState,
        to: crate::model::WordState,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connection reset: {0}")]
    ConnectionReset(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("AnkiConnect {action} failed: {message}")]
    Rpc { action: String, message: String },

    #[error("llm error: {0}")]
    Llm(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("state store writer has shut down")]
    StoreClosed,

    #[error("no words ready for export; generate content first")]
    NothingToExport,

    #[error("cannot reach Anki: {0}")]
    Unreachable(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the flashcard RPC should retry after this error.
    pub fn is_connection_reset(&self) -> bool {
        matches!(self, Error::ConnectionReset(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
