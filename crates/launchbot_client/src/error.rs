//! Error types for a question/answer exchange.

use thiserror::Error;

/// Errors that end an exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// The trimmed question was empty; nothing was sent.
    #[error("question is empty")]
    EmptyQuestion,

    /// The response carried no readable body.
    #[error("response stream unavailable: {0}")]
    StreamUnavailable(String),

    /// Sending the request or reading the body failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The caller cancelled the exchange before it completed.
    #[error("exchange cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        ExchangeError::Transport(e.to_string())
    }
}

/// Problems with source data. These never fail an exchange; the offending
/// payload or URL is logged and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("sources payload has no list of URL strings")]
    MalformedPayload,

    #[error("unparseable source URL {url:?}: {reason}")]
    UnparseableUrl { url: String, reason: String },
}
