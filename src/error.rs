//! Error types for the shapes client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("attestation session missing or expired: {0}")]
    Session(String),

    #[error("attestation fetch failed: {0}")]
    Fetch(String),

    #[error("attestation service error: {0}")]
    Service(String),

    #[error("fingerprint provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("fingerprint evaluation failed: {0}")]
    Evaluation(String),

    #[error("missing configuration: {0}")]
    Config(String),

    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

impl Error {
    /// True when the attestation backend reported the session as absent,
    /// expired, or rejected. This is the only failure kind worth a
    /// re-initialize-then-retry cycle; everything else propagates as-is.
    pub fn is_session(&self) -> bool {
        matches!(self, Error::Session(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
