//! Error taxonomy for the ingest/query service.
//!
//! Every failure a caller can observe maps onto one of four variants. LLM
//! failures are absent: the service recovers from them locally
//! (see [`crate::llm::LlmError`]).

use thiserror::Error;

/// Boxed source error carried by [`Error::Storage`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing input; surfaced to HTTP callers as `400`.
    #[error("{0}")]
    Validation(String),
    /// Missing credential, unavailable model, or an index built with a
    /// different embedding model.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The persistent store failed; the request is aborted with no partial writes.
    #[error("storage error: {0}")]
    Storage(#[source] BoxError),
    /// The embedding backend failed or returned a malformed vector.
    #[error("embedding error: {0}")]
    Embedding(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        Self::Storage(err.into())
    }

    pub(crate) fn embedding(err: anyhow::Error) -> Self {
        Self::Embedding(format!("{:#}", err))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
