//! Errors raised by the embedding, cross-encoder and store adapters.

use thiserror::Error;

/// Result type aliased over [`RagError`].
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors surfaced by the pluggable external-service adapters (`spec.md §6.2`).
#[derive(Error, Debug)]
pub enum RagError {
    /// The embedding backend failed to respond or returned malformed output.
    #[error("embedding backend error: {0}")]
    Embedding(String),

    /// The cross-encoder model failed to load or score.
    #[error("cross-encoder error: {0}")]
    CrossEncoder(String),

    /// A vector/lexical/graph store query failed.
    #[error("store error: {0}")]
    Store(String),

    /// The live-state (or time-series) service is unavailable for an entity.
    #[error("live state unavailable for '{0}'")]
    StateUnavailable(String),

    /// A call exceeded its configured deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Propagated from an HTTP client.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Catch-all.
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<hearth_core::CoreError> for RagError {
    fn from(err: hearth_core::CoreError) -> Self {
        Self::Other(anyhow::anyhow!(err))
    }
}
