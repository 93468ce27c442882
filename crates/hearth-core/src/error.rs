//! Shared error taxonomy for the Hearth RAG bridge.
//!
//! Every crate in the workspace composes its own, more specific error enum on top
//! of [`CoreError`] via `#[from]`, the same way `llmspell-context::error::ContextError`
//! wraps its collaborators' errors.

use thiserror::Error;

/// Result type aliased over [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by shared domain logic (entity/cluster validation, health checks).
#[derive(Error, Debug)]
pub enum CoreError {
    /// The configured embedding dimension does not match the persisted vector index.
    #[error("embedding dimension mismatch: configured {configured}, index has {indexed}")]
    DimensionMismatch {
        /// Dimension from process configuration.
        configured: usize,
        /// Dimension reported by the vector index.
        indexed: usize,
    },

    /// A cluster membership referenced an `entity_id` that does not exist.
    #[error("cluster '{cluster_key}' references unknown entity '{entity_id}'")]
    UnknownEntityReference {
        /// Cluster key that held the dangling reference.
        cluster_key: String,
        /// The missing entity id.
        entity_id: String,
    },

    /// Generic validation failure for a domain record.
    #[error("invalid domain record: {0}")]
    Validation(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for error sources outside the taxonomy above.
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}
