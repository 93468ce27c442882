//! Errors raised by the conversation memory store and async enricher.

use thiserror::Error;

/// Result type aliased over [`MemoryError`].
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors surfaced by `hearth-memory` (`spec.md §4.6`).
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The enrichment LLM call failed or timed out.
    #[error("enrichment call failed: {0}")]
    Enrichment(String),

    /// A memory-store operation failed (should not happen for the in-memory
    /// backend; kept for parity with a persistent implementation).
    #[error("memory store error: {0}")]
    Store(String),

    /// Catch-all.
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}
