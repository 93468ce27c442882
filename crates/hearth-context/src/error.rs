//! Errors raised by conversation analysis, rewriting, scope detection,
//! retrieval, reranking and formatting.

use thiserror::Error;

/// Result type aliased over [`ContextError`].
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors surfaced by `hearth-context` (`spec.md §7`'s taxonomy, typed instead
/// of string-matched — see `DESIGN.md` open-question (c)).
#[derive(Error, Debug)]
pub enum ContextError {
    /// The query rewriter's LLM call failed or timed out.
    #[error("rewrite failed: {0}")]
    Rewrite(String),

    /// Scope detection could not classify the utterance.
    #[error("scope detection failed: {0}")]
    ScopeDetection(String),

    /// Entity retrieval failed against the underlying stores.
    #[error("entity retrieval failed: {0}")]
    Retrieval(String),

    /// Prompt formatting failed.
    #[error("formatting failed: {0}")]
    Formatting(String),

    /// Propagated from `hearth-rag`.
    #[error(transparent)]
    Rag(#[from] hearth_rag::RagError),

    /// Propagated from `hearth-memory`.
    #[error("memory error: {0}")]
    Memory(String),

    /// Catch-all.
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<hearth_memory::MemoryError> for ContextError {
    fn from(err: hearth_memory::MemoryError) -> Self {
        Self::Memory(err.to_string())
    }
}
