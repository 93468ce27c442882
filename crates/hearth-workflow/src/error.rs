//! Errors raised while assembling or running the workflow engine.

use thiserror::Error;

/// Result type aliased over [`WorkflowError`].
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors surfaced by `hearth-workflow`. Node execution itself is best-effort
/// (a node's failure becomes a [`crate::state::RetrievalState`] error entry,
/// not a propagated [`WorkflowError`]); this type covers engine construction
/// and anything that should abort a run outright.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Propagated from `hearth-context`.
    #[error(transparent)]
    Context(#[from] hearth_context::ContextError),

    /// Propagated from `hearth-memory`.
    #[error(transparent)]
    Memory(#[from] hearth_memory::MemoryError),

    /// Propagated from `hearth-rag`.
    #[error(transparent)]
    Rag(#[from] hearth_rag::RagError),

    /// Propagated from `hearth-core`.
    #[error(transparent)]
    Core(#[from] hearth_core::CoreError),

    /// Catch-all.
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}
