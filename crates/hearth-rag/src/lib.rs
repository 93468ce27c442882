//! Embedding, cross-encoder and store adapters for the retrieval pipeline
//! (C2-C4, `spec.md §4.5`, §4.7, §4.8, §6.2).

pub mod cross_encoder;
pub mod embeddings;
pub mod error;
pub mod live_state;
pub mod store;

pub use cross_encoder::{CachedCrossEncoder, CrossEncoder, ScoringModel};
pub use embeddings::{EmbeddingBackendKind, EmbeddingKind, EmbeddingProvider, LocalEmbeddingProvider};
pub use error::{RagError, Result};
pub use live_state::{CachedLiveState, LiveStateService};
pub use store::{GraphStore, InMemoryStore, LexicalHit, LexicalStore, VectorHit, VectorStore};
