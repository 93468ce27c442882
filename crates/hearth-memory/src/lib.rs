//! Conversation memory, background enrichment and the synchronous quick
//! analyzer (C10/C11, `spec.md §4.6`).

pub mod enricher;
pub mod error;
pub mod quick_analyzer;
pub mod store;
pub mod types;

pub use enricher::{build_request, fuse_with_cached_enrichment, AsyncEnricher, EnrichmentLlmClient, EnrichmentRequest};
pub use error::{MemoryError, Result};
pub use quick_analyzer::QuickPatternAnalyzer;
pub use store::{ConversationMemoryStore, InMemoryConversationMemoryStore, TurnEntity};
pub use types::{ConversationMemory, EnrichedContext, Language, MemoryEntity, QueryType, QuickContext};
