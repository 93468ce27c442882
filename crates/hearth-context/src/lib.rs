//! Conversation analysis, query rewriting, scope detection, hybrid retrieval,
//! memory boosting, reranking, prompt formatting and diagnostics — the
//! conversation-aware layer sitting on top of `hearth-rag` and `hearth-memory`
//! (`spec.md §4`).

pub mod analyzer;
pub mod diagnostics;
pub mod error;
pub mod formatter;
pub mod memory_boost;
pub mod reranker;
pub mod retrieval;
pub mod rewriter;
pub mod scope;
pub mod types;

pub use analyzer::{ConversationAnalyzer, Turn};
pub use diagnostics::{evaluate as evaluate_diagnostics, Diagnostics};
pub use error::{ContextError, Result};
pub use formatter::{clean_name, PromptFormatter};
pub use memory_boost::apply_memory_boost;
pub use reranker::{LiveStateLookup, Reranker};
pub use retrieval::{cluster_types_for_scope, ClusterIndex, ExpandedMember, GraphClusterIndex, HybridRetriever};
pub use rewriter::{QueryRewriter, RewriteLlmClient};
pub use scope::ScopeDetector;
pub use types::{
    BoostFactors, Candidate, ConversationContext, FormatterStrategy, RankedContext, RewriteMethod, RewriteResult, ScopeDecision,
};
