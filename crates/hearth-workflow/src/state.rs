//! The typed state threaded through the retrieval workflow (`spec.md §4.1`).

use hearth_context::{
    BoostFactors, Candidate, ConversationContext, Diagnostics, FormatterStrategy, RewriteResult, Turn,
};
use hearth_core::Scope;
use hearth_memory::MemoryEntity;

use crate::trace::PipelineStage;

/// Which pipeline stage an error entry in [`RetrievalState::errors`] belongs to,
/// used by the routing table to decide retry/fallback without string-matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raised by the conversation-analysis node.
    Analysis,
    /// Raised by the scope-detection node.
    ScopeDetection,
    /// Raised by the entity-retrieval node.
    EntityRetrieval,
    /// Raised by the context-formatting node.
    Formatting,
}

/// The state every node reads from and contributes a [`crate::node::StatePatch`]
/// to, following the field groups in `spec.md §4.1`.
#[derive(Debug, Clone)]
pub struct RetrievalState {
    // Input.
    pub user_query: String,
    pub session_id: String,
    pub conversation_history: Vec<Turn>,

    // C5 output.
    pub conversation_context: Option<ConversationContext>,
    /// Exposed by C5 for C12; not named in the field list but required to
    /// carry the boost multipliers from analysis through to reranking.
    pub boost_factors: Option<BoostFactors>,

    // C6 output.
    pub rewritten_query: Option<String>,
    pub rewrite_info: Option<RewriteResult>,

    // C7 output.
    pub detected_scope: Option<Scope>,
    pub scope_confidence: Option<f32>,
    pub optimal_k: Option<usize>,
    pub scope_reasoning: Option<String>,
    /// A formatter the scope detector strongly prefers (e.g. climate-cluster cues).
    pub preferred_formatter: Option<FormatterStrategy>,

    // C9/C10 output.
    pub retrieved_entities: Vec<Candidate>,
    pub cluster_entities: Vec<Candidate>,
    pub memory_entities: Vec<MemoryEntity>,
    /// Set when loading conversation memory failed this turn; routes to
    /// `continue_without_memory` rather than treating it as a retrieval error.
    pub memory_fetch_failed: bool,

    // C12/C13 output.
    pub primary: Vec<Candidate>,
    pub related: Vec<Candidate>,
    pub formatter_type: Option<FormatterStrategy>,
    pub formatted_context: String,

    /// C15 output, populated once the diagnostics node has run.
    pub diagnostics: Option<Diagnostics>,

    // Control.
    pub errors: Vec<(ErrorCategory, String)>,
    pub retry_count: u32,
    pub fallback_used: Vec<String>,

    // Tracing.
    pub trace_id: String,
    pub stage_events: Vec<PipelineStage>,
}

impl RetrievalState {
    /// Start a fresh run for one request.
    #[must_use]
    pub fn new(user_query: String, session_id: String, conversation_history: Vec<Turn>, trace_id: String) -> Self {
        Self {
            user_query,
            session_id,
            conversation_history,
            conversation_context: None,
            boost_factors: None,
            rewritten_query: None,
            rewrite_info: None,
            detected_scope: None,
            scope_confidence: None,
            optimal_k: None,
            scope_reasoning: None,
            preferred_formatter: None,
            retrieved_entities: Vec::new(),
            cluster_entities: Vec::new(),
            memory_entities: Vec::new(),
            memory_fetch_failed: false,
            primary: Vec::new(),
            related: Vec::new(),
            formatter_type: None,
            formatted_context: String::new(),
            diagnostics: None,
            errors: Vec::new(),
            retry_count: 0,
            fallback_used: Vec::new(),
            trace_id,
            stage_events: Vec::new(),
        }
    }

    /// Whether an unresolved error of `category` is currently recorded.
    #[must_use]
    pub fn has_error(&self, category: ErrorCategory) -> bool {
        self.errors.iter().any(|(c, _)| *c == category)
    }
}
