//! Node identifiers and the patch each node hands back to the engine
//! (`spec.md §4.1`: "each node is a pure function `State → StatePatch`").

use hearth_context::{BoostFactors, Candidate, ConversationContext, Diagnostics, FormatterStrategy, RewriteResult};
use hearth_core::Scope;
use hearth_memory::MemoryEntity;

use crate::state::{ErrorCategory, RetrievalState};

/// Every node in the workflow graph, including the branching recovery nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeName {
    ConversationAnalysis,
    FallbackAnalysis,
    ScopeDetection,
    RetryScopeDetection,
    FallbackScopeDetection,
    EntityRetrieval,
    RetryEntityRetrieval,
    FallbackEntityRetrieval,
    ContinueWithoutMemory,
    ContextFormatting,
    RetryFormatting,
    EmergencyFormatting,
    Diagnostics,
    MemoryCleanup,
    End,
}

impl NodeName {
    /// Stable name used for tracing and `fallback_used` entries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConversationAnalysis => "conversation_analysis",
            Self::FallbackAnalysis => "fallback_analysis",
            Self::ScopeDetection => "scope_detection",
            Self::RetryScopeDetection => "retry_scope_detection",
            Self::FallbackScopeDetection => "fallback_scope_detection",
            Self::EntityRetrieval => "entity_retrieval",
            Self::RetryEntityRetrieval => "retry_entity_retrieval",
            Self::FallbackEntityRetrieval => "fallback_entity_retrieval",
            Self::ContinueWithoutMemory => "continue_without_memory",
            Self::ContextFormatting => "context_formatting",
            Self::RetryFormatting => "retry_formatting",
            Self::EmergencyFormatting => "emergency_formatting",
            Self::Diagnostics => "diagnostics",
            Self::MemoryCleanup => "memory_cleanup",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a node changed. Fields are `Some`/non-empty only where the node
/// produced a new value; [`StatePatch::merge_into`] leaves everything else
/// untouched.
#[derive(Debug, Default, Clone)]
pub struct StatePatch {
    pub conversation_context: Option<ConversationContext>,
    pub boost_factors: Option<BoostFactors>,
    pub rewritten_query: Option<String>,
    pub rewrite_info: Option<RewriteResult>,
    pub detected_scope: Option<Scope>,
    pub scope_confidence: Option<f32>,
    pub optimal_k: Option<usize>,
    pub scope_reasoning: Option<String>,
    pub preferred_formatter: Option<FormatterStrategy>,
    pub retrieved_entities: Option<Vec<Candidate>>,
    pub cluster_entities: Option<Vec<Candidate>>,
    pub memory_entities: Option<Vec<MemoryEntity>>,
    pub memory_fetch_failed: Option<bool>,
    pub primary: Option<Vec<Candidate>>,
    pub related: Option<Vec<Candidate>>,
    pub formatter_type: Option<FormatterStrategy>,
    pub formatted_context: Option<String>,
    pub diagnostics: Option<Diagnostics>,
    /// New error entries to append.
    pub push_errors: Vec<(ErrorCategory, String)>,
    /// Categories to drop from `state.errors` before appending `push_errors`.
    pub clear_error_categories: Vec<ErrorCategory>,
    /// Absolute `retry_count` to set, if this node advanced it.
    pub retry_count: Option<u32>,
    /// A fallback node name to record as having fired.
    pub fallback_used: Option<String>,
}

impl StatePatch {
    /// How many candidates this patch leaves in play, used for trace
    /// `out_count`; falls back to `state`'s current count when the node
    /// didn't touch `retrieved_entities`.
    #[must_use]
    pub fn out_count(&self, state: &RetrievalState) -> usize {
        self.retrieved_entities.as_ref().map_or(state.retrieved_entities.len(), Vec::len)
    }

    /// Apply this patch to `state` in place.
    pub fn merge_into(self, state: &mut RetrievalState) {
        if let Some(v) = self.conversation_context {
            state.conversation_context = Some(v);
        }
        if let Some(v) = self.boost_factors {
            state.boost_factors = Some(v);
        }
        if let Some(v) = self.rewritten_query {
            state.rewritten_query = Some(v);
        }
        if let Some(v) = self.rewrite_info {
            state.rewrite_info = Some(v);
        }
        if let Some(v) = self.detected_scope {
            state.detected_scope = Some(v);
        }
        if let Some(v) = self.scope_confidence {
            state.scope_confidence = Some(v);
        }
        if let Some(v) = self.optimal_k {
            state.optimal_k = Some(v);
        }
        if let Some(v) = self.scope_reasoning {
            state.scope_reasoning = Some(v);
        }
        if self.preferred_formatter.is_some() {
            state.preferred_formatter = self.preferred_formatter;
        }
        if let Some(v) = self.retrieved_entities {
            state.retrieved_entities = v;
        }
        if let Some(v) = self.cluster_entities {
            state.cluster_entities = v;
        }
        if let Some(v) = self.memory_entities {
            state.memory_entities = v;
        }
        if let Some(v) = self.memory_fetch_failed {
            state.memory_fetch_failed = v;
        }
        if let Some(v) = self.primary {
            state.primary = v;
        }
        if let Some(v) = self.related {
            state.related = v;
        }
        if let Some(v) = self.formatter_type {
            state.formatter_type = Some(v);
        }
        if let Some(v) = self.formatted_context {
            state.formatted_context = v;
        }
        if let Some(v) = self.diagnostics {
            state.diagnostics = Some(v);
        }

        for category in self.clear_error_categories {
            state.errors.retain(|(c, _)| *c != category);
        }
        state.errors.extend(self.push_errors);

        if let Some(v) = self.retry_count {
            state.retry_count = v;
        }
        if let Some(name) = self.fallback_used {
            state.fallback_used.push(name);
        }
    }
}
