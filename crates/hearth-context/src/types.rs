//! Shared types threaded between the conversation-analysis, rewrite, scope,
//! retrieval, rerank and formatting stages (`spec.md §4`).

use hearth_core::{Entity, Intent, Scope};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Output of the conversation analyzer (C5, `spec.md §4.2`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConversationContext {
    /// Areas mentioned or inherited this turn.
    pub areas_mentioned: HashSet<String>,
    /// Domains mentioned this turn.
    pub domains_mentioned: HashSet<String>,
    /// Device classes mentioned this turn.
    pub device_classes_mentioned: HashSet<String>,
    /// Entity ids surfaced in recent system turns.
    pub previous_entities: HashSet<String>,
    /// Whether this utterance is a coreferential follow-up.
    pub is_follow_up: bool,
    /// Control vs. read intent.
    pub intent: Intent,
    /// Heuristic confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Per-area/domain/device-class multipliers the analyzer exposes to the
/// reranker (`spec.md §4.2` "Boost factors exposed by the analyzer").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoostFactors {
    /// Area name (or the generic house area) → multiplier.
    pub area_boosts: HashMap<String, f32>,
    /// Domain name → multiplier.
    pub domain_boosts: HashMap<String, f32>,
    /// Device class → multiplier.
    pub device_class_boosts: HashMap<String, f32>,
}

/// How a query was turned into a standalone retrieval query (C6, `spec.md §4.3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMethod {
    /// Rewritten by the LLM path.
    Llm,
    /// Rewritten by the rule-based path.
    RuleBased,
    /// No rewrite was needed (trigger conditions not met).
    NoRewriteNeeded,
    /// Rewriting is disabled by configuration.
    Disabled,
    /// Rewriting was attempted and failed.
    Error,
}

/// Result of the query rewriter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteResult {
    /// The original utterance.
    pub original: String,
    /// The standalone query to retrieve with.
    pub rewritten: String,
    /// Confidence per `spec.md §4.3`.
    pub confidence: f32,
    /// Which path produced `rewritten`.
    pub method: RewriteMethod,
    /// Coreferences the rewrite resolved (e.g. `"ott" -> "kert"`).
    pub coreferences_resolved: Vec<String>,
    /// Intent inherited from the previous turn, if any.
    pub intent_inherited: Option<Intent>,
    /// Wall-clock time spent rewriting.
    pub processing_time_ms: u64,
}

/// Which prompt-formatting strategy to use (C13, `spec.md §4.9`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatterStrategy {
    /// Single-line pipe-separated list.
    Compact,
    /// Sectioned by area.
    GroupedByArea,
    /// Detailed list plus a `TL;DR:` summary line.
    Tldr,
    /// Primary/Secondary/Previous sections.
    Hierarchical,
    /// Two sections plus an areas footer (default).
    Detailed,
}

/// Output of the scope detector (C7, `spec.md §4.4`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeDecision {
    /// The detected retrieval width.
    pub scope: Scope,
    /// How many candidates to retrieve.
    pub k: usize,
    /// Confidence in `[0, 1]`.
    pub scope_confidence: f32,
    /// Which rule fired, for diagnostics/tracing.
    pub scope_reasoning: String,
    /// A formatter the detector strongly prefers, if any (e.g. climate-cluster cues).
    pub preferred_formatter: Option<FormatterStrategy>,
}

/// A single retrieval candidate flowing through C8/C9/C10/C12.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// The candidate entity.
    pub entity: Entity,
    /// Running score, mutated by each stage.
    pub score: f32,
    /// Cluster this candidate was surfaced through, if cluster-first.
    pub cluster_context: Option<String>,
    /// Set once the memory boost (C10) has been applied.
    pub memory_boosted: bool,
    /// The multiplicative memory boost applied, if any.
    pub memory_boost: Option<f32>,
    /// The memory relevance signal behind the boost, if any.
    pub memory_relevance: Option<f32>,
    /// True if this candidate did not come from retrieval but was synthesized
    /// from a memory entity with high relevance (`spec.md §4.6` step 3).
    pub synthetic_from_memory: bool,
    /// Final rerank score once C12 has run.
    pub final_score: Option<f32>,
    /// Whether C12 found a current live value for this (sensor) candidate.
    pub has_active_value: bool,
    /// Whether C12 found this (sensor) candidate to have no current value.
    pub unavailable: bool,
}

impl Candidate {
    /// Wrap a freshly retrieved entity at a given base score.
    #[must_use]
    pub fn from_entity(entity: Entity, score: f32) -> Self {
        Self {
            entity,
            score,
            cluster_context: None,
            memory_boosted: false,
            memory_boost: None,
            memory_relevance: None,
            synthetic_from_memory: false,
            final_score: None,
            has_active_value: false,
            unavailable: false,
        }
    }
}

/// The primary/related split and chosen formatter produced by C12/C13.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedContext {
    /// High-relevance candidates, hierarchical-primary tier.
    pub primary: Vec<Candidate>,
    /// Supporting candidates.
    pub related: Vec<Candidate>,
    /// The formatter strategy used.
    pub formatter_type: FormatterStrategy,
    /// The rendered prompt context.
    pub formatted_context: String,
}
