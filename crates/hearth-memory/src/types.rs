//! Conversation memory and enrichment types (C10/C11, `spec.md §4.6`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An entity's remembered relevance within a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntity {
    /// The remembered entity.
    pub entity_id: String,
    /// Domain, if known at store time.
    pub domain: Option<String>,
    /// Area, if known at store time.
    pub area: Option<String>,
    /// Exponential-moving-average relevance from recent turns, used to order
    /// [`crate::store::ConversationMemoryStore::get_relevant`] results.
    pub relevance_score: f32,
    /// Cumulative reinforcement from repeated mentions; never below `0.0`.
    /// Crosses `1.5` once an entity has been brought up enough times to
    /// warrant synthesizing it into the candidate set even when this turn's
    /// retrieval missed it (`spec.md §4.6` step 3).
    pub memory_relevance: f32,
    /// Monotonically-increasing boost applied at rerank time; never below `1.0`.
    pub boost_weight: f32,
    /// Last turn this entity was seen/reinforced.
    pub last_seen: DateTime<Utc>,
}

/// Per-session memory record (`spec.md §4.6` schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMemory {
    /// Session this memory belongs to.
    pub session_id: String,
    /// Remembered entities, keyed by `entity_id`.
    pub entities: HashMap<String, MemoryEntity>,
    /// Areas mentioned across the session so far.
    pub areas_mentioned: HashSet<String>,
    /// Domains mentioned across the session so far.
    pub domains_mentioned: HashSet<String>,
    /// Cached LLM-produced enrichment, if one has completed.
    pub summary: Option<EnrichedContext>,
    /// Last time this record was written.
    pub updated_at: DateTime<Utc>,
}

impl ConversationMemory {
    /// An empty record for a brand-new session.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entities: HashMap::new(),
            areas_mentioned: HashSet::new(),
            domains_mentioned: HashSet::new(),
            summary: None,
            updated_at: Utc::now(),
        }
    }
}

/// Background-LLM-produced per-session meta-information (`spec.md` Glossary).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedContext {
    /// Session this enrichment was produced for.
    pub session_id: String,
    /// Domains the enricher believes are relevant.
    pub detected_domains: HashSet<String>,
    /// Areas the enricher believes are relevant.
    pub detected_areas: HashSet<String>,
    /// Per-entity boost weights the enricher suggests.
    pub entity_boost_weights: HashMap<String, f32>,
    /// Follow-up utterances the enricher expects next.
    pub expected_followups: Vec<String>,
    /// Confidence in this enrichment, `0.3` for the timeout/error fallback.
    pub confidence: f32,
    /// When this enrichment was produced.
    pub created_at: DateTime<Utc>,
}

/// Coarse query shape detected by the synchronous [`crate::quick_analyzer::QuickPatternAnalyzer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// "what's the state of X".
    StatusCheck,
    /// "turn on/off X".
    Control,
    /// House-wide "what's going on".
    Overview,
    /// No pattern matched strongly enough to classify.
    Unknown,
}

/// Detected utterance language, used to pick which pattern table dominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Hungarian-language utterance.
    Hungarian,
    /// English-language utterance.
    English,
}

/// Output of the `<=50ms` synchronous quick analyzer (`spec.md §4.6`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickContext {
    /// Domains matched purely from keyword tables.
    pub detected_domains: HashSet<String>,
    /// Areas matched purely from keyword tables.
    pub detected_areas: HashSet<String>,
    /// Best-effort candidate entity id fragments (e.g. `"sensor.kert"`).
    pub entity_patterns: Vec<String>,
    /// Coarse query shape.
    pub query_type: QueryType,
    /// Detected language.
    pub language: Language,
    /// Heuristic confidence in `[0, 1]`.
    pub confidence: f32,
}
