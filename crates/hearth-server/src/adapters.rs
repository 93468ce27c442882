//! Stand-in adapters for the external services `spec.md §6.2` describes as
//! optional or pluggable. None of these talk to a real backend — wiring a
//! production `ArangoDB`/LLM-gateway/live-state driver is explicitly out of
//! scope (`spec.md §1`) — but they give the engine a concrete, always-object-safe
//! collaborator to hold so a request never panics for lack of one.

use async_trait::async_trait;
use hearth_context::Turn;
use hearth_memory::{EnrichedContext, EnrichmentLlmClient, EnrichmentRequest, MemoryError};
use hearth_rag::{LiveStateService, RagError, ScoringModel};

/// A [`ScoringModel`] that always fails, so [`hearth_rag::CachedCrossEncoder`]
/// permanently falls back to its token-overlap scorer (`spec.md §7` "Resource
/// unavailable" path) when no hosted cross-encoder endpoint is configured.
pub struct NoopScoringModel;

#[async_trait]
impl ScoringModel for NoopScoringModel {
    async fn score_raw(&self, _query: &str, _document: &str) -> hearth_rag::Result<f32> {
        Err(RagError::CrossEncoder("no cross-encoder endpoint configured".to_string()))
    }
}

/// A [`LiveStateService`] with no backing controller: every entity reports no
/// current value, which the reranker treats as `unavailable` rather than as a
/// request-level failure.
pub struct NullLiveStateService;

#[async_trait]
impl LiveStateService for NullLiveStateService {
    async fn current_state(&self, _entity_id: &str) -> hearth_rag::Result<Option<hearth_core::EntityState>> {
        Ok(None)
    }

    async fn latest_time_series_sample(&self, _entity_id: &str) -> hearth_rag::Result<Option<hearth_core::EntityState>> {
        Ok(None)
    }
}

/// A [`hearth_context::RewriteLlmClient`] is intentionally never wired here:
/// [`hearth_context::QueryRewriter`] already treats `llm: None` as "use the
/// rule-based path", which is the correct behavior with no LLM gateway
/// configured (`spec.md §6.2` "LLM gateway (optional)").

/// An [`EnrichmentLlmClient`] with no backing LLM gateway configured. Every
/// call fails, which `hearth_memory::AsyncEnricher` already treats as
/// "fire-and-forget enrichment didn't complete this turn" — never a
/// request-level failure (`spec.md §9` "Fire-and-forget background work").
pub struct NullEnrichmentLlmClient;

#[async_trait]
impl EnrichmentLlmClient for NullEnrichmentLlmClient {
    async fn enrich(&self, _request: &EnrichmentRequest) -> hearth_memory::Result<EnrichedContext> {
        Err(MemoryError::Enrichment("no enrichment LLM gateway configured".to_string()))
    }
}

/// A [`hearth_context::RewriteLlmClient`] placeholder kept for symmetry with
/// the other null adapters and for tests that want an explicit "LLM present
/// but always errors" double, distinct from passing `None`.
pub struct AlwaysFailingRewriteLlmClient;

#[async_trait]
impl hearth_context::RewriteLlmClient for AlwaysFailingRewriteLlmClient {
    async fn rewrite(&self, _current: &str, _history: &[Turn]) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("no rewrite LLM gateway configured"))
    }
}
