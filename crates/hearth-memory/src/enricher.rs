//! Background LLM enrichment (C11, `spec.md §4.6`).
//!
//! One task per session, coalesced: a trigger for a session that already has a
//! task in flight is dropped. Modeled on the teacher's `ConsolidationDaemon`
//! shutdown-via-watch-channel shape, specialized to per-session fire-and-forget
//! work instead of a single periodic loop.

use crate::error::{MemoryError, Result};
use crate::quick_analyzer::QuickPatternAnalyzer;
use crate::store::{ConversationMemoryStore, TurnEntity};
use crate::types::{EnrichedContext, QuickContext};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Everything the enricher's LLM call needs.
#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    /// Session this enrichment is for.
    pub session_id: String,
    /// The rewritten (standalone) query for this turn.
    pub rewritten_query: String,
    /// Prior turns, most recent last, as `(role, content)` pairs.
    pub history: Vec<(String, String)>,
    /// Entity ids of the top-10 candidates retrieved this turn.
    pub retrieved_top10: Vec<String>,
    /// The synchronous quick analysis for this turn, used both as enricher
    /// input and as the fallback-synthesis source on failure.
    pub quick_context: QuickContext,
}

/// Pluggable LLM backend for enrichment calls.
#[async_trait]
pub trait EnrichmentLlmClient: Send + Sync {
    /// Produce an [`EnrichedContext`] for `request`. Implementations must tag
    /// the outbound call `internal_call=true` so an LLM gateway hook does not
    /// recurse back into this pipeline.
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichedContext>;
}

#[async_trait]
impl EnrichmentLlmClient for Arc<dyn EnrichmentLlmClient> {
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichedContext> {
        self.as_ref().enrich(request).await
    }
}

fn fallback_context(request: &EnrichmentRequest) -> EnrichedContext {
    EnrichedContext {
        session_id: request.session_id.clone(),
        detected_domains: request.quick_context.detected_domains.clone(),
        detected_areas: request.quick_context.detected_areas.clone(),
        entity_boost_weights: HashMap::new(),
        expected_followups: Vec::new(),
        confidence: 0.3,
        created_at: Utc::now(),
    }
}

/// Runs enrichment calls on a background task per session, never awaited by
/// the request path that triggers it (invariant 6, `spec.md §8`).
pub struct AsyncEnricher<C: EnrichmentLlmClient + 'static> {
    client: Arc<C>,
    store: Arc<dyn ConversationMemoryStore>,
    in_flight: Arc<DashSet<String>>,
    deadline: Duration,
    max_retries: u32,
    summary_ttl: Duration,
    dropped_count: Arc<AtomicU32>,
}

impl<C: EnrichmentLlmClient + 'static> AsyncEnricher<C> {
    /// Build an enricher with the given per-call deadline, bounded retry count
    /// and the TTL applied to successfully (or fallback-) produced summaries.
    #[must_use]
    pub fn new(
        client: Arc<C>,
        store: Arc<dyn ConversationMemoryStore>,
        deadline: Duration,
        max_retries: u32,
        summary_ttl: Duration,
    ) -> Self {
        Self {
            client,
            store,
            in_flight: Arc::new(DashSet::new()),
            deadline,
            max_retries,
            summary_ttl,
            dropped_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// How many triggers were dropped because a task for that session was
    /// already in flight. Exposed for diagnostics/metrics, not correctness.
    #[must_use]
    pub fn dropped_count(&self) -> u32 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Enqueue enrichment for `request.session_id`. Returns immediately; the
    /// work (and its fallback) runs on a spawned task.
    pub fn trigger(&self, request: EnrichmentRequest) {
        if !self.in_flight.insert(request.session_id.clone()) {
            self.dropped_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session = %request.session_id, "enrichment already in flight, dropping trigger");
            return;
        }

        let client = Arc::clone(&self.client);
        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.in_flight);
        let deadline = self.deadline;
        let max_retries = self.max_retries;
        let summary_ttl = self.summary_ttl;
        let session_id = request.session_id.clone();

        tokio::spawn(async move {
            let enriched = run_with_retries(&*client, &request, deadline, max_retries).await;
            let context = enriched.unwrap_or_else(|err| {
                tracing::warn!(session = %session_id, error = %err, "enrichment failed, using fallback");
                fallback_context(&request)
            });
            if let Err(err) = store.store_summary(&session_id, context, summary_ttl).await {
                tracing::warn!(session = %session_id, error = %err, "failed to cache enrichment summary");
            }
            in_flight.remove(&session_id);
        });
    }
}

async fn run_with_retries<C: EnrichmentLlmClient>(
    client: &C,
    request: &EnrichmentRequest,
    deadline: Duration,
    max_retries: u32,
) -> Result<EnrichedContext> {
    let mut last_error = MemoryError::Enrichment("no attempts made".to_string());
    for attempt in 0..=max_retries {
        match tokio::time::timeout(deadline, client.enrich(request)).await {
            Ok(Ok(context)) => return Ok(context),
            Ok(Err(err)) => {
                tracing::debug!(attempt, error = %err, "enrichment attempt failed");
                last_error = err;
            }
            Err(_) => {
                tracing::debug!(attempt, "enrichment attempt timed out");
                last_error = MemoryError::Enrichment("deadline exceeded".to_string());
            }
        }
    }
    Err(last_error)
}

/// Fuses a session's cached [`EnrichedContext`] (if any, and not expired) with
/// this turn's [`QuickContext`]: union of domains/areas, plus the cached boost
/// weights and expected follow-ups (`spec.md §4.6`).
#[must_use]
pub fn fuse_with_cached_enrichment(
    quick: &QuickContext,
    cached: Option<&EnrichedContext>,
) -> (HashSet<String>, HashSet<String>, HashMap<String, f32>, Vec<String>) {
    let mut domains = quick.detected_domains.clone();
    let mut areas = quick.detected_areas.clone();
    let mut boosts = HashMap::new();
    let mut followups = Vec::new();
    if let Some(enriched) = cached {
        domains.extend(enriched.detected_domains.iter().cloned());
        areas.extend(enriched.detected_areas.iter().cloned());
        boosts.clone_from(&enriched.entity_boost_weights);
        followups.clone_from(&enriched.expected_followups);
    }
    (domains, areas, boosts, followups)
}

/// Convenience: run the [`QuickPatternAnalyzer`] then build an [`EnrichmentRequest`].
#[must_use]
pub fn build_request(
    session_id: impl Into<String>,
    rewritten_query: impl Into<String>,
    history: Vec<(String, String)>,
    retrieved_top10: Vec<String>,
    utterance: &str,
) -> EnrichmentRequest {
    let quick_context = QuickPatternAnalyzer.analyze(utterance);
    EnrichmentRequest {
        session_id: session_id.into(),
        rewritten_query: rewritten_query.into(),
        history,
        retrieved_top10,
        quick_context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryConversationMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct AlwaysFailsClient {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EnrichmentLlmClient for AlwaysFailsClient {
        async fn enrich(&self, _request: &EnrichmentRequest) -> Result<EnrichedContext> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Err(MemoryError::Enrichment("model unavailable".to_string()))
        }
    }

    struct SucceedsClient;

    #[async_trait]
    impl EnrichmentLlmClient for SucceedsClient {
        async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichedContext> {
            Ok(EnrichedContext {
                session_id: request.session_id.clone(),
                detected_domains: HashSet::from(["sensor".to_string()]),
                detected_areas: HashSet::new(),
                entity_boost_weights: HashMap::new(),
                expected_followups: vec!["kert".to_string()],
                confidence: 0.9,
                created_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn failed_enrichment_falls_back_and_still_stores_a_summary() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = Arc::new(AlwaysFailsClient { calls: calls.clone() });
        let store: Arc<dyn ConversationMemoryStore> =
            Arc::new(InMemoryConversationMemoryStore::new(Duration::from_secs(1800)));
        let enricher = AsyncEnricher::new(client, store.clone(), Duration::from_millis(50), 1, Duration::from_secs(60));

        let request = build_request("s1", "kert nedvesség", vec![], vec![], "mekkora a nedvesség a kertben");
        enricher.trigger(request);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let summary = store.get_summary("s1").await.unwrap().unwrap();
        assert!((summary.confidence - 0.3).abs() < f32::EPSILON);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn successful_enrichment_is_cached_verbatim() {
        let client = Arc::new(SucceedsClient);
        let store: Arc<dyn ConversationMemoryStore> =
            Arc::new(InMemoryConversationMemoryStore::new(Duration::from_secs(1800)));
        let enricher = AsyncEnricher::new(client, store.clone(), Duration::from_millis(200), 1, Duration::from_secs(60));

        let request = build_request("s1", "kert nedvesség", vec![], vec![], "mekkora a nedvesség a kertben");
        enricher.trigger(request);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let summary = store.get_summary("s1").await.unwrap().unwrap();
        assert!((summary.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn second_trigger_for_in_flight_session_is_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = Arc::new(AlwaysFailsClient { calls: calls.clone() });
        let store: Arc<dyn ConversationMemoryStore> =
            Arc::new(InMemoryConversationMemoryStore::new(Duration::from_secs(1800)));
        let enricher = AsyncEnricher::new(client, store, Duration::from_millis(100), 0, Duration::from_secs(60));

        enricher.trigger(build_request("s1", "q", vec![], vec![], "mekkora a nedvesség a kertben"));
        enricher.trigger(build_request("s1", "q", vec![], vec![], "mekkora a nedvesség a kertben"));
        assert_eq!(enricher.dropped_count(), 1);
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    #[test]
    fn fuse_unions_domains_and_areas_and_carries_cached_boosts() {
        let quick = QuickContext {
            detected_domains: HashSet::from(["light".to_string()]),
            detected_areas: HashSet::from(["kert".to_string()]),
            entity_patterns: vec![],
            query_type: crate::types::QueryType::StatusCheck,
            language: crate::types::Language::Hungarian,
            confidence: 0.5,
        };
        let cached = EnrichedContext {
            session_id: "s1".to_string(),
            detected_domains: HashSet::from(["sensor".to_string()]),
            detected_areas: HashSet::new(),
            entity_boost_weights: HashMap::from([("sensor.kert_humidity".to_string(), 1.4)]),
            expected_followups: vec!["nappali".to_string()],
            confidence: 0.8,
            created_at: Utc::now(),
        };
        let (domains, areas, boosts, followups) = fuse_with_cached_enrichment(&quick, Some(&cached));
        assert!(domains.contains("light") && domains.contains("sensor"));
        assert!(areas.contains("kert"));
        assert_eq!(boosts.get("sensor.kert_humidity"), Some(&1.4));
        assert_eq!(followups, vec!["nappali".to_string()]);
    }
}
