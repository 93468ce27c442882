//! The retrieval workflow engine (`spec.md §4.1`): a small graph of nodes over
//! [`RetrievalState`], each a pure function merged back into the state by the
//! engine, traced end to end and retryable per the routing table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hearth_context::{
    apply_memory_boost, clean_name, cluster_types_for_scope, evaluate_diagnostics, Candidate, ClusterIndex,
    ConversationAnalyzer, FormatterStrategy, HybridRetriever, LiveStateLookup, PromptFormatter, QueryRewriter,
    RankedContext, Reranker, RewriteLlmClient, RewriteMethod, ScopeDecision, ScopeDetector, Turn,
};
use hearth_core::Scope;
use hearth_memory::{
    build_request, fuse_with_cached_enrichment, AsyncEnricher, ConversationMemoryStore, EnrichmentLlmClient,
    QuickPatternAnalyzer,
};
use hearth_rag::{CrossEncoder, EmbeddingProvider, GraphStore, LexicalStore, VectorStore};
use uuid::Uuid;

use crate::node::{NodeName, StatePatch};
use crate::state::{ErrorCategory, RetrievalState};
use crate::trace::{PipelineStage, Tracer};

/// Every collaborator the engine's nodes call through, type-erased so
/// [`Engine`] itself stays concrete instead of carrying each collaborator's
/// generic parameter.
pub struct EngineDeps {
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub cluster_index: Arc<dyn ClusterIndex>,
    pub vector_store: Arc<dyn VectorStore>,
    pub lexical_store: Arc<dyn LexicalStore>,
    pub graph: Arc<dyn GraphStore>,
    pub cross_encoder: Arc<dyn CrossEncoder>,
    pub live_state: Arc<dyn LiveStateLookup>,
    pub rewrite_llm: Option<Arc<dyn RewriteLlmClient>>,
    pub memory: Arc<dyn ConversationMemoryStore>,
    pub enrichment_client: Arc<dyn EnrichmentLlmClient>,
}

/// Tunables that aren't collaborators (`spec.md §6.3`).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub rewrite_deadline: Duration,
    pub enrichment_deadline: Duration,
    pub enrichment_max_retries: u32,
    pub enrichment_summary_ttl: Duration,
    pub enable_enrichment: bool,
    /// Run `memory_cleanup` every Nth query for a session (and always for test
    /// sessions), per the diagnostics routing rule.
    pub memory_cleanup_every: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rewrite_deadline: Duration::from_secs(2),
            enrichment_deadline: Duration::from_secs(3),
            enrichment_max_retries: 1,
            enrichment_summary_ttl: Duration::from_secs(15 * 60),
            enable_enrichment: true,
            memory_cleanup_every: 5,
        }
    }
}

type Retriever = HybridRetriever<Arc<dyn ClusterIndex>, Arc<dyn VectorStore>, Arc<dyn LexicalStore>, Arc<dyn GraphStore>>;
type Rerank = Reranker<Arc<dyn CrossEncoder>, Arc<dyn LiveStateLookup>>;
type Formatter = PromptFormatter<Arc<dyn LiveStateLookup>, Arc<dyn GraphStore>>;
type Rewriter = QueryRewriter<Arc<dyn RewriteLlmClient>>;
type Enricher = AsyncEnricher<Arc<dyn EnrichmentLlmClient>>;

/// Runs the full conversation-analysis → scope-detection → retrieval →
/// formatting → diagnostics graph for one request.
pub struct Engine {
    embeddings: Arc<dyn EmbeddingProvider>,
    analyzer: ConversationAnalyzer,
    rewriter: Rewriter,
    scope_detector: ScopeDetector,
    retriever: Retriever,
    reranker: Rerank,
    formatter: Formatter,
    memory: Arc<dyn ConversationMemoryStore>,
    enricher: Enricher,
    tracer: Arc<Tracer>,
    enable_enrichment: bool,
    memory_cleanup_every: u64,
    query_counter: Arc<AtomicU64>,
}

impl Engine {
    /// Wire the engine from its collaborators and tunables.
    #[must_use]
    pub fn new(deps: EngineDeps, config: EngineConfig) -> Self {
        let retriever = HybridRetriever::new(deps.cluster_index, deps.vector_store, deps.lexical_store, Arc::clone(&deps.graph));
        let rewriter = QueryRewriter::new(deps.rewrite_llm, config.rewrite_deadline);
        let reranker = Reranker::new(deps.cross_encoder, Arc::clone(&deps.live_state));
        let formatter = PromptFormatter::new(deps.live_state, deps.graph);
        let enricher = AsyncEnricher::new(
            Arc::new(deps.enrichment_client),
            Arc::clone(&deps.memory),
            config.enrichment_deadline,
            config.enrichment_max_retries,
            config.enrichment_summary_ttl,
        );

        Self {
            embeddings: deps.embeddings,
            analyzer: ConversationAnalyzer,
            rewriter,
            scope_detector: ScopeDetector,
            retriever,
            reranker,
            formatter,
            memory: deps.memory,
            enricher,
            tracer: Arc::new(Tracer::new()),
            enable_enrichment: config.enable_enrichment,
            memory_cleanup_every: config.memory_cleanup_every.max(1),
            query_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The tracer backing this engine's runs.
    #[must_use]
    pub fn tracer(&self) -> Arc<Tracer> {
        Arc::clone(&self.tracer)
    }

    /// Run one request through the full node graph to completion.
    pub async fn run(&self, user_query: String, session_id: String, conversation_history: Vec<Turn>) -> RetrievalState {
        let trace_id = Uuid::new_v4().to_string();
        let query_number = self.query_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = RetrievalState::new(user_query, session_id, conversation_history, trace_id.clone());
        let mut current = NodeName::ConversationAnalysis;

        loop {
            if current == NodeName::End {
                break;
            }

            let start = Instant::now();
            let in_count = state.retrieved_entities.len();
            let patch = self.dispatch(current, &state).await;
            let out_count = patch.out_count(&state);
            let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            let stage = PipelineStage {
                name: current.as_str().to_string(),
                stage_type: "node".to_string(),
                in_count,
                out_count,
                duration_ms,
                payload: serde_json::Value::Null,
            };
            self.tracer.record(&trace_id, stage.clone());
            state.stage_events.push(stage);

            patch.merge_into(&mut state);
            current = self.route(current, &state, query_number);
        }

        state
    }

    async fn dispatch(&self, node: NodeName, state: &RetrievalState) -> StatePatch {
        match node {
            NodeName::ConversationAnalysis => self.node_conversation_analysis(state).await,
            NodeName::FallbackAnalysis => node_fallback_analysis(),
            NodeName::ScopeDetection => self.node_scope_detection(state).await,
            NodeName::RetryScopeDetection => node_retry_scope_detection(state),
            NodeName::FallbackScopeDetection => node_fallback_scope_detection(),
            NodeName::EntityRetrieval => self.node_entity_retrieval(state).await,
            NodeName::RetryEntityRetrieval => node_retry_entity_retrieval(state),
            NodeName::FallbackEntityRetrieval => node_fallback_entity_retrieval(),
            NodeName::ContinueWithoutMemory => node_continue_without_memory(),
            NodeName::ContextFormatting => self.node_context_formatting(state).await,
            NodeName::RetryFormatting => node_retry_formatting(state),
            NodeName::EmergencyFormatting => node_emergency_formatting(state),
            NodeName::Diagnostics => node_diagnostics(state),
            NodeName::MemoryCleanup => self.node_memory_cleanup(state).await,
            NodeName::End => StatePatch::default(),
        }
    }

    fn route(&self, node: NodeName, state: &RetrievalState, query_number: u64) -> NodeName {
        match node {
            NodeName::ConversationAnalysis => {
                if state.conversation_context.as_ref().is_some_and(|c| c.confidence >= 0.5) {
                    NodeName::ScopeDetection
                } else {
                    NodeName::FallbackAnalysis
                }
            }
            NodeName::FallbackAnalysis => NodeName::ScopeDetection,
            NodeName::ScopeDetection => {
                let query = state.rewritten_query.as_deref().unwrap_or(&state.user_query);
                if is_problematic_input(query) {
                    NodeName::FallbackScopeDetection
                } else if state.has_error(ErrorCategory::ScopeDetection) && state.retry_count < 2 {
                    escape_if_exhausted(state, NodeName::RetryScopeDetection, NodeName::FallbackScopeDetection)
                } else if state.scope_confidence.unwrap_or(0.0) < 0.5 && state.retry_count < 1 {
                    escape_if_exhausted(state, NodeName::RetryScopeDetection, NodeName::FallbackScopeDetection)
                } else if state.scope_confidence.unwrap_or(1.0) < 0.3 {
                    NodeName::FallbackScopeDetection
                } else {
                    NodeName::EntityRetrieval
                }
            }
            NodeName::RetryScopeDetection | NodeName::FallbackScopeDetection => NodeName::EntityRetrieval,
            NodeName::EntityRetrieval => {
                if state.has_error(ErrorCategory::EntityRetrieval) && state.retry_count < 2 {
                    escape_if_exhausted(state, NodeName::RetryEntityRetrieval, NodeName::FallbackEntityRetrieval)
                } else if state.retrieved_entities.is_empty() && state.retry_count < 1 {
                    escape_if_exhausted(state, NodeName::RetryEntityRetrieval, NodeName::FallbackEntityRetrieval)
                } else if state.retrieved_entities.is_empty() {
                    NodeName::FallbackEntityRetrieval
                } else if state.memory_fetch_failed {
                    NodeName::ContinueWithoutMemory
                } else {
                    NodeName::ContextFormatting
                }
            }
            NodeName::RetryEntityRetrieval => NodeName::EntityRetrieval,
            NodeName::FallbackEntityRetrieval | NodeName::ContinueWithoutMemory => NodeName::ContextFormatting,
            NodeName::ContextFormatting => {
                let too_short = state.formatted_context.trim().chars().count() <= 50 || state.formatter_type.is_none();
                if too_short && state.retry_count < 1 {
                    NodeName::RetryFormatting
                } else if too_short {
                    NodeName::EmergencyFormatting
                } else {
                    NodeName::Diagnostics
                }
            }
            NodeName::RetryFormatting => NodeName::EntityRetrieval,
            NodeName::EmergencyFormatting => NodeName::Diagnostics,
            NodeName::Diagnostics => {
                if is_test_session(&state.session_id) || query_number % self.memory_cleanup_every == 0 {
                    NodeName::MemoryCleanup
                } else {
                    NodeName::End
                }
            }
            NodeName::MemoryCleanup | NodeName::End => NodeName::End,
        }
    }

    async fn node_conversation_analysis(&self, state: &RetrievalState) -> StatePatch {
        let mut patch = StatePatch::default();
        let (mut context, boost_factors) = self.analyzer.analyze(&state.user_query, &state.conversation_history);

        let quick = QuickPatternAnalyzer.analyze(&state.user_query);
        let cached_summary = match self.memory.get_summary(&state.session_id).await {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read cached enrichment summary");
                None
            }
        };
        let (domains, areas, _boosts, _followups) = fuse_with_cached_enrichment(&quick, cached_summary.as_ref());
        context.domains_mentioned.extend(domains);
        context.areas_mentioned.extend(areas);

        if context.confidence < 0.5 {
            patch
                .push_errors
                .push((ErrorCategory::Analysis, "conversation analysis confidence below threshold".to_string()));
        }
        patch.conversation_context = Some(context);
        patch.boost_factors = Some(boost_factors);
        patch
    }

    async fn node_scope_detection(&self, state: &RetrievalState) -> StatePatch {
        let mut patch = StatePatch::default();
        let rewrite = self.rewriter.rewrite(&state.user_query, &state.conversation_history).await;
        if matches!(rewrite.method, RewriteMethod::Error) {
            patch
                .push_errors
                .push((ErrorCategory::ScopeDetection, "query rewrite failed, scoping from the raw utterance".to_string()));
        }

        let context = state.conversation_context.clone().unwrap_or_default();
        let decision = self.scope_detector.detect(&rewrite.rewritten, &context);

        patch.rewritten_query = Some(rewrite.rewritten.clone());
        patch.preferred_formatter = decision.preferred_formatter;
        patch.rewrite_info = Some(rewrite);
        patch.detected_scope = Some(decision.scope);
        patch.scope_confidence = Some(decision.scope_confidence);
        patch.optimal_k = Some(decision.k);
        patch.scope_reasoning = Some(decision.scope_reasoning);
        patch
    }

    async fn node_entity_retrieval(&self, state: &RetrievalState) -> StatePatch {
        let mut patch = StatePatch::default();
        let query_text = state.rewritten_query.clone().unwrap_or_else(|| state.user_query.clone());
        let scope = state.detected_scope.unwrap_or(Scope::Macro);
        let k = state.optimal_k.unwrap_or(20);
        let climate_priority = state.scope_reasoning.as_deref().is_some_and(|r| r.contains("temperature") || r.contains("climate"));
        let cluster_types = cluster_types_for_scope(scope, climate_priority);

        let embedding = match self.embeddings.embed_query(&query_text).await {
            Ok(embedding) => embedding,
            Err(err) => {
                patch.push_errors.push((ErrorCategory::EntityRetrieval, format!("embedding failed: {err}")));
                patch.retrieved_entities = Some(Vec::new());
                return patch;
            }
        };

        let mut candidates = match self.retriever.retrieve(&embedding, &query_text, scope, &cluster_types, k, None).await {
            Ok(candidates) => candidates,
            Err(err) => {
                patch.push_errors.push((ErrorCategory::EntityRetrieval, format!("retrieval failed: {err}")));
                patch.retrieved_entities = Some(Vec::new());
                return patch;
            }
        };

        let cluster_entities: Vec<Candidate> = candidates.iter().filter(|c| c.cluster_context.is_some()).cloned().collect();

        let mut context = state.conversation_context.clone().unwrap_or_default();
        let memory = match self.memory.get_relevant(&state.session_id, 5).await {
            Ok(memory) => memory,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load conversation memory, continuing without it");
                patch.memory_fetch_failed = Some(true);
                Vec::new()
            }
        };
        apply_memory_boost(&mut candidates, &memory, &mut context);

        if self.enable_enrichment {
            let history_pairs: Vec<(String, String)> =
                state.conversation_history.iter().map(|turn| (turn.role.clone(), turn.content.clone())).collect();
            let top10: Vec<String> = candidates.iter().take(10).map(|c| c.entity.entity_id.clone()).collect();
            let request = build_request(state.session_id.clone(), query_text.clone(), history_pairs, top10, &state.user_query);
            self.enricher.trigger(request);
        }

        patch.conversation_context = Some(context);
        patch.memory_entities = Some(memory);
        patch.cluster_entities = Some(cluster_entities);
        patch.retrieved_entities = Some(candidates);
        patch
    }

    async fn node_context_formatting(&self, state: &RetrievalState) -> StatePatch {
        let mut patch = StatePatch::default();
        let context = state.conversation_context.clone().unwrap_or_default();
        let boost_factors = state.boost_factors.clone().unwrap_or_default();
        let scope = state.detected_scope.unwrap_or(Scope::Macro);
        let k = state.optimal_k.unwrap_or(20);
        let query_text = state.rewritten_query.clone().unwrap_or_else(|| state.user_query.clone());

        let (primary, related) = match self
            .reranker
            .rerank(state.retrieved_entities.clone(), &query_text, &context, &boost_factors, scope, k)
            .await
        {
            Ok(split) => split,
            Err(err) => {
                patch.push_errors.push((ErrorCategory::Formatting, format!("reranking failed: {err}")));
                (Vec::new(), Vec::new())
            }
        };

        let ranked = self.formatter.format(primary, related, scope, &context, state.preferred_formatter).await;

        patch.primary = Some(ranked.primary);
        patch.related = Some(ranked.related);
        patch.formatter_type = Some(ranked.formatter_type);
        patch.formatted_context = Some(ranked.formatted_context);
        patch
    }

    async fn node_memory_cleanup(&self, _state: &RetrievalState) -> StatePatch {
        match self.memory.cleanup_expired().await {
            Ok(removed) => tracing::info!(removed, "memory cleanup completed"),
            Err(err) => tracing::warn!(error = %err, "memory cleanup failed"),
        }
        StatePatch::default()
    }
}

fn node_fallback_analysis() -> StatePatch {
    let mut patch = StatePatch::default();
    patch.fallback_used = Some(NodeName::FallbackAnalysis.as_str().to_string());
    patch.clear_error_categories.push(ErrorCategory::Analysis);
    patch
}

fn node_retry_scope_detection(state: &RetrievalState) -> StatePatch {
    let mut patch = StatePatch::default();
    patch.clear_error_categories.push(ErrorCategory::ScopeDetection);
    patch.retry_count = Some(state.retry_count + 1);
    patch.detected_scope = Some(widen_scope(state.detected_scope.unwrap_or(Scope::Micro)));
    patch.optimal_k = Some((state.optimal_k.unwrap_or(10) * 2).min(50));
    patch.scope_confidence = Some((state.scope_confidence.unwrap_or(0.4) + 0.15).min(0.9));
    patch.scope_reasoning = Some("retry: widened scope and broadened k after low scope-detection confidence".to_string());
    patch
}

fn node_fallback_scope_detection() -> StatePatch {
    let mut patch = StatePatch::default();
    patch.fallback_used = Some(NodeName::FallbackScopeDetection.as_str().to_string());
    patch.clear_error_categories.push(ErrorCategory::ScopeDetection);
    // spec.md §8 invariant 8 / scenario 4: unclassifiable or garbage input gets a
    // narrow macro scope and low confidence, never a wide, confident guess.
    patch.detected_scope = Some(Scope::Macro);
    patch.optimal_k = Some(10);
    patch.scope_confidence = Some(0.2);
    patch.scope_reasoning = Some("fallback: defaulted to a narrow macro scope for unclassifiable input".to_string());
    patch
}

fn node_retry_entity_retrieval(state: &RetrievalState) -> StatePatch {
    let mut patch = StatePatch::default();
    patch.clear_error_categories.push(ErrorCategory::EntityRetrieval);
    patch.retry_count = Some(state.retry_count + 1);
    patch.optimal_k = Some((state.optimal_k.unwrap_or(10) * 2).min(50));
    patch.detected_scope = Some(widen_scope(state.detected_scope.unwrap_or(Scope::Micro)));
    patch
}

fn node_fallback_entity_retrieval() -> StatePatch {
    let mut patch = StatePatch::default();
    patch.fallback_used = Some(NodeName::FallbackEntityRetrieval.as_str().to_string());
    patch.clear_error_categories.push(ErrorCategory::EntityRetrieval);
    patch
}

fn node_continue_without_memory() -> StatePatch {
    let mut patch = StatePatch::default();
    patch.fallback_used = Some(NodeName::ContinueWithoutMemory.as_str().to_string());
    patch.memory_fetch_failed = Some(false);
    patch
}

fn node_retry_formatting(state: &RetrievalState) -> StatePatch {
    let mut patch = StatePatch::default();
    patch.clear_error_categories.push(ErrorCategory::Formatting);
    patch.retry_count = Some(state.retry_count + 1);
    patch.optimal_k = Some((state.optimal_k.unwrap_or(10) * 2).min(50));
    patch.detected_scope = Some(widen_scope(state.detected_scope.unwrap_or(Scope::Micro)));
    patch.preferred_formatter = Some(FormatterStrategy::Detailed);
    patch
}

fn node_emergency_formatting(state: &RetrievalState) -> StatePatch {
    let mut patch = StatePatch::default();
    patch.fallback_used = Some(NodeName::EmergencyFormatting.as_str().to_string());
    patch.clear_error_categories.push(ErrorCategory::Formatting);

    let pool: Vec<&Candidate> = state.primary.iter().chain(state.related.iter()).collect();
    let text = if pool.is_empty() {
        "Nincs elérhető releváns eszköz ehhez a kérdéshez.".to_string()
    } else {
        pool.iter().map(|c| clean_name(&c.entity)).collect::<Vec<_>>().join(", ")
    };

    patch.formatted_context = Some(text);
    patch.formatter_type = Some(FormatterStrategy::Compact);
    patch
}

fn node_diagnostics(state: &RetrievalState) -> StatePatch {
    let context = state.conversation_context.clone().unwrap_or_default();
    let scope_decision = ScopeDecision {
        scope: state.detected_scope.unwrap_or(Scope::Macro),
        k: state.optimal_k.unwrap_or(0),
        scope_confidence: state.scope_confidence.unwrap_or(0.0),
        scope_reasoning: state.scope_reasoning.clone().unwrap_or_default(),
        preferred_formatter: state.preferred_formatter,
    };
    let ranked = RankedContext {
        primary: state.primary.clone(),
        related: state.related.clone(),
        formatter_type: state.formatter_type.unwrap_or(FormatterStrategy::Detailed),
        formatted_context: state.formatted_context.clone(),
    };

    let diagnostics = evaluate_diagnostics(&context, &scope_decision, state.retrieved_entities.len(), &ranked);
    let mut patch = StatePatch::default();
    patch.diagnostics = Some(diagnostics);
    patch
}

fn widen_scope(scope: Scope) -> Scope {
    match scope {
        Scope::Micro => Scope::Macro,
        Scope::Macro | Scope::Overview => Scope::Overview,
    }
}

fn escape_if_exhausted(state: &RetrievalState, retry: NodeName, fallback: NodeName) -> NodeName {
    if state.retry_count >= 3 {
        fallback
    } else {
        retry
    }
}

const VOWELS: &str = "aeiouáéíóöőúüű";

/// A token long enough to carry meaning but with no vowel at all is treated as
/// keyboard noise. Genuinely garbage-but-vowel-bearing input (e.g. a short
/// nonsense phrase) is not caught here; it instead falls through to the
/// `scope_confidence` threshold rules in [`Engine::route`], which is what
/// `scope.rs`'s own length-heuristic fallback is for.
fn is_garbage_token(token: &str) -> bool {
    token.chars().count() >= 4 && !token.chars().any(|c| VOWELS.contains(c.to_ascii_lowercase()))
}

/// "problematic input" per the `scope_detection` routing rule: empty, too
/// short, digits-only, no letters at all, or made of keyboard-mash tokens.
fn is_problematic_input(query: &str) -> bool {
    let trimmed = query.trim();
    if trimmed.is_empty() || trimmed.chars().count() < 3 {
        return true;
    }
    if trimmed.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
        return true;
    }
    if !trimmed.chars().any(char::is_alphabetic) {
        return true;
    }
    trimmed.split_whitespace().any(is_garbage_token)
}

fn is_test_session(session_id: &str) -> bool {
    session_id.starts_with("test") || session_id.contains("_test_") || session_id.ends_with("-test")
}
