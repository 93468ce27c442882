//! Wires a [`hearth_workflow::Engine`] from [`HearthConfig`] (`spec.md §6.3`).
//!
//! No real `ArangoDB`/vector-index/LLM-gateway driver is wired up here — that's
//! explicitly out of scope (`spec.md §1`, "pluggable external services"). What
//! this module does is exactly what production wiring would do in the
//! teacher's shape: build the concrete adapters, type-erase them behind
//! `Arc<dyn Trait>`, and hand them to [`hearth_workflow::EngineDeps`].

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hearth_context::GraphClusterIndex;
use hearth_core::health::{check_embedding_dimension, HealthProbe};
use hearth_core::{Area, Cluster, Device, Document, Entity};
use hearth_memory::InMemoryConversationMemoryStore;
use hearth_rag::{CachedCrossEncoder, CachedLiveState, InMemoryStore, LocalEmbeddingProvider};
use serde::Deserialize;

use crate::adapters::{NoopScoringModel, NullEnrichmentLlmClient, NullLiveStateService};
use crate::config::HearthConfig;
use crate::error::ServerError;

/// A JSON fixture for `database.seed_path`: whichever sections are present are
/// loaded into the in-memory store at startup.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeedFile {
    entities: Vec<Entity>,
    clusters: Vec<Cluster>,
    areas: Vec<Area>,
    devices: Vec<Device>,
    documents: Vec<Document>,
}

fn load_seed(store: &InMemoryStore, path: &Path) -> Result<usize, ServerError> {
    let raw = fs::read_to_string(path).map_err(|err| ServerError::Bootstrap(format!("reading seed file {path:?}: {err}")))?;
    let seed: SeedFile =
        serde_json::from_str(&raw).map_err(|err| ServerError::Bootstrap(format!("parsing seed file {path:?}: {err}")))?;

    let entity_count = seed.entities.len();
    for entity in seed.entities {
        store.put_entity(entity);
    }
    for cluster in seed.clusters {
        store.put_cluster(cluster);
    }
    for area in seed.areas {
        store.put_area(area);
    }
    for device in seed.devices {
        store.put_device(device);
    }
    for document in seed.documents {
        store.put_document(document);
    }
    Ok(entity_count)
}

/// Build the engine and the startup health probes (`GET /health`).
pub fn build_engine(config: &HearthConfig) -> Result<(hearth_workflow::Engine, Vec<HealthProbe>), ServerError> {
    let mut probes = Vec::new();

    let store = Arc::new(InMemoryStore::new());
    if let Some(seed_path) = &config.database.seed_path {
        match load_seed(&store, seed_path) {
            Ok(count) => {
                tracing::info!(count, path = %seed_path.display(), "loaded seed fixture");
                probes.push(HealthProbe::ok("seed_fixture"));
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load seed fixture, starting with an empty store");
                probes.push(HealthProbe::failed("seed_fixture", err.to_string()));
            }
        }
    }

    let embeddings: Arc<dyn hearth_rag::EmbeddingProvider> = Arc::new(LocalEmbeddingProvider::new(config.database.embed_dim));
    match check_embedding_dimension(embeddings.dimension(), config.database.embed_dim) {
        Ok(()) => probes.push(HealthProbe::ok("embedding_dimension")),
        Err(err) => probes.push(HealthProbe::failed("embedding_dimension", err.to_string())),
    }

    let graph: Arc<dyn hearth_rag::GraphStore> = store.clone();
    let vector_store: Arc<dyn hearth_rag::VectorStore> = store.clone();
    let lexical_store: Arc<dyn hearth_rag::LexicalStore> = store;
    let cluster_index: Arc<dyn hearth_context::ClusterIndex> = Arc::new(GraphClusterIndex::new(graph.clone()));

    let cross_encoder: Arc<dyn hearth_rag::CrossEncoder> = match &config.cross_encoder.endpoint {
        Some(endpoint) => Arc::new(CachedCrossEncoder::new(
            hearth_rag::cross_encoder::HttpScoringModel::new(endpoint.clone()),
            config.cross_encoder.cache_max_capacity,
            Duration::from_secs(config.cross_encoder.cache_ttl_secs),
            config.cross_encoder_timeout(),
        )),
        None => Arc::new(CachedCrossEncoder::new(
            NoopScoringModel,
            config.cross_encoder.cache_max_capacity,
            Duration::from_secs(config.cross_encoder.cache_ttl_secs),
            config.cross_encoder_timeout(),
        )),
    };

    let live_state: Arc<dyn hearth_context::LiveStateLookup> = Arc::new(CachedLiveState::new(
        NullLiveStateService,
        config.live_state_ttl(),
        config.caches.state_cache_maxsize,
    ));

    let memory: Arc<dyn hearth_memory::ConversationMemoryStore> =
        Arc::new(InMemoryConversationMemoryStore::new(config.conversation_memory_ttl()));

    let enrichment_client: Arc<dyn hearth_memory::EnrichmentLlmClient> = Arc::new(NullEnrichmentLlmClient);

    let deps = hearth_workflow::EngineDeps {
        embeddings,
        cluster_index,
        vector_store,
        lexical_store,
        graph,
        cross_encoder,
        live_state,
        rewrite_llm: None,
        memory,
        enrichment_client,
    };

    let engine_config = hearth_workflow::EngineConfig {
        rewrite_deadline: config.rewrite_deadline(),
        enrichment_deadline: config.enrichment_deadline(),
        enrichment_max_retries: config.memory.enrichment_max_retries,
        enrichment_summary_ttl: config.enrichment_summary_ttl(),
        enable_enrichment: config.memory.enable_enrichment,
        memory_cleanup_every: config.memory.memory_cleanup_every,
    };

    Ok((hearth_workflow::Engine::new(deps, engine_config), probes))
}
