//! Layered configuration (`spec.md §6.3`): defaults, then an optional TOML
//! file, then `HEARTH_*` environment variables, then CLI flags — the same
//! file-then-env layering `llmspell-config` does with its own `config`
//! dependency, scaled down to this bridge's recognized keys.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

/// Database/store section (`spec.md §6.3` "Database").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub arango_url: String,
    pub arango_user: String,
    pub arango_pass: String,
    pub arango_db: String,
    /// `D`, checked against the vector index at startup.
    pub embed_dim: usize,
    pub auto_bootstrap: bool,
    /// Not a `spec.md` key: a JSON fixture of entities loaded into the
    /// in-memory store at startup, since no real `ArangoDB` driver is wired up
    /// (`spec.md §1` non-goal). Lets `auto_bootstrap` mean something concrete
    /// without a live backend.
    pub seed_path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            arango_url: "http://localhost:8529".to_string(),
            arango_user: "root".to_string(),
            arango_pass: String::new(),
            arango_db: "hearth".to_string(),
            embed_dim: 384,
            auto_bootstrap: true,
            seed_path: None,
        }
    }
}

/// Embedding backend section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local`, `openai` or `gemini`; only `local` is wired to a real
    /// implementation (`spec.md §1` non-goal: no external model training/hosting).
    pub embedding_backend: String,
    pub sentence_transformer_model: String,
    pub embedding_cpu_threads: usize,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedding_backend: "local".to_string(),
            sentence_transformer_model: "paraphrase-multilingual-mpnet-base-v2".to_string(),
            embedding_cpu_threads: 2,
            openai_api_key: None,
            gemini_api_key: None,
        }
    }
}

/// Cross-encoder section. `cross_encoder_scale_factor`/`cross_encoder_offset`
/// are recognized but not yet threaded into `hearth-context`'s normalization
/// (`DESIGN.md` documents this as the already-fixed calibration constants).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrossEncoderConfig {
    pub cross_encoder_model: String,
    pub cross_encoder_scale_factor: f32,
    pub cross_encoder_offset: f32,
    pub cross_encoder_enable_caching: bool,
    /// HTTP endpoint of a hosted scoring model. When unset the cross-encoder
    /// degrades to its token-overlap fallback for every call (`spec.md §7`
    /// "Resource unavailable").
    pub endpoint: Option<String>,
    pub cache_max_capacity: u64,
    pub cache_ttl_secs: u64,
    pub request_timeout_ms: u64,
}

impl Default for CrossEncoderConfig {
    fn default() -> Self {
        Self {
            cross_encoder_model: "ms-marco-MiniLM-L-6-v2".to_string(),
            cross_encoder_scale_factor: 20.0,
            cross_encoder_offset: 10.0,
            cross_encoder_enable_caching: true,
            endpoint: None,
            cache_max_capacity: 10_000,
            cache_ttl_secs: 3600,
            request_timeout_ms: 500,
        }
    }
}

/// Cache sizing/TTL section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CachesConfig {
    pub state_cache_maxsize: usize,
    pub state_cache_ttl_secs: u64,
    pub conversation_cache_maxsize: usize,
    pub entity_score_cache_maxsize: u64,
    pub entity_context_cache_maxsize: usize,
    pub conversation_aliases_ttl_secs: u64,
    pub entity_reranker_cache_ttl_secs: u64,
    pub service_cache_ttl_secs: u64,
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            state_cache_maxsize: 512,
            state_cache_ttl_secs: 30,
            conversation_cache_maxsize: 256,
            entity_score_cache_maxsize: 10_000,
            entity_context_cache_maxsize: 512,
            conversation_aliases_ttl_secs: 300,
            entity_reranker_cache_ttl_secs: 3600,
            service_cache_ttl_secs: 30,
        }
    }
}

/// A `[min, max]` candidate-count range for one scope tier.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct KRange {
    pub min: usize,
    pub max: usize,
}

/// Per-scope `k` ranges (`spec.md §4.4`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub micro: KRange,
    #[serde(rename = "macro")]
    pub macro_scope: KRange,
    pub overview: KRange,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            micro: KRange { min: 5, max: 8 },
            macro_scope: KRange { min: 15, max: 25 },
            overview: KRange { min: 30, max: 50 },
        }
    }
}

/// Ranking/boost section. Recognized; the concrete multipliers live as named
/// constants in `hearth-context::analyzer`/`reranker` per `DESIGN.md`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub previous_mention_boost: f32,
    pub controllable_boost: f32,
    pub readable_boost: f32,
    pub active_value_boost: f32,
    pub unavailable_penalty: f32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            previous_mention_boost: 0.3,
            controllable_boost: 0.2,
            readable_boost: 0.1,
            active_value_boost: 2.0,
            unavailable_penalty: -0.5,
        }
    }
}

/// Outbound HTTP timeout tiers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub http_timeout_short_ms: u64,
    pub http_timeout_medium_ms: u64,
    pub http_timeout_long_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { http_timeout_short_ms: 500, http_timeout_medium_ms: 2000, http_timeout_long_ms: 5000 }
    }
}

/// Conversation memory / enrichment section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub conversation_memory_ttl_minutes: u64,
    pub enrichment_deadline_secs: u64,
    pub enrichment_max_retries: u32,
    pub enrichment_model: Option<String>,
    pub enable_enrichment: bool,
    pub memory_cleanup_every: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            conversation_memory_ttl_minutes: 15,
            enrichment_deadline_secs: 3,
            enrichment_max_retries: 1,
            enrichment_model: None,
            enable_enrichment: true,
            memory_cleanup_every: 5,
        }
    }
}

/// The process-wide configuration, assembled from defaults + file + environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HearthConfig {
    pub bind_addr: SocketAddr,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub cross_encoder: CrossEncoderConfig,
    pub caches: CachesConfig,
    pub scope: ScopeConfig,
    pub ranking: RankingConfig,
    pub network: NetworkConfig,
    pub memory: MemoryConfig,
}

impl Default for HearthConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap_or_else(|_| {
                std::net::SocketAddr::from(([0, 0, 0, 0], 8080))
            }),
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            cross_encoder: CrossEncoderConfig::default(),
            caches: CachesConfig::default(),
            scope: ScopeConfig::default(),
            ranking: RankingConfig::default(),
            network: NetworkConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl HearthConfig {
    #[must_use]
    pub fn rewrite_deadline(&self) -> Duration {
        Duration::from_millis(self.network.http_timeout_medium_ms)
    }

    #[must_use]
    pub fn enrichment_deadline(&self) -> Duration {
        Duration::from_secs(self.memory.enrichment_deadline_secs)
    }

    #[must_use]
    pub fn enrichment_summary_ttl(&self) -> Duration {
        Duration::from_secs(self.memory.conversation_memory_ttl_minutes * 60)
    }

    #[must_use]
    pub fn conversation_memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory.conversation_memory_ttl_minutes * 60)
    }

    #[must_use]
    pub fn live_state_ttl(&self) -> Duration {
        Duration::from_secs(self.caches.state_cache_ttl_secs)
    }

    #[must_use]
    pub fn cross_encoder_timeout(&self) -> Duration {
        Duration::from_millis(self.cross_encoder.request_timeout_ms)
    }
}

/// CLI flags, layered on top of file/environment configuration.
#[derive(Debug, Parser)]
#[command(name = "hearth-server", about = "Conversation-aware RAG bridge for a home-automation controller")]
pub struct Cli {
    /// Path to a TOML config file. Defaults to `./hearth.toml` if present.
    #[arg(long, env = "HEARTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the HTTP bind address.
    #[arg(long, env = "HEARTH_BIND_ADDR")]
    pub bind_addr: Option<SocketAddr>,
}

/// Load configuration from defaults, an optional file, `HEARTH_*` environment
/// variables, and finally CLI overrides, in that ascending priority order.
pub fn load(cli: &Cli) -> anyhow::Result<HearthConfig> {
    let mut builder = config::Config::builder();

    builder = match &cli.config {
        Some(path) => builder.add_source(config::File::from(path.as_path())),
        None => builder.add_source(config::File::with_name("hearth").required(false)),
    };
    builder = builder.add_source(config::Environment::with_prefix("HEARTH").separator("__"));

    let settings = builder.build()?;
    let mut parsed: HearthConfig = settings.try_deserialize()?;

    if let Some(bind_addr) = cli.bind_addr {
        parsed.bind_addr = bind_addr;
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_the_config_crate() {
        let cli = Cli { config: None, bind_addr: None };
        let config = load(&cli).expect("defaults alone must load");
        assert_eq!(config.database.embed_dim, 384);
        assert_eq!(config.scope.macro_scope.min, 15);
    }

    #[test]
    fn cli_bind_addr_overrides_everything_else() {
        let cli = Cli { config: None, bind_addr: Some(([127, 0, 0, 1], 9999).into()) };
        let config = load(&cli).expect("defaults alone must load");
        assert_eq!(config.bind_addr.port(), 9999);
    }
}
