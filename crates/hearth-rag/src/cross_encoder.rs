//! Cross-encoder adapter (C4, `spec.md §4.8`).
//!
//! Raw model scores are normalized to `[0, 1]` via `(raw + offset) / scale`, cached
//! by a hash of `(query, document)`, and backed by a token-overlap fallback when
//! the model is unavailable or times out — mirroring the teacher's
//! `llmspell-hooks::cache::ttl` cache shape layered under a scoring call.

use crate::error::{RagError, Result};
use async_trait::async_trait;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Normalization constants for the raw cross-encoder logit, matching the
/// original bridge's calibration of its `ms-marco` model.
const SCORE_OFFSET: f32 = 10.0;
const SCORE_SCALE: f32 = 20.0;

/// Scores how well a document answers a query.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Score `(query, document)` pairs. Returns one normalized score per pair,
    /// in the same order as `pairs`, each clamped to `[0, 1]`.
    async fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>>;
}

#[async_trait]
impl CrossEncoder for Arc<dyn CrossEncoder> {
    async fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        self.as_ref().predict(pairs).await
    }
}

fn normalize(raw: f32) -> f32 {
    ((raw + SCORE_OFFSET) / SCORE_SCALE).clamp(0.0, 1.0)
}

/// Token-overlap similarity used when the model is unavailable: the fraction of
/// query tokens also present in the document, per `spec.md §4.8`'s fallback note.
#[must_use]
pub fn token_overlap_score(query: &str, document: &str) -> f32 {
    let query_tokens: HashSet<&str> = query.split_whitespace().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let doc_lower = document.to_lowercase();
    let doc_tokens: HashSet<&str> = doc_lower.split_whitespace().collect();
    let query_lower = query.to_lowercase();
    let query_tokens_lower: HashSet<&str> = query_lower.split_whitespace().collect();
    let overlap = query_tokens_lower.intersection(&doc_tokens).count();
    let _ = query_tokens;
    overlap as f32 / query_tokens_lower.len() as f32
}

fn pair_key(query: &str, document: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update([0u8]);
    hasher.update(document.as_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().unwrap_or([0; 8]))
}

/// A [`CrossEncoder`] wrapping any scoring model behind a TTL+size-bounded cache,
/// falling back to token overlap on error or timeout.
pub struct CachedCrossEncoder<M: ScoringModel> {
    model: M,
    cache: Cache<u64, f32>,
    timeout: Duration,
}

/// The minimal contract a raw scoring backend must satisfy; kept separate from
/// [`CrossEncoder`] so the cache/fallback/timeout wiring lives in one place.
#[async_trait]
pub trait ScoringModel: Send + Sync {
    /// Return a raw (unnormalized) relevance logit for `(query, document)`.
    async fn score_raw(&self, query: &str, document: &str) -> Result<f32>;
}

impl<M: ScoringModel> CachedCrossEncoder<M> {
    /// Build a cached cross-encoder with the given capacity, entry TTL and
    /// per-call timeout.
    #[must_use]
    pub fn new(model: M, max_capacity: u64, ttl: Duration, timeout: Duration) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build();
        Self { model, cache, timeout }
    }

    async fn score_one(&self, query: &str, document: &str) -> f32 {
        let key = pair_key(query, document);
        if let Some(cached) = self.cache.get(&key).await {
            return cached;
        }
        let scored = tokio::time::timeout(self.timeout, self.model.score_raw(query, document)).await;
        let score = match scored {
            Ok(Ok(raw)) => normalize(raw),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "cross-encoder scoring failed, using token overlap");
                token_overlap_score(query, document)
            }
            Err(_) => {
                tracing::warn!("cross-encoder scoring timed out, using token overlap");
                token_overlap_score(query, document)
            }
        };
        self.cache.insert(key, score).await;
        score
    }
}

#[async_trait]
impl<M: ScoringModel> CrossEncoder for CachedCrossEncoder<M> {
    async fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(pairs.len());
        for (query, document) in pairs {
            scores.push(self.score_one(query, document).await);
        }
        Ok(scores)
    }
}

/// A [`ScoringModel`] backed by a hosted cross-encoder HTTP endpoint.
pub struct HttpScoringModel {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpScoringModel {
    /// Build a client against a hosted cross-encoder endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into() }
    }
}

#[async_trait]
impl ScoringModel for HttpScoringModel {
    async fn score_raw(&self, query: &str, document: &str) -> Result<f32> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            query: &'a str,
            document: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            score: f32,
        }
        let response = self
            .client
            .post(&self.endpoint)
            .json(&Req { query, document })
            .send()
            .await
            .map_err(RagError::Http)?;
        let parsed: Resp = response.json().await.map_err(RagError::Http)?;
        Ok(parsed.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyModel {
        should_fail: bool,
    }

    #[async_trait]
    impl ScoringModel for FlakyModel {
        async fn score_raw(&self, _query: &str, _document: &str) -> Result<f32> {
            if self.should_fail {
                Err(RagError::CrossEncoder("model unavailable".to_string()))
            } else {
                Ok(5.0)
            }
        }
    }

    #[test]
    fn normalize_clamps_to_unit_interval() {
        assert!((normalize(10.0) - 1.0).abs() < f32::EPSILON);
        assert!((normalize(-10.0) - 0.0).abs() < f32::EPSILON);
        assert!((normalize(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn token_overlap_scores_full_match_as_one() {
        let score = token_overlap_score("kert nedvesség", "a kert nedvesség magas");
        assert!((score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn token_overlap_with_no_query_tokens_is_zero() {
        assert_eq!(token_overlap_score("", "anything"), 0.0);
    }

    #[tokio::test]
    async fn cached_encoder_normalizes_and_caches_scores() {
        let encoder = CachedCrossEncoder::new(
            FlakyModel { should_fail: false },
            100,
            Duration::from_secs(60),
            Duration::from_secs(1),
        );
        let scores = encoder
            .predict(&[("kert".to_string(), "kert nedvesség".to_string())])
            .await
            .unwrap();
        assert_eq!(scores.len(), 1);
        assert!((scores[0] - normalize(5.0)).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn cached_encoder_falls_back_to_token_overlap_on_model_error() {
        let encoder = CachedCrossEncoder::new(
            FlakyModel { should_fail: true },
            100,
            Duration::from_secs(60),
            Duration::from_secs(1),
        );
        let scores = encoder
            .predict(&[("kert nedvesség".to_string(), "kert nedvesség magas".to_string())])
            .await
            .unwrap();
        assert!(scores[0] > 0.0);
    }
}
