//! Embedding adapter (C3, `spec.md §4.7`).
//!
//! `embed_query`/`embed_documents` are pluggable across backends; instruction-style
//! prefixes ("query: "/"passage: ") are applied by implementations whose underlying
//! model expects them, mirroring `llmspell-rag::embeddings::provider`'s
//! provider-abstraction shape.

use crate::error::{RagError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Which embedding backend is in effect (`spec.md §6.3` `embedding_backend`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackendKind {
    /// A locally hosted sentence-transformer model.
    Local,
    /// `OpenAI`'s embeddings API.
    OpenAi,
    /// Google's Gemini embeddings API.
    Gemini,
}

/// Query vs. document text, used to select an instruction prefix when the
/// underlying model expects one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    /// A user query about to be embedded for retrieval.
    Query,
    /// A document/entity description being indexed or reranked against.
    Passage,
}

/// Embeds query and document text into the process-wide vector space.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of document strings.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The fixed dimension `D` this provider produces.
    fn dimension(&self) -> usize;
}

fn apply_prefix(kind: EmbeddingKind, text: &str, uses_prefixes: bool) -> String {
    if !uses_prefixes {
        return text.to_string();
    }
    match kind {
        EmbeddingKind::Query => format!("query: {text}"),
        EmbeddingKind::Passage => format!("passage: {text}"),
    }
}

/// Deterministic, dependency-free local embedding: a hashed bag-of-characters
/// projection. Stands in for a real sentence-transformer model so the pipeline
/// is fully exercisable offline and in tests; the wire shape (fixed-`D` `Vec<f32>`)
/// is what matters to callers, not the model quality.
pub struct LocalEmbeddingProvider {
    dimension: usize,
    uses_prefixes: bool,
}

impl LocalEmbeddingProvider {
    /// Create a local provider emitting `dimension`-sized vectors.
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self { dimension, uses_prefixes: true }
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        for (i, slot) in vector.iter_mut().enumerate() {
            let byte = digest[i % digest.len()];
            *slot = (f32::from(byte) / 255.0) - 0.5;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for slot in &mut vector {
                *slot /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let prefixed = apply_prefix(EmbeddingKind::Query, text, self.uses_prefixes);
        Ok(self.hash_embed(&prefixed))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| self.hash_embed(&apply_prefix(EmbeddingKind::Passage, text, self.uses_prefixes)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Thin HTTP client for hosted embedding APIs (`OpenAI`/Gemini share this shape:
/// POST a batch of strings, get back a batch of vectors).
pub struct HostedEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    kind: EmbeddingBackendKind,
}

impl HostedEmbeddingProvider {
    /// Build a client against a hosted embeddings endpoint.
    #[must_use]
    pub fn new(
        kind: EmbeddingBackendKind,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
            kind,
        }
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            model: &'a str,
            input: &'a [String],
        }
        #[derive(serde::Deserialize)]
        struct Embedding {
            embedding: Vec<f32>,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            data: Vec<Embedding>,
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&Req { model: &self.model, input: texts })
            .send()
            .await?;
        let parsed: Resp = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "{:?} backend returned {} embeddings for {} inputs",
                self.kind,
                parsed.data.len(),
                texts.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for HostedEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.request_embeddings(std::slice::from_ref(&text.to_string())).await?;
        results.pop().ok_or_else(|| RagError::Embedding("empty response".to_string()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request_embeddings(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_provider_produces_the_configured_dimension() {
        let provider = LocalEmbeddingProvider::new(16);
        let vector = provider.embed_query("mekkora a nedvesség a kertben").await.unwrap();
        assert_eq!(vector.len(), 16);
        assert_eq!(provider.dimension(), 16);
    }

    #[tokio::test]
    async fn local_provider_is_deterministic() {
        let provider = LocalEmbeddingProvider::new(8);
        let a = provider.embed_query("hello").await.unwrap();
        let b = provider.embed_query("hello").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn local_provider_differs_between_query_and_passage_prefixing() {
        let provider = LocalEmbeddingProvider::new(8);
        let query_vec = provider.embed_query("kert").await.unwrap();
        let doc_vecs = provider.embed_documents(&["kert".to_string()]).await.unwrap();
        assert_ne!(query_vec, doc_vecs[0]);
    }

    #[tokio::test]
    async fn local_provider_batches_documents() {
        let provider = LocalEmbeddingProvider::new(8);
        let vectors = provider
            .embed_documents(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 3);
    }
}
