//! Pluggable retrieval backends (`spec.md §6.2`): a vector index, a lexical
//! (BM25-style) index and a graph store for clusters/areas/devices. Production
//! wiring talks to the controller's existing indices; in-memory implementations
//! here back unit tests for C8/C9 without a live backend.

use crate::error::Result;
use async_trait::async_trait;
use hearth_core::{Area, Cluster, ClusterType, Device, Document, Entity};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A single vector-similarity hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// The id of the matched entity.
    pub entity_id: String,
    /// Cosine similarity (or equivalent), higher is better.
    pub score: f32,
}

/// Approximate k-NN search over entity embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return the `k` entities whose embedding is closest to `query_embedding`.
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<VectorHit>>;
}

/// A single lexical-match hit.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    /// The id of the matched entity.
    pub entity_id: String,
    /// BM25 (or equivalent) relevance score.
    pub score: f32,
}

/// Keyword/BM25 search over entity text.
#[async_trait]
pub trait LexicalStore: Send + Sync {
    /// Return the `k` entities whose text best matches `query`.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<LexicalHit>>;
}

#[async_trait]
impl VectorStore for Arc<dyn VectorStore> {
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        self.as_ref().search(query_embedding, k).await
    }
}

#[async_trait]
impl LexicalStore for Arc<dyn LexicalStore> {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<LexicalHit>> {
        self.as_ref().search(query, k).await
    }
}

/// Graph lookups over clusters, areas, devices and documents.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Fetch a cluster by key.
    async fn cluster(&self, key: &str) -> Result<Option<Cluster>>;

    /// Fetch every cluster of a given type, e.g. all `Area` clusters.
    async fn clusters_by_type(&self, cluster_type: ClusterType) -> Result<Vec<Cluster>>;

    /// Fetch an entity by id.
    async fn entity(&self, entity_id: &str) -> Result<Option<Entity>>;

    /// Fetch many entities by id, skipping any that don't exist.
    async fn entities(&self, entity_ids: &[String]) -> Result<Vec<Entity>>;

    /// Fetch an area by id.
    async fn area(&self, area_id: &str) -> Result<Option<Area>>;

    /// Fetch a device by id.
    async fn device(&self, device_id: &str) -> Result<Option<Device>>;

    /// Fetch the manual/document linked to a device, if any.
    async fn document_for_device(&self, device_id: &str) -> Result<Option<Document>>;
}

#[async_trait]
impl GraphStore for Arc<dyn GraphStore> {
    async fn cluster(&self, key: &str) -> Result<Option<Cluster>> {
        self.as_ref().cluster(key).await
    }

    async fn clusters_by_type(&self, cluster_type: ClusterType) -> Result<Vec<Cluster>> {
        self.as_ref().clusters_by_type(cluster_type).await
    }

    async fn entity(&self, entity_id: &str) -> Result<Option<Entity>> {
        self.as_ref().entity(entity_id).await
    }

    async fn entities(&self, entity_ids: &[String]) -> Result<Vec<Entity>> {
        self.as_ref().entities(entity_ids).await
    }

    async fn area(&self, area_id: &str) -> Result<Option<Area>> {
        self.as_ref().area(area_id).await
    }

    async fn device(&self, device_id: &str) -> Result<Option<Device>> {
        self.as_ref().device(device_id).await
    }

    async fn document_for_device(&self, device_id: &str) -> Result<Option<Document>> {
        self.as_ref().document_for_device(device_id).await
    }
}

/// An in-memory [`GraphStore`]/[`VectorStore`]/[`LexicalStore`] for tests and
/// local development, populated directly rather than through an ingestion path.
#[derive(Default)]
pub struct InMemoryStore {
    entities: RwLock<HashMap<String, Entity>>,
    clusters: RwLock<HashMap<String, Cluster>>,
    areas: RwLock<HashMap<String, Area>>,
    devices: RwLock<HashMap<String, Device>>,
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity.
    pub fn put_entity(&self, entity: Entity) {
        self.entities.write().unwrap_or_else(std::sync::PoisonError::into_inner).insert(entity.entity_id.clone(), entity);
    }

    /// Insert or replace a cluster.
    pub fn put_cluster(&self, cluster: Cluster) {
        self.clusters.write().unwrap_or_else(std::sync::PoisonError::into_inner).insert(cluster.key.clone(), cluster);
    }

    /// Insert or replace an area.
    pub fn put_area(&self, area: Area) {
        self.areas.write().unwrap_or_else(std::sync::PoisonError::into_inner).insert(area.area_id.clone(), area);
    }

    /// Insert or replace a device.
    pub fn put_device(&self, device: Device) {
        self.devices.write().unwrap_or_else(std::sync::PoisonError::into_inner).insert(device.device_id.clone(), device);
    }

    /// Insert or replace a document, keyed by the device it documents.
    pub fn put_document(&self, document: Document) {
        self.documents
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(document.device_id.clone(), document);
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        let entities = self.entities.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut hits: Vec<VectorHit> = entities
            .values()
            .map(|entity| VectorHit {
                entity_id: entity.entity_id.clone(),
                score: Self::cosine_similarity(query_embedding, &entity.embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

#[async_trait]
impl LexicalStore for InMemoryStore {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<LexicalHit>> {
        let query_tokens: Vec<String> = hearth_utils::text::normalize(query)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let entities = self.entities.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut hits: Vec<LexicalHit> = entities
            .values()
            .filter_map(|entity| {
                let haystack = hearth_utils::text::normalize(&entity.text);
                let matches = query_tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
                if matches == 0 {
                    None
                } else {
                    Some(LexicalHit {
                        entity_id: entity.entity_id.clone(),
                        score: matches as f32 / query_tokens.len().max(1) as f32,
                    })
                }
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn cluster(&self, key: &str) -> Result<Option<Cluster>> {
        Ok(self.clusters.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(key).cloned())
    }

    async fn clusters_by_type(&self, cluster_type: ClusterType) -> Result<Vec<Cluster>> {
        Ok(self
            .clusters
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|c| c.cluster_type == cluster_type)
            .cloned()
            .collect())
    }

    async fn entity(&self, entity_id: &str) -> Result<Option<Entity>> {
        Ok(self.entities.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(entity_id).cloned())
    }

    async fn entities(&self, entity_ids: &[String]) -> Result<Vec<Entity>> {
        let entities = self.entities.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entity_ids.iter().filter_map(|id| entities.get(id).cloned()).collect())
    }

    async fn area(&self, area_id: &str) -> Result<Option<Area>> {
        Ok(self.areas.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(area_id).cloned())
    }

    async fn device(&self, device_id: &str) -> Result<Option<Device>> {
        Ok(self.devices.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(device_id).cloned())
    }

    async fn document_for_device(&self, device_id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(device_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, embedding: Vec<f32>, text: &str) -> Entity {
        Entity {
            entity_id: id.to_string(),
            domain: "sensor".to_string(),
            device_class: Some("humidity".to_string()),
            area: Some("kert".to_string()),
            friendly_name: Some(id.to_string()),
            device_id: None,
            text: text.to_string(),
            embedding,
            attributes: serde_json::Value::Null,
            state: None,
        }
    }

    #[tokio::test]
    async fn vector_search_ranks_by_cosine_similarity() {
        let store = InMemoryStore::new();
        store.put_entity(entity("a", vec![1.0, 0.0], "kerti szenzor"));
        store.put_entity(entity("b", vec![0.0, 1.0], "haloszoba szenzor"));
        let hits = store.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].entity_id, "a");
    }

    #[tokio::test]
    async fn lexical_search_matches_on_token_overlap() {
        let store = InMemoryStore::new();
        store.put_entity(entity("a", vec![1.0, 0.0], "kerti páratartalom szenzor"));
        store.put_entity(entity("b", vec![0.0, 1.0], "nappali fényerő szenzor"));
        let hits = store.search("kerti páratartalom", 5).await.unwrap();
        assert_eq!(hits[0].entity_id, "a");
    }

    #[tokio::test]
    async fn lexical_search_returns_no_hits_for_unrelated_query() {
        let store = InMemoryStore::new();
        store.put_entity(entity("a", vec![1.0, 0.0], "kerti páratartalom szenzor"));
        let hits = store.search("xyz nonexistent", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn graph_store_round_trips_clusters_and_areas() {
        let store = InMemoryStore::new();
        store.put_area(Area { area_id: "kert".to_string(), name: "Kert".to_string(), aliases: vec![] });
        store.put_cluster(Cluster {
            key: "cluster:kert".to_string(),
            cluster_type: ClusterType::Area,
            embedding: vec![0.1, 0.2],
            members: vec![],
        });
        assert!(store.area("kert").await.unwrap().is_some());
        let clusters = store.clusters_by_type(ClusterType::Area).await.unwrap();
        assert_eq!(clusters.len(), 1);
    }
}
