//! Cluster index (C8) and hybrid retriever (C9), `spec.md §4.5`.

use crate::error::{ContextError, Result};
use crate::types::Candidate;
use async_trait::async_trait;
use hearth_core::{Cluster, ClusterType, Entity, Scope};
use hearth_rag::{GraphStore, LexicalStore, VectorStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const DEFAULT_THRESHOLD: f32 = 0.7;

/// Read-only search over precomputed semantic clusters.
#[async_trait]
pub trait ClusterIndex: Send + Sync {
    /// Top clusters of the given types whose embedding similarity to
    /// `query_embedding` is at or above `threshold`, limited to `k_clusters`.
    async fn search_clusters(
        &self,
        query_embedding: &[f32],
        cluster_types: &[ClusterType],
        k_clusters: usize,
        threshold: f32,
    ) -> Result<Vec<Cluster>>;

    /// Expand cluster memberships into annotated entity references.
    async fn expand(&self, clusters: &[Cluster]) -> Result<Vec<ExpandedMember>>;
}

/// One cluster membership edge, annotated with the cluster it came from.
#[derive(Debug, Clone)]
pub struct ExpandedMember {
    /// The referenced entity id.
    pub entity_id: String,
    /// The cluster this membership came from.
    pub cluster_key: String,
    /// Membership role (e.g. `"primary"`, `"related"`).
    pub role: String,
    /// Static membership weight.
    pub weight: f32,
    /// Contextual boost applied when this membership is used.
    pub context_boost: f32,
}

#[async_trait]
impl ClusterIndex for Arc<dyn ClusterIndex> {
    async fn search_clusters(
        &self,
        query_embedding: &[f32],
        cluster_types: &[ClusterType],
        k_clusters: usize,
        threshold: f32,
    ) -> Result<Vec<Cluster>> {
        self.as_ref().search_clusters(query_embedding, cluster_types, k_clusters, threshold).await
    }

    async fn expand(&self, clusters: &[Cluster]) -> Result<Vec<ExpandedMember>> {
        self.as_ref().expand(clusters).await
    }
}

/// A [`ClusterIndex`] backed directly by a [`GraphStore`].
pub struct GraphClusterIndex<G: GraphStore> {
    graph: G,
}

impl<G: GraphStore> GraphClusterIndex<G> {
    /// Wrap `graph` as a cluster index.
    #[must_use]
    pub const fn new(graph: G) -> Self {
        Self { graph }
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
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
impl<G: GraphStore> ClusterIndex for GraphClusterIndex<G> {
    async fn search_clusters(
        &self,
        query_embedding: &[f32],
        cluster_types: &[ClusterType],
        k_clusters: usize,
        threshold: f32,
    ) -> Result<Vec<Cluster>> {
        let mut scored = Vec::new();
        for cluster_type in cluster_types {
            let clusters = self
                .graph
                .clusters_by_type(*cluster_type)
                .await
                .map_err(|err| ContextError::Retrieval(err.to_string()))?;
            for cluster in clusters {
                let score = Self::cosine(query_embedding, &cluster.embedding);
                if score >= threshold {
                    scored.push((score, cluster));
                }
            }
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k_clusters);
        Ok(scored.into_iter().map(|(_, cluster)| cluster).collect())
    }

    async fn expand(&self, clusters: &[Cluster]) -> Result<Vec<ExpandedMember>> {
        Ok(clusters
            .iter()
            .flat_map(|cluster| {
                cluster.members.iter().map(move |member| ExpandedMember {
                    entity_id: member.entity_id.clone(),
                    cluster_key: cluster.key.clone(),
                    role: member.role.clone(),
                    weight: member.weight,
                    context_boost: member.context_boost,
                })
            })
            .collect())
    }
}

/// Which cluster types to search for a given scope (`spec.md §4.5`).
#[must_use]
pub fn cluster_types_for_scope(scope: Scope, climate_priority: bool) -> Vec<ClusterType> {
    match scope {
        Scope::Micro => vec![ClusterType::Specific, ClusterType::Device],
        Scope::Macro if climate_priority => vec![ClusterType::Climate, ClusterType::Area, ClusterType::Domain],
        Scope::Macro => vec![ClusterType::Area, ClusterType::Domain, ClusterType::Specific],
        Scope::Overview => vec![ClusterType::Overview, ClusterType::Area, ClusterType::Domain],
    }
}

/// Hybrid retriever combining cluster-first search with vector+lexical broad
/// retrieval and an insufficient-pool fallback (C9, `spec.md §4.5`).
pub struct HybridRetriever<C: ClusterIndex, V: VectorStore, L: LexicalStore, G: GraphStore> {
    cluster_index: C,
    vector_store: V,
    lexical_store: L,
    graph: G,
}

impl<C: ClusterIndex, V: VectorStore, L: LexicalStore, G: GraphStore> HybridRetriever<C, V, L, G> {
    /// Build a retriever from its backing stores.
    #[must_use]
    pub const fn new(cluster_index: C, vector_store: V, lexical_store: L, graph: G) -> Self {
        Self { cluster_index, vector_store, lexical_store, graph }
    }

    /// Run the full cluster-first + hybrid-broad + fallback algorithm.
    pub async fn retrieve(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        scope: Scope,
        cluster_types: &[ClusterType],
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<Candidate>> {
        let threshold = threshold.unwrap_or(DEFAULT_THRESHOLD);

        let mut seen: HashSet<String> = HashSet::new();
        let mut ordered: Vec<Candidate> = Vec::new();

        self.cluster_first(query_embedding, cluster_types, k, threshold, &mut seen, &mut ordered).await?;
        self.vector_lexical_broad(query_embedding, query_text, k, &mut seen, &mut ordered).await?;

        if ordered.len() < 2 {
            return self.lexical_only_fallback(query_text, k).await;
        }

        let _ = scope;
        Ok(ordered)
    }

    async fn cluster_first(
        &self,
        query_embedding: &[f32],
        cluster_types: &[ClusterType],
        k: usize,
        threshold: f32,
        seen: &mut HashSet<String>,
        ordered: &mut Vec<Candidate>,
    ) -> Result<()> {
        let k_clusters = (k / 3).clamp(1, 5);
        let clusters = self.cluster_index.search_clusters(query_embedding, cluster_types, k_clusters, threshold).await?;
        if clusters.is_empty() {
            return Ok(());
        }
        let members = self.cluster_index.expand(&clusters).await?;
        let entity_ids: Vec<String> = members.iter().map(|m| m.entity_id.clone()).collect();
        let entities = self.graph.entities(&entity_ids).await.map_err(|err| ContextError::Retrieval(err.to_string()))?;
        let entities_by_id: HashMap<String, Entity> = entities.into_iter().map(|e| (e.entity_id.clone(), e)).collect();

        for member in members {
            if seen.contains(&member.entity_id) {
                continue;
            }
            let Some(entity) = entities_by_id.get(&member.entity_id) else { continue };
            seen.insert(member.entity_id.clone());
            let mut candidate = Candidate::from_entity(entity.clone(), member.weight + member.context_boost);
            candidate.cluster_context = Some(member.cluster_key);
            ordered.push(candidate);
        }
        Ok(())
    }

    async fn vector_lexical_broad(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        k: usize,
        seen: &mut HashSet<String>,
        ordered: &mut Vec<Candidate>,
    ) -> Result<()> {
        let limit = 3 * k;
        let vector_hits = self
            .vector_store
            .search(query_embedding, limit)
            .await
            .map_err(|err| ContextError::Retrieval(err.to_string()))?;
        let lexical_hits = self
            .lexical_store
            .search(query_text, limit)
            .await
            .map_err(|err| ContextError::Retrieval(err.to_string()))?;

        let mut scores: HashMap<String, f32> = HashMap::new();
        for hit in vector_hits {
            scores.insert(hit.entity_id, hit.score);
        }
        for hit in lexical_hits {
            scores
                .entry(hit.entity_id)
                .and_modify(|existing| *existing = existing.max(hit.score))
                .or_insert(hit.score);
        }

        let entity_ids: Vec<String> = scores.keys().cloned().collect();
        let entities = self.graph.entities(&entity_ids).await.map_err(|err| ContextError::Retrieval(err.to_string()))?;
        for entity in entities {
            if seen.contains(&entity.entity_id) {
                continue;
            }
            seen.insert(entity.entity_id.clone());
            let score = scores.get(&entity.entity_id).copied().unwrap_or(0.0);
            ordered.push(Candidate::from_entity(entity, score));
        }
        Ok(())
    }

    async fn lexical_only_fallback(&self, query_text: &str, k: usize) -> Result<Vec<Candidate>> {
        let hits = self
            .lexical_store
            .search(query_text, k)
            .await
            .map_err(|err| ContextError::Retrieval(err.to_string()))?;
        let entity_ids: Vec<String> = hits.iter().map(|h| h.entity_id.clone()).collect();
        let entities = self.graph.entities(&entity_ids).await.map_err(|err| ContextError::Retrieval(err.to_string()))?;
        let entities_by_id: HashMap<String, Entity> = entities.into_iter().map(|e| (e.entity_id.clone(), e)).collect();
        Ok(hits
            .into_iter()
            .filter_map(|hit| entities_by_id.get(&hit.entity_id).map(|e| Candidate::from_entity(e.clone(), hit.score)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_rag::InMemoryStore;

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

    #[test]
    fn micro_scope_prefers_specific_and_device_clusters() {
        let types = cluster_types_for_scope(Scope::Micro, false);
        assert_eq!(types, vec![ClusterType::Specific, ClusterType::Device]);
    }

    #[test]
    fn macro_scope_with_climate_priority_leads_with_climate() {
        let types = cluster_types_for_scope(Scope::Macro, true);
        assert_eq!(types[0], ClusterType::Climate);
    }

    #[tokio::test]
    async fn retrieve_falls_back_to_lexical_only_when_pool_too_small() {
        let store = InMemoryStore::new();
        store.put_entity(entity("sensor.a", vec![1.0, 0.0], "kerti páratartalom szenzor"));
        let retriever = HybridRetriever::new(
            GraphClusterIndex::new(InMemoryStore::new()),
            InMemoryStore::new(),
            store,
            InMemoryStore::new(),
        );
        let candidates = retriever
            .retrieve(&[1.0, 0.0], "kerti páratartalom", Scope::Macro, &[ClusterType::Area], 10, None)
            .await
            .unwrap();
        assert!(candidates.is_empty() || candidates.len() < 2);
    }

    #[tokio::test]
    async fn retrieve_merges_vector_and_lexical_hits_without_duplicates() {
        let vector_store = InMemoryStore::new();
        vector_store.put_entity(entity("sensor.a", vec![1.0, 0.0], "kerti páratartalom szenzor"));
        vector_store.put_entity(entity("sensor.b", vec![0.0, 1.0], "nappali fényerő szenzor"));
        let lexical_store = InMemoryStore::new();
        lexical_store.put_entity(entity("sensor.a", vec![1.0, 0.0], "kerti páratartalom szenzor"));
        lexical_store.put_entity(entity("sensor.b", vec![0.0, 1.0], "nappali fényerő szenzor"));
        let graph = InMemoryStore::new();
        graph.put_entity(entity("sensor.a", vec![1.0, 0.0], "kerti páratartalom szenzor"));
        graph.put_entity(entity("sensor.b", vec![0.0, 1.0], "nappali fényerő szenzor"));

        let retriever = HybridRetriever::new(GraphClusterIndex::new(InMemoryStore::new()), vector_store, lexical_store, graph);
        let candidates = retriever
            .retrieve(&[1.0, 0.0], "kerti páratartalom", Scope::Macro, &[ClusterType::Area], 10, None)
            .await
            .unwrap();
        let ids: HashSet<&str> = candidates.iter().map(|c| c.entity.entity_id.as_str()).collect();
        assert_eq!(ids.len(), candidates.len());
        assert!(ids.contains("sensor.a"));
    }
}
