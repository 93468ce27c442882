//! Per-session conversation memory store (C10, `spec.md §4.6`).

use crate::error::Result;
use crate::types::{ConversationMemory, EnrichedContext, MemoryEntity};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use hearth_utils::TtlCache;
use std::time::Duration;

/// How much a repeat mention raises `boost_weight`, per turn. Bounded above so
/// a single hot entity cannot dominate the reranker indefinitely.
const BOOST_INCREMENT: f32 = 0.15;
const MAX_BOOST_WEIGHT: f32 = 3.0;
/// EMA weight given to the current turn's relevance signal.
const RELEVANCE_ALPHA: f32 = 0.4;
/// How much each repeat mention reinforces `memory_relevance`, capped so it
/// cannot grow without bound across a long session.
const MEMORY_RELEVANCE_INCREMENT: f32 = 0.4;
const MAX_MEMORY_RELEVANCE: f32 = 3.0;

/// A candidate observed this turn, with the signal used to update its memory.
#[derive(Debug, Clone)]
pub struct TurnEntity {
    /// Entity id.
    pub entity_id: String,
    /// Domain, if known.
    pub domain: Option<String>,
    /// Area, if known.
    pub area: Option<String>,
    /// This turn's rerank score for the entity, used as the EMA signal.
    pub score: f32,
}

/// Per-session key/value memory with per-entry expiry (`spec.md §4.6`).
#[async_trait]
pub trait ConversationMemoryStore: Send + Sync {
    /// Entities remembered for `session`, most relevant first, non-expired,
    /// capped to `max`.
    async fn get_relevant(&self, session: &str, max: usize) -> Result<Vec<MemoryEntity>>;

    /// Upsert `top_entities` into the session's memory, merging area/domain sets.
    async fn store(
        &self,
        session: &str,
        top_entities: &[TurnEntity],
        areas: &[String],
        domains: &[String],
    ) -> Result<()>;

    /// The cached enrichment summary for `session`, if any and not expired.
    async fn get_summary(&self, session: &str) -> Result<Option<EnrichedContext>>;

    /// Cache an enrichment summary for `session` with the given TTL.
    async fn store_summary(&self, session: &str, summary: EnrichedContext, ttl: Duration) -> Result<()>;

    /// Remove expired entities and summaries; returns the number removed.
    async fn cleanup_expired(&self) -> Result<usize>;
}

/// Default [`ConversationMemoryStore`] backed by a `DashMap` of sessions plus a
/// TTL cache for enrichment summaries.
pub struct InMemoryConversationMemoryStore {
    sessions: DashMap<String, ConversationMemory>,
    summaries: TtlCache<String, EnrichedContext>,
    entity_ttl: Duration,
}

impl InMemoryConversationMemoryStore {
    /// Create a store whose remembered entities expire after `entity_ttl` and
    /// whose enrichment summaries default to a 15-minute TTL when stored.
    #[must_use]
    pub fn new(entity_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            summaries: TtlCache::new(Duration::from_secs(15 * 60), 10_000),
            entity_ttl,
        }
    }
}

#[async_trait]
impl ConversationMemoryStore for InMemoryConversationMemoryStore {
    async fn get_relevant(&self, session: &str, max: usize) -> Result<Vec<MemoryEntity>> {
        let Some(memory) = self.sessions.get(session) else {
            return Ok(Vec::new());
        };
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.entity_ttl).unwrap_or_else(|_| chrono::Duration::minutes(30));
        let mut entities: Vec<MemoryEntity> = memory
            .entities
            .values()
            .filter(|e| e.last_seen + ttl >= now)
            .cloned()
            .collect();
        entities.sort_by(|a, b| {
            let score_a = a.relevance_score * a.boost_weight;
            let score_b = b.relevance_score * b.boost_weight;
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        entities.truncate(max);
        Ok(entities)
    }

    async fn store(
        &self,
        session: &str,
        top_entities: &[TurnEntity],
        areas: &[String],
        domains: &[String],
    ) -> Result<()> {
        let now = Utc::now();
        let mut memory = self
            .sessions
            .entry(session.to_string())
            .or_insert_with(|| ConversationMemory::new(session.to_string()));

        for turn_entity in top_entities {
            memory
                .entities
                .entry(turn_entity.entity_id.clone())
                .and_modify(|existing| {
                    existing.relevance_score =
                        RELEVANCE_ALPHA * turn_entity.score + (1.0 - RELEVANCE_ALPHA) * existing.relevance_score;
                    existing.memory_relevance = (existing.memory_relevance + MEMORY_RELEVANCE_INCREMENT).min(MAX_MEMORY_RELEVANCE);
                    existing.boost_weight = (existing.boost_weight + BOOST_INCREMENT).min(MAX_BOOST_WEIGHT);
                    existing.last_seen = now;
                    if turn_entity.domain.is_some() {
                        existing.domain = turn_entity.domain.clone();
                    }
                    if turn_entity.area.is_some() {
                        existing.area = turn_entity.area.clone();
                    }
                })
                .or_insert_with(|| MemoryEntity {
                    entity_id: turn_entity.entity_id.clone(),
                    domain: turn_entity.domain.clone(),
                    area: turn_entity.area.clone(),
                    relevance_score: turn_entity.score,
                    memory_relevance: turn_entity.score,
                    boost_weight: 1.0,
                    last_seen: now,
                });
        }

        memory.areas_mentioned.extend(areas.iter().cloned());
        memory.domains_mentioned.extend(domains.iter().cloned());
        memory.updated_at = now;
        Ok(())
    }

    async fn get_summary(&self, session: &str) -> Result<Option<EnrichedContext>> {
        Ok(self.summaries.get(&session.to_string()))
    }

    async fn store_summary(&self, session: &str, summary: EnrichedContext, ttl: Duration) -> Result<()> {
        self.summaries.insert_with_ttl(session.to_string(), summary, ttl);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.entity_ttl).unwrap_or_else(|_| chrono::Duration::minutes(30));
        let mut removed = 0usize;
        let mut empty_sessions = Vec::new();
        for mut entry in self.sessions.iter_mut() {
            let before = entry.entities.len();
            entry.entities.retain(|_, e| e.last_seen + ttl >= now);
            removed += before - entry.entities.len();
            if entry.entities.is_empty() {
                empty_sessions.push(entry.session_id.clone());
            }
        }
        for session in empty_sessions {
            self.sessions.remove(&session);
        }
        removed += self.summaries.cleanup_expired();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnrichedContext;
    use std::collections::{HashMap, HashSet};

    fn turn(entity_id: &str, score: f32) -> TurnEntity {
        TurnEntity {
            entity_id: entity_id.to_string(),
            domain: Some("sensor".to_string()),
            area: Some("kert".to_string()),
            score,
        }
    }

    #[tokio::test]
    async fn store_then_get_relevant_returns_ordered_by_score_times_boost() {
        let store = InMemoryConversationMemoryStore::new(Duration::from_secs(1800));
        store
            .store("s1", &[turn("sensor.a", 0.9), turn("sensor.b", 0.2)], &["kert".to_string()], &["sensor".to_string()])
            .await
            .unwrap();
        let relevant = store.get_relevant("s1", 5).await.unwrap();
        assert_eq!(relevant[0].entity_id, "sensor.a");
    }

    #[tokio::test]
    async fn repeated_mentions_monotonically_increase_boost_weight() {
        let store = InMemoryConversationMemoryStore::new(Duration::from_secs(1800));
        store.store("s1", &[turn("sensor.a", 0.5)], &[], &[]).await.unwrap();
        let first = store.get_relevant("s1", 5).await.unwrap()[0].boost_weight;
        store.store("s1", &[turn("sensor.a", 0.5)], &[], &[]).await.unwrap();
        let second = store.get_relevant("s1", 5).await.unwrap()[0].boost_weight;
        assert!(second >= first);
        assert!(first >= 1.0);
    }

    #[tokio::test]
    async fn expired_entities_are_not_returned() {
        let store = InMemoryConversationMemoryStore::new(Duration::from_millis(1));
        store.store("s1", &[turn("sensor.a", 0.5)], &[], &[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let relevant = store.get_relevant("s1", 5).await.unwrap();
        assert!(relevant.is_empty());
    }

    #[tokio::test]
    async fn store_is_idempotent_modulo_updated_at() {
        let store = InMemoryConversationMemoryStore::new(Duration::from_secs(1800));
        let entities = [turn("sensor.a", 0.5)];
        store.store("s1", &entities, &["kert".to_string()], &[]).await.unwrap();
        let first = store.get_relevant("s1", 5).await.unwrap();
        store.store("s1", &entities, &["kert".to_string()], &[]).await.unwrap();
        let second = store.get_relevant("s1", 5).await.unwrap();
        assert_eq!(first.len(), second.len());
    }

    #[tokio::test]
    async fn summary_round_trips_and_respects_ttl() {
        let store = InMemoryConversationMemoryStore::new(Duration::from_secs(1800));
        let summary = EnrichedContext {
            session_id: "s1".to_string(),
            detected_domains: HashSet::new(),
            detected_areas: HashSet::new(),
            entity_boost_weights: HashMap::new(),
            expected_followups: vec![],
            confidence: 0.8,
            created_at: Utc::now(),
        };
        store.store_summary("s1", summary.clone(), Duration::from_millis(5)).await.unwrap();
        assert!(store.get_summary("s1").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get_summary("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_expired_counts_removed_entities() {
        let store = InMemoryConversationMemoryStore::new(Duration::from_millis(1));
        store.store("s1", &[turn("sensor.a", 0.5)], &[], &[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = store.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
    }
}
