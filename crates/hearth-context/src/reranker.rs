//! Reranker (C12, `spec.md §4.8`): cross-encoder base score, additive/
//! multiplicative context boost, then multi-stage filtering into
//! `primary[]`/`related[]`.

use crate::types::{BoostFactors, Candidate, ConversationContext};
use async_trait::async_trait;
use hearth_core::{EntityState, Intent, Scope};
use hearth_rag::{CachedLiveState, CrossEncoder, LiveStateService};
use std::collections::HashSet;
use std::sync::Arc;

const PREVIOUS_MENTION_BOOST: f32 = 0.3;
const CONTROLLABLE_BOOST: f32 = 0.2;
const READABLE_BOOST: f32 = 0.1;
const ACTIVE_VALUE_BOOST: f32 = 2.0;
const UNAVAILABLE_PENALTY: f32 = -0.5;
const MIN_FINAL_SCORE: f32 = 0.2;
const CONTROLLABLE_DOMAINS: [&str; 5] = ["light", "switch", "climate", "cover", "lock"];
const MAX_PRIMARY_DEVICE_CLASSES: usize = 3;

/// Looks up an entity's current live value for the `has_active_value`/
/// `unavailable_penalty` factors, decoupled from any concrete service so the
/// reranker can be tested without a real store.
#[async_trait]
pub trait LiveStateLookup: Send + Sync {
    /// Resolve the best-known current state for `entity_id`, if any.
    async fn resolve(&self, entity_id: &str) -> Option<EntityState>;
}

#[async_trait]
impl<S: LiveStateService> LiveStateLookup for CachedLiveState<S> {
    async fn resolve(&self, entity_id: &str) -> Option<EntityState> {
        self.resolve(entity_id).await.ok().flatten()
    }
}

#[async_trait]
impl LiveStateLookup for Arc<dyn LiveStateLookup> {
    async fn resolve(&self, entity_id: &str) -> Option<EntityState> {
        self.as_ref().resolve(entity_id).await
    }
}

/// Per-candidate breakdown, kept around for diagnostics/tracing.
#[derive(Debug, Clone, Default)]
struct ScoreFactors {
    context_boost: f32,
    has_active_value: bool,
    unavailable: bool,
}

/// Scores and filters candidates into primary/related tiers.
pub struct Reranker<X: CrossEncoder, S: LiveStateLookup> {
    cross_encoder: X,
    live_state: S,
}

impl<X: CrossEncoder, S: LiveStateLookup> Reranker<X, S> {
    /// Build a reranker from its cross-encoder and live-state dependencies.
    #[must_use]
    pub const fn new(cross_encoder: X, live_state: S) -> Self {
        Self { cross_encoder, live_state }
    }

    /// Run the full scoring, sorting and primary/related split.
    pub async fn rerank(
        &self,
        mut candidates: Vec<Candidate>,
        query: &str,
        context: &ConversationContext,
        boost_factors: &BoostFactors,
        scope: Scope,
        k: usize,
    ) -> anyhow::Result<(Vec<Candidate>, Vec<Candidate>)> {
        if candidates.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let pairs: Vec<(String, String)> =
            candidates.iter().map(|c| (query.to_string(), c.entity.describe())).collect();
        let base_scores = self.cross_encoder.predict(&pairs).await?;

        for (candidate, base) in candidates.iter_mut().zip(base_scores) {
            let factors = self.compute_factors(candidate, context, boost_factors).await;
            let area_in_explicit_set =
                candidate.entity.area.as_ref().is_some_and(|area| context.areas_mentioned.contains(area));

            let final_score = if area_in_explicit_set && base > 0.0 {
                base * (1.0 + 0.5 * factors.context_boost)
            } else {
                base + factors.context_boost
            };
            candidate.score = final_score;
            candidate.final_score = Some(final_score);
            candidate.has_active_value = factors.has_active_value;
            candidate.unavailable = factors.unavailable;
        }

        candidates.sort_by(|a, b| {
            b.final_score.unwrap_or(0.0).partial_cmp(&a.final_score.unwrap_or(0.0)).unwrap_or(std::cmp::Ordering::Equal)
        });

        let filtered = self.filter(candidates, scope, k).await;
        Ok(self.split_primary_related(filtered))
    }

    async fn compute_factors(
        &self,
        candidate: &Candidate,
        context: &ConversationContext,
        boost_factors: &BoostFactors,
    ) -> ScoreFactors {
        let entity = &candidate.entity;
        let mut context_boost = 0.0;

        if let Some(area) = &entity.area {
            if let Some(boost) = boost_factors.area_boosts.get(area) {
                let exact = context.areas_mentioned.contains(area);
                let partial = context.areas_mentioned.iter().any(|a| area.contains(a.as_str()) || a.contains(area.as_str()));
                if exact {
                    context_boost += boost - 1.0;
                } else if partial {
                    context_boost += (boost - 1.0) / 2.0;
                }
            }
        }

        if context.domains_mentioned.contains(&entity.domain) {
            if let Some(boost) = boost_factors.domain_boosts.get(&entity.domain) {
                context_boost += boost - 1.0;
            }
        }

        if let Some(device_class) = &entity.device_class {
            if context.device_classes_mentioned.contains(device_class) {
                if let Some(boost) = boost_factors.device_class_boosts.get(device_class) {
                    context_boost += boost - 1.0;
                }
            }
        }

        if context.previous_entities.contains(&entity.entity_id) {
            context_boost += PREVIOUS_MENTION_BOOST;
        }

        if context.intent == Intent::Control && CONTROLLABLE_DOMAINS.contains(&entity.domain.as_str()) {
            context_boost += CONTROLLABLE_BOOST;
        }
        if context.intent == Intent::Read && entity.domain == "sensor" {
            context_boost += READABLE_BOOST;
        }

        let mut has_active_value = false;
        let mut unavailable = false;
        if entity.domain == "sensor" {
            match self.live_state.resolve(&entity.entity_id).await {
                Some(_) => {
                    has_active_value = true;
                    context_boost += ACTIVE_VALUE_BOOST;
                }
                None => {
                    unavailable = true;
                    context_boost += UNAVAILABLE_PENALTY;
                }
            }
        }

        ScoreFactors { context_boost, has_active_value, unavailable }
    }

    async fn filter(&self, candidates: Vec<Candidate>, scope: Scope, k: usize) -> Vec<Candidate> {
        let n = candidates.len();
        let target = match scope {
            Scope::Micro => 8.min(n),
            Scope::Macro => k.min(n),
            Scope::Overview => (k + 8).min(n),
        };

        let above_threshold: Vec<Candidate> =
            candidates.into_iter().filter(|c| c.final_score.unwrap_or(0.0) >= MIN_FINAL_SCORE).collect();
        let mut top_target: Vec<Candidate> = above_threshold.into_iter().take(target).collect();

        // Within the top-2k pool, stable-sort active sensors first so step 4's
        // "fill from active sensors, then fill the remainder" lands naturally
        // out of a straightforward truncate to `target`.
        let pool_size = (2 * k).min(top_target.len());
        top_target[..pool_size].sort_by_key(|c| !self.is_preferred_active_sensor(c));

        top_target
    }

    fn is_preferred_active_sensor(&self, candidate: &Candidate) -> bool {
        candidate.has_active_value && !candidate.unavailable
    }

    fn split_primary_related(&self, filtered: Vec<Candidate>) -> (Vec<Candidate>, Vec<Candidate>) {
        let cap = (filtered.len() / 2).clamp(1, 6);
        let mut primary = Vec::new();
        let mut related = Vec::new();
        let mut primary_areas: HashSet<String> = HashSet::new();
        let mut primary_device_classes: HashSet<String> = HashSet::new();

        for (index, candidate) in filtered.into_iter().enumerate() {
            let is_top_of_list = index == 0 && candidate.final_score.unwrap_or(0.0) >= MIN_FINAL_SCORE;
            let same_area_new_class = candidate
                .entity
                .area
                .as_ref()
                .is_some_and(|area| primary_areas.contains(area))
                && candidate
                    .entity
                    .device_class
                    .as_ref()
                    .is_some_and(|dc| !primary_device_classes.contains(dc));

            let device_class_room = match &candidate.entity.device_class {
                Some(dc) => primary_device_classes.contains(dc) || primary_device_classes.len() < MAX_PRIMARY_DEVICE_CLASSES,
                None => true,
            };

            let qualifies = is_top_of_list || same_area_new_class;

            if qualifies && primary.len() < cap && device_class_room {
                if let Some(area) = &candidate.entity.area {
                    primary_areas.insert(area.clone());
                }
                if let Some(dc) = &candidate.entity.device_class {
                    primary_device_classes.insert(dc.clone());
                }
                primary.push(candidate);
            } else {
                related.push(candidate);
            }
        }

        (primary, related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::Entity;
    use std::collections::HashMap;

    struct FixedScorer {
        scores: Vec<f32>,
    }

    #[async_trait]
    impl CrossEncoder for FixedScorer {
        async fn predict(&self, pairs: &[(String, String)]) -> hearth_rag::Result<Vec<f32>> {
            let _ = pairs;
            Ok(self.scores.clone())
        }
    }

    struct NoLiveState;

    #[async_trait]
    impl LiveStateLookup for NoLiveState {
        async fn resolve(&self, _entity_id: &str) -> Option<EntityState> {
            None
        }
    }

    struct AlwaysLiveState;

    #[async_trait]
    impl LiveStateLookup for AlwaysLiveState {
        async fn resolve(&self, _entity_id: &str) -> Option<EntityState> {
            Some(EntityState { state: "22.5".to_string(), unit: None, attributes: serde_json::Value::Null })
        }
    }

    fn entity(id: &str, area: &str, domain: &str) -> Entity {
        Entity {
            entity_id: id.to_string(),
            domain: domain.to_string(),
            device_class: Some("humidity".to_string()),
            area: Some(area.to_string()),
            friendly_name: None,
            device_id: None,
            text: format!("{id} description"),
            embedding: vec![],
            attributes: serde_json::Value::Null,
            state: None,
        }
    }

    fn context_with_area(area: &str) -> ConversationContext {
        ConversationContext {
            areas_mentioned: [area.to_string()].into_iter().collect(),
            domains_mentioned: ["sensor".to_string()].into_iter().collect(),
            device_classes_mentioned: std::collections::HashSet::new(),
            previous_entities: std::collections::HashSet::new(),
            is_follow_up: false,
            intent: Intent::Read,
            confidence: 0.8,
        }
    }

    #[tokio::test]
    async fn active_value_candidate_outranks_unavailable_one() {
        let candidates = vec![
            Candidate::from_entity(entity("sensor.a", "kert", "sensor"), 0.0),
            Candidate::from_entity(entity("sensor.b", "kert", "sensor"), 0.0),
        ];
        let boost_factors = BoostFactors {
            area_boosts: HashMap::from([("kert".to_string(), 2.0)]),
            domain_boosts: HashMap::from([("sensor".to_string(), 1.5)]),
            device_class_boosts: HashMap::new(),
        };
        let reranker = Reranker::new(FixedScorer { scores: vec![0.5, 0.5] }, AlwaysLiveState);
        let (primary, _related) = reranker
            .rerank(candidates, "kert nedvesség", &context_with_area("kert"), &boost_factors, Scope::Macro, 10)
            .await
            .unwrap();
        assert!(!primary.is_empty());
        assert!(primary[0].final_score.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn unavailable_sensor_gets_penalized_relative_to_base() {
        let candidates = vec![Candidate::from_entity(entity("sensor.a", "kert", "sensor"), 0.0)];
        let boost_factors = BoostFactors::default();
        let reranker = Reranker::new(FixedScorer { scores: vec![0.8] }, NoLiveState);
        let (primary, related) = reranker
            .rerank(candidates, "kert nedvesség", &context_with_area("nappali"), &boost_factors, Scope::Macro, 10)
            .await
            .unwrap();
        let scored = primary.first().or(related.first()).unwrap();
        assert!(scored.final_score.unwrap() < 0.8);
    }

    #[tokio::test]
    async fn empty_candidates_returns_empty_split() {
        let reranker = Reranker::new(FixedScorer { scores: vec![] }, NoLiveState);
        let (primary, related) = reranker
            .rerank(vec![], "q", &context_with_area("kert"), &BoostFactors::default(), Scope::Micro, 8)
            .await
            .unwrap();
        assert!(primary.is_empty() && related.is_empty());
    }

}
