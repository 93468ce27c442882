//! Memory-boost integration at retrieval time (`spec.md §4.6`, steps 1-4):
//! candidates the session remembers get boosted, highly-relevant remembered
//! entities absent from the candidate set get synthesized in.

use crate::types::{Candidate, ConversationContext};
use hearth_core::Entity;
use hearth_memory::MemoryEntity;
use serde_json::Value;

const SYNTHETIC_RELEVANCE_THRESHOLD: f32 = 1.5;
const MEMORY_RELEVANCE_WEIGHT: f32 = 0.5;

/// Apply memory boosts to `candidates` in place and append any synthesized
/// candidates for highly-relevant memory entities that were not retrieved.
pub fn apply_memory_boost(candidates: &mut Vec<Candidate>, memory: &[MemoryEntity], context: &mut ConversationContext) {
    for candidate in candidates.iter_mut() {
        if let Some(remembered) = memory.iter().find(|m| m.entity_id == candidate.entity.entity_id) {
            let factor = remembered.boost_weight * (1.0 + MEMORY_RELEVANCE_WEIGHT * remembered.memory_relevance);
            candidate.score *= factor;
            candidate.memory_boosted = true;
            candidate.memory_boost = Some(factor);
            candidate.memory_relevance = Some(remembered.memory_relevance);
        }
    }

    let present: std::collections::HashSet<&str> = candidates.iter().map(|c| c.entity.entity_id.as_str()).collect();
    for remembered in memory {
        if remembered.memory_relevance <= SYNTHETIC_RELEVANCE_THRESHOLD || present.contains(remembered.entity_id.as_str()) {
            continue;
        }
        candidates.push(synthesize_candidate(remembered));
    }

    expand_context_with_memory(context, memory);
}

fn synthesize_candidate(remembered: &MemoryEntity) -> Candidate {
    let entity = Entity {
        entity_id: remembered.entity_id.clone(),
        domain: remembered.domain.clone().unwrap_or_default(),
        device_class: None,
        area: remembered.area.clone(),
        friendly_name: None,
        // A memory-only synthetic entity has no known owning device.
        device_id: None,
        text: remembered.entity_id.clone(),
        embedding: Vec::new(),
        attributes: Value::Null,
        state: None,
    };
    let mut candidate = Candidate::from_entity(entity, remembered.relevance_score * remembered.boost_weight);
    candidate.synthetic_from_memory = true;
    candidate.memory_boosted = true;
    candidate.memory_boost = Some(remembered.boost_weight);
    candidate.memory_relevance = Some(remembered.memory_relevance);
    candidate
}

fn expand_context_with_memory(context: &mut ConversationContext, memory: &[MemoryEntity]) {
    for remembered in memory {
        if let Some(area) = &remembered.area {
            context.areas_mentioned.insert(area.clone());
        }
        if let Some(domain) = &remembered.domain {
            context.domains_mentioned.insert(domain.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hearth_core::Intent;
    use std::collections::HashSet;

    fn base_context() -> ConversationContext {
        ConversationContext {
            areas_mentioned: HashSet::new(),
            domains_mentioned: HashSet::new(),
            device_classes_mentioned: HashSet::new(),
            previous_entities: HashSet::new(),
            is_follow_up: false,
            intent: Intent::Read,
            confidence: 0.8,
        }
    }

    fn entity(id: &str) -> Entity {
        Entity {
            entity_id: id.to_string(),
            domain: "sensor".to_string(),
            device_class: Some("humidity".to_string()),
            area: Some("kert".to_string()),
            friendly_name: None,
            device_id: None,
            text: "kert humidity".to_string(),
            embedding: vec![],
            attributes: Value::Null,
            state: None,
        }
    }

    fn memory_entity(id: &str, memory_relevance: f32, boost: f32) -> MemoryEntity {
        MemoryEntity {
            entity_id: id.to_string(),
            domain: Some("sensor".to_string()),
            area: Some("kert".to_string()),
            relevance_score: memory_relevance,
            memory_relevance,
            boost_weight: boost,
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn boosts_matching_candidate_score_upward() {
        let mut candidates = vec![Candidate::from_entity(entity("sensor.a"), 1.0)];
        let memory = vec![memory_entity("sensor.a", 0.8, 1.5)];
        let mut context = base_context();
        apply_memory_boost(&mut candidates, &memory, &mut context);
        assert!(candidates[0].score > 1.0);
        assert!(candidates[0].memory_boosted);
        assert_eq!(candidates[0].memory_relevance, Some(0.8));
    }

    #[test]
    fn highly_relevant_absent_memory_entity_is_synthesized() {
        let mut candidates: Vec<Candidate> = vec![];
        let memory = vec![memory_entity("sensor.missing", 2.0, 1.2)];
        let mut context = base_context();
        apply_memory_boost(&mut candidates, &memory, &mut context);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].synthetic_from_memory);
    }

    #[test]
    fn low_relevance_absent_memory_entity_is_not_synthesized() {
        let mut candidates: Vec<Candidate> = vec![];
        let memory = vec![memory_entity("sensor.missing", 0.5, 1.0)];
        let mut context = base_context();
        apply_memory_boost(&mut candidates, &memory, &mut context);
        assert!(candidates.is_empty());
    }

    #[test]
    fn synthesis_threshold_keys_off_memory_relevance_not_relevance_score() {
        let mut candidates: Vec<Candidate> = vec![];
        let mut remembered = memory_entity("sensor.missing", 0.4, 1.0);
        remembered.relevance_score = 2.0;
        let mut context = base_context();
        apply_memory_boost(&mut candidates, std::slice::from_ref(&remembered), &mut context);
        assert!(candidates.is_empty(), "a high relevance_score alone must not trigger synthesis");
    }

    #[test]
    fn memory_expands_area_and_domain_sets() {
        let mut candidates: Vec<Candidate> = vec![];
        let memory = vec![memory_entity("sensor.a", 0.5, 1.0)];
        let mut context = base_context();
        apply_memory_boost(&mut candidates, &memory, &mut context);
        assert!(context.areas_mentioned.contains("kert"));
        assert!(context.domains_mentioned.contains("sensor"));
    }
}
