//! Conversation analyzer (C5, `spec.md §4.2`).

use crate::types::{BoostFactors, ConversationContext};
use hearth_core::Intent;
use hearth_utils::patterns::{
    area_patterns, control_verb_patterns, domain_patterns, follow_up_patterns, DomainPatternSet,
};
use hearth_utils::text::{contains_pattern, normalize};
use std::collections::HashSet;

/// Generic "house-wide" area key, boosted less aggressively than a specific area.
const HOUSE_AREA: &str = "haz";

const AREA_BOOST_GENERIC: f32 = 1.2;
const AREA_BOOST_SPECIFIC: f32 = 2.0;
const FOLLOW_UP_MULTIPLIER: f32 = 1.5;
const DOMAIN_BOOST: f32 = 1.5;
const DEVICE_CLASS_BOOST: f32 = 2.0;

const FALLBACK_CONFIDENCE: f32 = 0.4;
const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// A single chat turn, for history scanning.
#[derive(Debug, Clone)]
pub struct Turn {
    /// `"user"`, `"assistant"` or `"system"`.
    pub role: String,
    /// Turn text.
    pub content: String,
}

/// Analyzes an utterance plus its history into a [`ConversationContext`] and
/// the [`BoostFactors`] the reranker (C12) consumes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConversationAnalyzer;

impl ConversationAnalyzer {
    /// Run the full algorithm from `spec.md §4.2`.
    #[must_use]
    pub fn analyze(&self, utterance: &str, history: &[Turn]) -> (ConversationContext, BoostFactors) {
        let normalized = normalize(utterance);

        let mut areas_mentioned = detect_areas(&normalized);
        let domains_mentioned = detect_domains(&normalized);
        let device_classes_mentioned = detect_device_classes(&normalized);

        let is_follow_up = follow_up_patterns().iter().any(|p| contains_pattern(&normalized, p));
        if is_follow_up && areas_mentioned.is_empty() {
            areas_mentioned = inherit_areas_from_history(history);
        }

        let previous_entities = extract_previous_entities(history);

        let intent = if control_verb_patterns().iter().any(|p| contains_pattern(&normalized, p)) {
            Intent::Control
        } else {
            Intent::Read
        };

        let confidence = compute_confidence(&areas_mentioned, &domains_mentioned, is_follow_up);

        let context = ConversationContext {
            areas_mentioned: areas_mentioned.clone(),
            domains_mentioned: domains_mentioned.clone(),
            device_classes_mentioned,
            previous_entities,
            is_follow_up,
            intent,
            confidence,
        };

        let boost_factors = build_boost_factors(&areas_mentioned, &domains_mentioned, is_follow_up);

        (context, boost_factors)
    }
}

fn detect_areas(normalized: &str) -> HashSet<String> {
    area_patterns()
        .into_iter()
        .filter(|(_, patterns)| patterns.iter().any(|p| contains_pattern(normalized, p)))
        .map(|(area, _)| area.to_string())
        .collect()
}

fn detect_domains(normalized: &str) -> HashSet<String> {
    domain_patterns()
        .into_iter()
        .filter(|(_, pattern_set)| match pattern_set {
            DomainPatternSet::Flat(patterns) => patterns.iter().any(|p| contains_pattern(normalized, p)),
            DomainPatternSet::Nested(map) => {
                map.values().any(|patterns| patterns.iter().any(|p| contains_pattern(normalized, p)))
            }
        })
        .map(|(domain, _)| domain.to_string())
        .collect()
}

fn detect_device_classes(normalized: &str) -> HashSet<String> {
    let mut device_classes = HashSet::new();
    if let Some(DomainPatternSet::Nested(map)) = domain_patterns().get("sensor") {
        for (device_class, patterns) in map {
            if patterns.iter().any(|p| contains_pattern(normalized, p)) {
                device_classes.insert((*device_class).to_string());
            }
        }
    }
    device_classes
}

/// Up to the three most-recent user messages' inherited areas, for a follow-up
/// that named no explicit area of its own (`spec.md §4.2` step 5).
fn inherit_areas_from_history(history: &[Turn]) -> HashSet<String> {
    history
        .iter()
        .rev()
        .filter(|turn| turn.role == "user")
        .take(3)
        .flat_map(|turn| detect_areas(&normalize(&turn.content)))
        .collect()
}

/// Scans the last 5 messages for system-emitted `Relevant entities: a.b,c.d` lines.
fn extract_previous_entities(history: &[Turn]) -> HashSet<String> {
    const MARKER: &str = "relevant entities:";
    history
        .iter()
        .rev()
        .take(5)
        .filter(|turn| turn.role == "system")
        .flat_map(|turn| {
            let lower = turn.content.to_lowercase();
            lower.find(MARKER).map(|pos| {
                turn.content[pos + MARKER.len()..]
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
        })
        .flatten()
        .collect()
}

fn compute_confidence(areas: &HashSet<String>, domains: &HashSet<String>, is_follow_up: bool) -> f32 {
    if areas.is_empty() && domains.is_empty() {
        return FALLBACK_CONFIDENCE;
    }
    let mut confidence = FALLBACK_CONFIDENCE;
    if !areas.is_empty() {
        confidence += 0.2;
    }
    if !domains.is_empty() {
        confidence += 0.2;
    }
    if is_follow_up {
        confidence += 0.1;
    }
    confidence.max(CONFIDENCE_THRESHOLD).min(1.0)
}

fn build_boost_factors(areas: &HashSet<String>, domains: &HashSet<String>, is_follow_up: bool) -> BoostFactors {
    let follow_up_multiplier = if is_follow_up { FOLLOW_UP_MULTIPLIER } else { 1.0 };

    let area_boosts = areas
        .iter()
        .map(|area| {
            let base = if area == HOUSE_AREA { AREA_BOOST_GENERIC } else { AREA_BOOST_SPECIFIC };
            (area.clone(), base * follow_up_multiplier)
        })
        .collect();

    let domain_boosts = domains.iter().map(|domain| (domain.clone(), DOMAIN_BOOST)).collect();

    let device_class_boosts = detect_device_classes_from_domains(domains)
        .into_iter()
        .map(|device_class| (device_class, DEVICE_CLASS_BOOST))
        .collect();

    BoostFactors { area_boosts, domain_boosts, device_class_boosts }
}

/// Helper kept separate from [`detect_device_classes`] since boost-factor
/// construction works from the already-detected domain set, not raw text.
fn detect_device_classes_from_domains(domains: &HashSet<String>) -> HashSet<String> {
    let mut device_classes = HashSet::new();
    if domains.contains("sensor") {
        if let Some(DomainPatternSet::Nested(map)) = domain_patterns().get("sensor") {
            device_classes.extend(map.keys().map(|k| (*k).to_string()));
        }
    }
    device_classes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garden_humidity_query_detects_area_and_domain() {
        let analyzer = ConversationAnalyzer;
        let (context, _) = analyzer.analyze("Mekkora a nedvesség a kertben?", &[]);
        assert!(context.areas_mentioned.contains("kert"));
        assert!(context.domains_mentioned.contains("sensor"));
        assert_eq!(context.intent, Intent::Read);
        assert!(context.confidence >= 0.5);
    }

    #[test]
    fn control_verb_yields_control_intent() {
        let analyzer = ConversationAnalyzer;
        let (context, _) = analyzer.analyze("kapcsold fel az összes lámpát a konyhában", &[]);
        assert_eq!(context.intent, Intent::Control);
    }

    #[test]
    fn follow_up_inherits_area_from_recent_user_turns() {
        let analyzer = ConversationAnalyzer;
        let history = vec![
            Turn { role: "user".to_string(), content: "Hány fok van a nappaliban?".to_string() },
            Turn { role: "assistant".to_string(), content: "A nappaliban 22.5 fok van.".to_string() },
        ];
        let (context, _) = analyzer.analyze("És a kertben?", &history);
        assert!(context.is_follow_up);
    }

    #[test]
    fn previous_entities_are_parsed_from_system_turns() {
        let analyzer = ConversationAnalyzer;
        let history = vec![Turn {
            role: "system".to_string(),
            content: "Relevant entities: sensor.kert_humidity,sensor.nappali_temperature".to_string(),
        }];
        let (context, _) = analyzer.analyze("mi van még?", &history);
        assert!(context.previous_entities.contains("sensor.kert_humidity"));
        assert!(context.previous_entities.contains("sensor.nappali_temperature"));
    }

    #[test]
    fn garbage_query_falls_back_to_default_confidence() {
        let analyzer = ConversationAnalyzer;
        let (context, _) = analyzer.analyze("qwerty 12345", &[]);
        assert!((context.confidence - FALLBACK_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn house_area_gets_generic_boost_others_get_specific_boost() {
        let analyzer = ConversationAnalyzer;
        let (_, boosts) = analyzer.analyze("mi a helyzet otthon a kertben?", &[]);
        assert!((boosts.area_boosts["haz"] - AREA_BOOST_GENERIC).abs() < f32::EPSILON);
        assert!((boosts.area_boosts["kert"] - AREA_BOOST_SPECIFIC).abs() < f32::EPSILON);
    }

    #[test]
    fn follow_up_multiplies_area_boost() {
        let analyzer = ConversationAnalyzer;
        let history = vec![Turn { role: "user".to_string(), content: "Hány fok van?".to_string() }];
        let (_, boosts) = analyzer.analyze("és a kertben?", &history);
        assert!((boosts.area_boosts["kert"] - AREA_BOOST_SPECIFIC * FOLLOW_UP_MULTIPLIER).abs() < 1e-5);
    }
}
