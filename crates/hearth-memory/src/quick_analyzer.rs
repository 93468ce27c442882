//! Synchronous quick-pattern analyzer, the `<=50ms` companion to the async
//! enricher (`spec.md §4.6`).

use crate::types::{Language, QueryType, QuickContext};
use hearth_utils::patterns::{
    area_patterns, control_verb_patterns, domain_patterns, house_wide_words, quantity_words,
    DomainPatternSet,
};
use hearth_utils::text::{contains_pattern, normalize};
use std::collections::HashSet;

const HUNGARIAN_DIACRITICS: [char; 9] = ['á', 'é', 'í', 'ó', 'ö', 'ő', 'ú', 'ü', 'ű'];
const ENGLISH_MARKERS: [&str; 6] = ["what", "how", "the", "is", "turn", "house"];

/// Purely keyword-table-driven analysis of a single utterance, with no I/O —
/// designed to run in well under the background enricher's budget.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuickPatternAnalyzer;

impl QuickPatternAnalyzer {
    /// Analyze `utterance`, producing a [`QuickContext`].
    #[must_use]
    pub fn analyze(&self, utterance: &str) -> QuickContext {
        let normalized = normalize(utterance);

        let mut detected_areas = HashSet::new();
        for (area, patterns) in area_patterns() {
            if patterns.iter().any(|p| contains_pattern(&normalized, p)) {
                detected_areas.insert(area.to_string());
            }
        }

        let mut detected_domains = HashSet::new();
        for (domain, pattern_set) in domain_patterns() {
            let matched = match &pattern_set {
                DomainPatternSet::Flat(patterns) => patterns.iter().any(|p| contains_pattern(&normalized, p)),
                DomainPatternSet::Nested(map) => {
                    map.values().any(|patterns| patterns.iter().any(|p| contains_pattern(&normalized, p)))
                }
            };
            if matched {
                detected_domains.insert(domain.to_string());
            }
        }

        let mut entity_patterns: Vec<String> = Vec::new();
        for domain in &detected_domains {
            for area in &detected_areas {
                entity_patterns.push(format!("{domain}.{area}"));
            }
        }

        let is_control = control_verb_patterns().iter().any(|p| contains_pattern(&normalized, p));
        let is_house_wide = house_wide_words().iter().any(|p| contains_pattern(&normalized, p))
            || quantity_words().iter().any(|p| contains_pattern(&normalized, p));

        let query_type = if is_house_wide {
            QueryType::Overview
        } else if is_control {
            QueryType::Control
        } else if !detected_domains.is_empty() || !detected_areas.is_empty() {
            QueryType::StatusCheck
        } else {
            QueryType::Unknown
        };

        let language = if normalized.chars().any(|c| HUNGARIAN_DIACRITICS.contains(&c)) {
            Language::Hungarian
        } else if ENGLISH_MARKERS.iter().any(|m| contains_pattern(&normalized, m)) {
            Language::English
        } else {
            Language::Hungarian
        };

        let mut confidence: f32 = 0.4;
        if !detected_areas.is_empty() {
            confidence += 0.2;
        }
        if !detected_domains.is_empty() {
            confidence += 0.2;
        }
        if !matches!(query_type, QueryType::Unknown) {
            confidence += 0.1;
        }

        QuickContext {
            detected_domains,
            detected_areas,
            entity_patterns,
            query_type,
            language,
            confidence: confidence.min(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_area_and_domain_for_garden_humidity_query() {
        let analyzer = QuickPatternAnalyzer;
        let context = analyzer.analyze("Mekkora a nedvesség a kertben?");
        assert!(context.detected_areas.contains("kert"));
        assert!(context.detected_domains.contains("sensor"));
        assert_eq!(context.language, Language::Hungarian);
    }

    #[test]
    fn control_verb_yields_control_query_type() {
        let analyzer = QuickPatternAnalyzer;
        let context = analyzer.analyze("kapcsold fel a lámpát a konyhában");
        assert_eq!(context.query_type, QueryType::Control);
    }

    #[test]
    fn house_wide_words_yield_overview_query_type() {
        let analyzer = QuickPatternAnalyzer;
        let context = analyzer.analyze("mi a helyzet otthon?");
        assert_eq!(context.query_type, QueryType::Overview);
    }

    #[test]
    fn unmatched_query_has_low_confidence_and_unknown_type() {
        let analyzer = QuickPatternAnalyzer;
        let context = analyzer.analyze("zzz qpr flub");
        assert_eq!(context.query_type, QueryType::Unknown);
        assert!(context.confidence <= 0.4);
    }

    #[test]
    fn entity_patterns_combine_detected_domain_and_area() {
        let analyzer = QuickPatternAnalyzer;
        let context = analyzer.analyze("hőmérséklet a kertben");
        assert!(context.entity_patterns.contains(&"sensor.kert".to_string()));
    }
}
