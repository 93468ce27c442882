//! Response diagnostics (C15, `spec.md §4.10`): a weighted-mean quality score
//! over the pipeline's four observable stages, attached to response metadata.

use crate::types::{RankedContext, ScopeDecision};
use crate::ConversationContext;

const WEIGHT_CONVERSATION_ANALYSIS: f32 = 0.2;
const WEIGHT_SCOPE_DETECTION: f32 = 0.25;
const WEIGHT_ENTITY_RETRIEVAL: f32 = 0.35;
const WEIGHT_CONTEXT_FORMATTING: f32 = 0.2;
const LOW_SCORE_THRESHOLD: f32 = 0.5;
const MIN_EXPECTED_CONTEXT_LEN: usize = 20;

/// Quality summary for one pipeline run, attached to the response metadata.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Diagnostics {
    pub conversation_analysis: f32,
    pub scope_detection: f32,
    pub entity_retrieval: f32,
    pub context_formatting: f32,
    pub overall_quality: f32,
    pub recommendations: Vec<String>,
}

/// Score the conversation-analysis stage from the analyzer's own confidence.
fn conversation_analysis_score(context: &ConversationContext) -> f32 {
    context.confidence.clamp(0.0, 1.0)
}

/// Score the scope-detection stage from the detector's own confidence.
fn scope_detection_score(scope: &ScopeDecision) -> f32 {
    scope.scope_confidence.clamp(0.0, 1.0)
}

/// Score entity retrieval from the fraction of the raw candidate pool that
/// survived into the final primary/related split, and the mean final score
/// of what survived.
fn entity_retrieval_score(candidate_pool_size: usize, ranked: &RankedContext) -> f32 {
    let kept = ranked.primary.len() + ranked.related.len();
    if candidate_pool_size == 0 || kept == 0 {
        return 0.0;
    }
    let coverage = (kept as f32 / candidate_pool_size as f32).min(1.0);
    let mean_score: f32 = ranked
        .primary
        .iter()
        .chain(ranked.related.iter())
        .map(|c| c.final_score.unwrap_or(c.score).clamp(0.0, 1.0))
        .sum::<f32>()
        / kept as f32;
    (0.5 * coverage + 0.5 * mean_score).clamp(0.0, 1.0)
}

/// Score context formatting from whether a non-trivial prompt was actually
/// produced.
fn context_formatting_score(ranked: &RankedContext) -> f32 {
    let len = ranked.formatted_context.trim().len();
    if len == 0 {
        0.0
    } else if len < MIN_EXPECTED_CONTEXT_LEN {
        0.5
    } else {
        1.0
    }
}

/// Evaluate the full diagnostics report for one pipeline run.
#[must_use]
pub fn evaluate(context: &ConversationContext, scope: &ScopeDecision, candidate_pool_size: usize, ranked: &RankedContext) -> Diagnostics {
    let conversation_analysis = conversation_analysis_score(context);
    let scope_detection = scope_detection_score(scope);
    let entity_retrieval = entity_retrieval_score(candidate_pool_size, ranked);
    let context_formatting = context_formatting_score(ranked);

    let overall_quality = WEIGHT_CONVERSATION_ANALYSIS * conversation_analysis
        + WEIGHT_SCOPE_DETECTION * scope_detection
        + WEIGHT_ENTITY_RETRIEVAL * entity_retrieval
        + WEIGHT_CONTEXT_FORMATTING * context_formatting;

    let mut recommendations = Vec::new();
    if conversation_analysis < LOW_SCORE_THRESHOLD {
        recommendations.push("conversation analysis had low confidence; consider widening pattern tables or checking language detection".to_string());
    }
    if scope_detection < LOW_SCORE_THRESHOLD {
        recommendations.push("scope detection fell back to a length heuristic; the utterance may need a dedicated rule".to_string());
    }
    if entity_retrieval < LOW_SCORE_THRESHOLD {
        recommendations.push("retrieval returned a sparse or low-scoring candidate pool; check store coverage for this query".to_string());
    }
    if context_formatting < LOW_SCORE_THRESHOLD {
        recommendations.push("formatted context was empty or too short to be useful".to_string());
    }

    Diagnostics { conversation_analysis, scope_detection, entity_retrieval, context_formatting, overall_quality, recommendations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candidate, FormatterStrategy};
    use hearth_core::{Entity, Intent, Scope};
    use std::collections::HashSet;

    fn context(confidence: f32) -> ConversationContext {
        ConversationContext {
            areas_mentioned: HashSet::new(),
            domains_mentioned: HashSet::new(),
            device_classes_mentioned: HashSet::new(),
            previous_entities: HashSet::new(),
            is_follow_up: false,
            intent: Intent::Read,
            confidence,
        }
    }

    fn scope(confidence: f32) -> ScopeDecision {
        ScopeDecision { scope: Scope::Macro, k: 22, scope_confidence: confidence, scope_reasoning: "test".to_string(), preferred_formatter: None }
    }

    fn entity(id: &str) -> Entity {
        Entity {
            entity_id: id.to_string(),
            domain: "sensor".to_string(),
            device_class: None,
            area: None,
            friendly_name: None,
            device_id: None,
            text: String::new(),
            embedding: vec![],
            attributes: serde_json::Value::Null,
            state: None,
        }
    }

    fn ranked_with(formatted: &str, scores: &[f32]) -> RankedContext {
        let primary: Vec<Candidate> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mut c = Candidate::from_entity(entity(&format!("sensor.{i}")), *s);
                c.final_score = Some(*s);
                c
            })
            .collect();
        RankedContext { primary, related: vec![], formatter_type: FormatterStrategy::Detailed, formatted_context: formatted.to_string() }
    }

    #[test]
    fn high_confidence_inputs_yield_high_overall_quality() {
        let ranked = ranked_with("a reasonably long formatted context body", &[0.9, 0.8]);
        let diag = evaluate(&context(0.9), &scope(0.9), 2, &ranked);
        assert!(diag.overall_quality > 0.7, "expected high quality, got {}", diag.overall_quality);
        assert!(diag.recommendations.is_empty());
    }

    #[test]
    fn empty_formatted_context_flags_a_recommendation() {
        let ranked = ranked_with("", &[0.9]);
        let diag = evaluate(&context(0.9), &scope(0.9), 1, &ranked);
        assert_eq!(diag.context_formatting, 0.0);
        assert!(diag.recommendations.iter().any(|r| r.contains("empty")));
    }

    #[test]
    fn empty_candidate_pool_yields_zero_entity_retrieval() {
        let ranked = RankedContext { primary: vec![], related: vec![], formatter_type: FormatterStrategy::Detailed, formatted_context: "x".repeat(30) };
        let diag = evaluate(&context(0.9), &scope(0.9), 5, &ranked);
        assert_eq!(diag.entity_retrieval, 0.0);
    }

    #[test]
    fn low_scope_confidence_flags_a_recommendation() {
        let ranked = ranked_with("a reasonably long formatted context body", &[0.9]);
        let diag = evaluate(&context(0.9), &scope(0.2), 1, &ranked);
        assert!(diag.recommendations.iter().any(|r| r.contains("scope detection")));
    }
}
