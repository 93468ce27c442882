//! Query rewriter (C6, `spec.md §4.3`).

use crate::analyzer::Turn;
use crate::types::{RewriteMethod, RewriteResult};
use async_trait::async_trait;
use hearth_core::Intent;
use hearth_utils::patterns::{control_verb_patterns, follow_up_patterns, read_patterns};
use hearth_utils::text::{contains_pattern, normalize, token_count};
use std::sync::Arc;
use std::time::{Duration, Instant};

const LLM_CONFIDENCE: f32 = 0.85;
const RULE_CONFIDENCE: f32 = 0.6;
const NO_REWRITE_CONFIDENCE: f32 = 1.0;
const ERROR_CONFIDENCE: f32 = 0.0;
const SHORT_QUERY_TOKEN_THRESHOLD: usize = 3;

/// Pluggable LLM backend the rewriter's LLM path calls through.
#[async_trait]
pub trait RewriteLlmClient: Send + Sync {
    /// Produce a rewritten query from a few-shot prompt built from `history`
    /// and `current`. Implementations should return only the rewritten text;
    /// quote-stripping and label-filtering are done by the caller.
    async fn rewrite(&self, current: &str, history: &[Turn]) -> anyhow::Result<String>;
}

#[async_trait]
impl RewriteLlmClient for Arc<dyn RewriteLlmClient> {
    async fn rewrite(&self, current: &str, history: &[Turn]) -> anyhow::Result<String> {
        self.as_ref().rewrite(current, history).await
    }
}

/// Resolves coreferences so retrieval sees a standalone query.
pub struct QueryRewriter<C: RewriteLlmClient> {
    llm: Option<C>,
    llm_deadline: Duration,
    max_llm_turns: usize,
}

impl<C: RewriteLlmClient> QueryRewriter<C> {
    /// Build a rewriter. `llm = None` behaves as the `disabled` path whenever
    /// the LLM path would otherwise be taken.
    #[must_use]
    pub fn new(llm: Option<C>, llm_deadline: Duration) -> Self {
        Self { llm, llm_deadline, max_llm_turns: 4 }
    }

    /// Run the rewrite algorithm from `spec.md §4.3`.
    pub async fn rewrite(&self, current: &str, history: &[Turn]) -> RewriteResult {
        let start = Instant::now();
        let normalized = normalize(current);

        if history.is_empty() {
            return no_rewrite_needed(current, start);
        }

        let is_follow_up = follow_up_patterns().iter().any(|p| contains_pattern(&normalized, p));
        let is_short = token_count(current) <= SHORT_QUERY_TOKEN_THRESHOLD;
        if !is_follow_up && !is_short {
            return no_rewrite_needed(current, start);
        }

        match &self.llm {
            Some(llm) => self.rewrite_with_llm(llm, current, history, start).await,
            None => self.rewrite_rule_based(current, history, start),
        }
    }

    async fn rewrite_with_llm(&self, llm: &C, current: &str, history: &[Turn], start: Instant) -> RewriteResult {
        let recent = recent_turns(history, self.max_llm_turns);
        match tokio::time::timeout(self.llm_deadline, llm.rewrite(current, &recent)).await {
            Ok(Ok(raw)) => {
                let rewritten = clean_llm_output(&raw);
                RewriteResult {
                    original: current.to_string(),
                    rewritten,
                    confidence: LLM_CONFIDENCE,
                    method: RewriteMethod::Llm,
                    coreferences_resolved: Vec::new(),
                    intent_inherited: inherit_intent(history),
                    processing_time_ms: elapsed_ms(start),
                }
            }
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "llm rewrite failed, falling back to rule-based");
                self.rewrite_rule_based(current, history, start)
            }
            Err(_) => {
                tracing::debug!("llm rewrite timed out, falling back to rule-based");
                self.rewrite_rule_based(current, history, start)
            }
        }
    }

    fn rewrite_rule_based(&self, current: &str, history: &[Turn], start: Instant) -> RewriteResult {
        let Some(previous_intent) = infer_previous_intent_phrase(history) else {
            return RewriteResult {
                original: current.to_string(),
                rewritten: current.to_string(),
                confidence: ERROR_CONFIDENCE,
                method: RewriteMethod::Error,
                coreferences_resolved: Vec::new(),
                intent_inherited: None,
                processing_time_ms: elapsed_ms(start),
            };
        };

        let normalized = normalize(current);
        let (rewritten, resolved) = if let Some(area) = extract_es_a_area(&normalized) {
            (format!("{previous_intent} a {area}"), vec![format!("és a {area}")])
        } else if normalized.trim() == "ott" {
            (previous_intent.clone(), vec!["ott".to_string()])
        } else if let Some(tail) = strip_trailing_is(&normalized) {
            (format!("{previous_intent} {tail}"), vec!["is".to_string()])
        } else {
            (current.to_string(), Vec::new())
        };

        RewriteResult {
            original: current.to_string(),
            rewritten,
            confidence: RULE_CONFIDENCE,
            method: RewriteMethod::RuleBased,
            coreferences_resolved: resolved,
            intent_inherited: inherit_intent(history),
            processing_time_ms: elapsed_ms(start),
        }
    }
}

fn no_rewrite_needed(current: &str, start: Instant) -> RewriteResult {
    RewriteResult {
        original: current.to_string(),
        rewritten: current.to_string(),
        confidence: NO_REWRITE_CONFIDENCE,
        method: RewriteMethod::NoRewriteNeeded,
        coreferences_resolved: Vec::new(),
        intent_inherited: None,
        processing_time_ms: elapsed_ms(start),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn recent_turns(history: &[Turn], max_turns: usize) -> Vec<Turn> {
    history.iter().rev().take(max_turns).rev().cloned().collect()
}

/// Strips surrounding quotes and keeps the first non-empty, non-label line.
fn clean_llm_output(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.ends_with(':'))
        .unwrap_or(raw.trim())
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}

fn inherit_intent(history: &[Turn]) -> Option<Intent> {
    history.iter().rev().find(|turn| turn.role == "user").map(|turn| {
        let normalized = normalize(&turn.content);
        if control_verb_patterns().iter().any(|p| contains_pattern(&normalized, p)) {
            Intent::Control
        } else {
            Intent::Read
        }
    })
}

/// A short phrase describing what the previous user turn was asking for, used
/// as the stem the rule-based path substitutes the new area/tail into.
fn infer_previous_intent_phrase(history: &[Turn]) -> Option<String> {
    let previous = history.iter().rev().find(|turn| turn.role == "user")?;
    let normalized = normalize(&previous.content);
    let verb = read_patterns()
        .into_iter()
        .chain(control_verb_patterns())
        .find(|p| contains_pattern(&normalized, p))?;
    Some(verb.to_string())
}

fn extract_es_a_area(normalized: &str) -> Option<String> {
    let marker = "és a ";
    let pos = normalized.find(marker)?;
    let tail = &normalized[pos + marker.len()..];
    let area = tail.split_whitespace().next()?.trim_end_matches(['?', '!', '.']);
    if area.is_empty() {
        None
    } else {
        Some(area.to_string())
    }
}

fn strip_trailing_is(normalized: &str) -> Option<String> {
    let trimmed = normalized.trim_end_matches(['?', '!', '.']).trim();
    if trimmed.ends_with(" is") {
        let without_is = trimmed[..trimmed.len() - " is".len()].trim();
        if without_is.is_empty() {
            None
        } else {
            Some(without_is.to_string())
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopLlm;

    #[async_trait]
    impl RewriteLlmClient for NoopLlm {
        async fn rewrite(&self, _current: &str, _history: &[Turn]) -> anyhow::Result<String> {
            Ok("kert hőmérséklet".to_string())
        }
    }

    #[tokio::test]
    async fn empty_history_means_no_rewrite_needed() {
        let rewriter = QueryRewriter::<NoopLlm>::new(None, Duration::from_secs(2));
        let result = rewriter.rewrite("és a kertben?", &[]).await;
        assert_eq!(result.original, result.rewritten);
        assert_eq!(result.method, RewriteMethod::NoRewriteNeeded);
        assert!((result.confidence - NO_REWRITE_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn rule_based_rewrites_es_a_area_pattern() {
        let rewriter = QueryRewriter::<NoopLlm>::new(None, Duration::from_secs(2));
        let history = vec![Turn { role: "user".to_string(), content: "Hány fok van a nappaliban?".to_string() }];
        let result = rewriter.rewrite("És a kertben?", &history).await;
        assert_eq!(result.method, RewriteMethod::RuleBased);
        assert!(result.rewritten.contains("kertben"));
    }

    #[tokio::test]
    async fn llm_path_is_used_when_a_client_is_configured() {
        let rewriter = QueryRewriter::new(Some(NoopLlm), Duration::from_secs(2));
        let history = vec![Turn { role: "user".to_string(), content: "Hány fok van a nappaliban?".to_string() }];
        let result = rewriter.rewrite("És ott?", &history).await;
        assert_eq!(result.method, RewriteMethod::Llm);
        assert!((result.confidence - LLM_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn non_follow_up_long_query_with_history_is_not_rewritten() {
        let rewriter = QueryRewriter::<NoopLlm>::new(None, Duration::from_secs(2));
        let history = vec![Turn { role: "user".to_string(), content: "Hány fok van a nappaliban?".to_string() }];
        let result = rewriter.rewrite("Kapcsold fel a konyhai lámpát most azonnal", &history).await;
        assert_eq!(result.method, RewriteMethod::NoRewriteNeeded);
    }
}
