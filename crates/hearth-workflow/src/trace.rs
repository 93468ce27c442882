//! Per-run tracing (`spec.md §4.1`): "each node enqueues a `PipelineStage` into
//! the trace. The tracer exposes the trace by `trace_id` for later inspection."
//!
//! Scaled down from the teacher's `llmspell-events` bus: that one is a pub/sub
//! broadcast with pattern-matched subscriptions, since many listeners can want
//! any event. Here there is exactly one reader (whoever holds `trace_id`), so a
//! `DashMap<trace_id, Vec<PipelineStage>>` covers the contract without the
//! subscription machinery.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One node execution's trace record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    /// Node name, e.g. `"entity_retrieval"`.
    pub name: String,
    /// Node kind, currently always `"node"`; kept distinct from `name` so a
    /// future node type (e.g. a sub-graph) can be distinguished without
    /// renaming existing traces.
    pub stage_type: String,
    /// Candidate pool size entering the node.
    pub in_count: usize,
    /// Candidate pool size leaving the node.
    pub out_count: usize,
    /// Wall-clock time the node took.
    pub duration_ms: u64,
    /// Free-form per-node detail.
    pub payload: serde_json::Value,
}

/// Holds every run's stage list, keyed by `trace_id`.
#[derive(Default)]
pub struct Tracer {
    runs: DashMap<String, Vec<PipelineStage>>,
}

impl Tracer {
    /// Build an empty tracer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage to `trace_id`'s run.
    pub fn record(&self, trace_id: &str, stage: PipelineStage) {
        self.runs.entry(trace_id.to_string()).or_default().push(stage);
    }

    /// The full stage list for `trace_id`, if any run recorded one.
    #[must_use]
    pub fn trace(&self, trace_id: &str) -> Option<Vec<PipelineStage>> {
        self.runs.get(trace_id).map(|entry| entry.clone())
    }

    /// Drop a run's trace, e.g. once it has been read and reported upstream.
    pub fn forget(&self, trace_id: &str) {
        self.runs.remove(trace_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str) -> PipelineStage {
        PipelineStage {
            name: name.to_string(),
            stage_type: "node".to_string(),
            in_count: 0,
            out_count: 0,
            duration_ms: 1,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn trace_returns_stages_in_record_order() {
        let tracer = Tracer::new();
        tracer.record("t1", stage("conversation_analysis"));
        tracer.record("t1", stage("scope_detection"));
        let trace = tracer.trace("t1").unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].name, "conversation_analysis");
        assert_eq!(trace[1].name, "scope_detection");
    }

    #[test]
    fn unknown_trace_id_returns_none() {
        let tracer = Tracer::new();
        assert!(tracer.trace("missing").is_none());
    }

    #[test]
    fn forget_removes_the_run() {
        let tracer = Tracer::new();
        tracer.record("t1", stage("conversation_analysis"));
        tracer.forget("t1");
        assert!(tracer.trace("t1").is_none());
    }
}
