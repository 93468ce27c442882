//! The five HTTP endpoints (`spec.md §6.1`): request enrichment, the extended
//! workflow variant, tool-call execution bookkeeping, meta-task-aware
//! conversation ingestion, and a health probe.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use hearth_context::{Candidate, Turn};
use hearth_core::Intent;
use serde_json::json;

use crate::dto::{
    HealthResponse, MessageDto, ProcessConversationBody, ProcessConversationResponse, ProcessRequestBody,
    ProcessRequestResponse, ProcessRequestWorkflowResponse, ProcessResponseBody, ProcessResponseResult,
    RelevantEntityDto, ToolDto, ToolFunctionDto, ToolParametersDto, WorkflowMetadataDto,
};
use crate::error::ServerError;
use crate::meta_task;
use crate::state::AppState;

/// Assemble the axum router for every endpoint `spec.md §6.1` names.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/process-request", post(process_request))
        .route("/process-request-workflow", post(process_request_workflow))
        .route("/process-response", post(process_response))
        .route("/process-conversation", post(process_conversation))
        .route("/health", get(health))
        .with_state(state)
}

fn turns_from_history(history: &[crate::dto::TurnDto]) -> Vec<Turn> {
    history.iter().map(|turn| Turn { role: turn.role.clone(), content: turn.content.clone() }).collect()
}

fn candidate_to_dto(candidate: &Candidate, is_primary: bool) -> RelevantEntityDto {
    RelevantEntityDto {
        entity_id: candidate.entity.entity_id.clone(),
        name: candidate.entity.friendly_name.clone().unwrap_or_else(|| candidate.entity.entity_id.clone()),
        state: candidate.entity.state.as_ref().map(|state| state.state.clone()),
        domain: candidate.entity.domain.clone(),
        area_name: candidate.entity.area.clone(),
        similarity: candidate.final_score.unwrap_or(candidate.score),
        aliases: Vec::new(),
        is_primary,
    }
}

fn intent_label(intent: Option<Intent>) -> &'static str {
    match intent {
        Some(Intent::Control) => "control",
        _ => "read",
    }
}

const CONTROLLABLE_DOMAINS: [&str; 5] = ["light", "switch", "climate", "cover", "lock"];

/// `spec.md §4.8`/`§6.1`: tools are only surfaced when the detected intent is
/// `control` (`original_source/app/main.py:601`, `if intent == "control":`).
fn tools_for(entities: &[RelevantEntityDto], intent: &str) -> Vec<ToolDto> {
    if intent != "control" {
        return Vec::new();
    }
    entities
        .iter()
        .filter(|entity| CONTROLLABLE_DOMAINS.contains(&entity.domain.as_str()))
        .map(|entity| ToolDto {
            kind: "function".to_string(),
            function: ToolFunctionDto {
                name: format!("{}.turn_on", entity.domain),
                parameters: ToolParametersDto {
                    kind: "object".to_string(),
                    properties: json!({ "entity_id": { "type": "string", "enum": [entity.entity_id.clone()] } }),
                    required: vec!["entity_id".to_string()],
                },
            },
        })
        .collect()
}

/// `POST /process-request`: enrich a user turn with formatted retrieval
/// context as a system message, ready to prepend to an LLM call.
async fn process_request(
    State(state): State<AppState>,
    Json(body): Json<ProcessRequestBody>,
) -> Result<Json<ProcessRequestResponse>, ServerError> {
    if body.user_message.trim().is_empty() {
        return Err(ServerError::BadRequest("user_message must not be empty".to_string()));
    }
    let session_id = body.session_id.or(body.conversation_id).unwrap_or_else(|| "default".to_string());
    let history = turns_from_history(&body.conversation_history);
    let result = state.engine.run(body.user_message, session_id, history).await;

    let entities: Vec<RelevantEntityDto> = result
        .primary
        .iter()
        .map(|candidate| candidate_to_dto(candidate, true))
        .chain(result.related.iter().map(|candidate| candidate_to_dto(candidate, false)))
        .collect();
    let intent = intent_label(result.conversation_context.as_ref().map(|context| context.intent));
    let tools = tools_for(&entities, intent);

    Ok(Json(ProcessRequestResponse {
        messages: vec![MessageDto { role: "system".to_string(), content: result.formatted_context }],
        tools,
    }))
}

/// `POST /process-request-workflow`: the same enrichment, with retrieval and
/// diagnostic metadata surfaced for callers that want it.
async fn process_request_workflow(
    State(state): State<AppState>,
    Json(body): Json<ProcessRequestBody>,
) -> Result<Json<ProcessRequestWorkflowResponse>, ServerError> {
    if body.user_message.trim().is_empty() {
        return Err(ServerError::BadRequest("user_message must not be empty".to_string()));
    }
    let session_id = body.session_id.or(body.conversation_id).unwrap_or_else(|| "default".to_string());
    let history = turns_from_history(&body.conversation_history);
    let result = state.engine.run(body.user_message, session_id, history).await;

    let relevant_entities: Vec<RelevantEntityDto> = result
        .primary
        .iter()
        .map(|candidate| candidate_to_dto(candidate, true))
        .chain(result.related.iter().map(|candidate| candidate_to_dto(candidate, false)))
        .collect();
    let intent = intent_label(result.conversation_context.as_ref().map(|context| context.intent));
    let tools = tools_for(&relevant_entities, intent);

    let memory_boosted_count = result.primary.iter().chain(result.related.iter()).filter(|candidate| candidate.memory_boosted).count();
    let metadata = WorkflowMetadataDto {
        workflow_quality: result.diagnostics.as_ref().map_or(0.0, |diagnostics| diagnostics.overall_quality),
        memory_entities_count: result.memory_entities.len(),
        memory_boosted_count,
        entity_count: relevant_entities.len(),
        phase: "complete".to_string(),
    };

    Ok(Json(ProcessRequestWorkflowResponse {
        messages: vec![MessageDto { role: "system".to_string(), content: result.formatted_context.clone() }],
        tools,
        relevant_entities,
        formatted_content: result.formatted_context,
        intent: intent.to_string(),
        metadata,
    }))
}

/// `POST /process-response`: acknowledge the LLM's emitted tool calls. No
/// device control is actually dispatched here (`spec.md §1` non-goal); this
/// endpoint exists for callers to report what the LLM decided.
async fn process_response(Json(body): Json<ProcessResponseBody>) -> Json<ProcessResponseResult> {
    if body.tool_calls.is_empty() {
        return Json(ProcessResponseResult { status: "ok".to_string(), message: "no tool calls to acknowledge".to_string() });
    }
    let names: Vec<&str> = body.tool_calls.iter().map(|call| call.function.name.as_str()).collect();
    Json(ProcessResponseResult { status: "ok".to_string(), message: format!("acknowledged: {}", names.join(", ")) })
}

/// `POST /process-conversation`: ingest a raw (possibly meta-task wrapped)
/// conversation payload and return retrieval results directly.
async fn process_conversation(
    State(state): State<AppState>,
    Json(body): Json<ProcessConversationBody>,
) -> Result<Json<ProcessConversationResponse>, ServerError> {
    let started = Instant::now();

    let (turns, strategy_used) = match body {
        ProcessConversationBody::Messages { messages } => (turns_from_history(&messages), "structured".to_string()),
        ProcessConversationBody::Raw(raw) => {
            let parsed = meta_task::parse(&raw);
            let method = format!("{:?}", parsed.method).to_lowercase();
            (parsed.turns, method)
        }
    };

    let Some(last_user_index) = turns.iter().rposition(|turn| turn.role == "user") else {
        return Err(ServerError::UnparsableConversation("no user turn found in conversation payload".to_string()));
    };
    let user_query = turns[last_user_index].content.clone();
    let history = turns[..last_user_index].to_vec();
    let message_count = turns.len();

    let session_id = uuid::Uuid::new_v4().to_string();
    let result = state.engine.run(user_query, session_id, history).await;

    let entities: Vec<RelevantEntityDto> = result
        .primary
        .iter()
        .map(|candidate| candidate_to_dto(candidate, true))
        .chain(result.related.iter().map(|candidate| candidate_to_dto(candidate, false)))
        .collect();

    Ok(Json(ProcessConversationResponse {
        success: true,
        entities,
        formatted_content: result.formatted_context,
        strategy_used,
        execution_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        message_count,
        debug: None,
    }))
}

/// `GET /health`: the probes recorded at startup, refreshed with a live
/// embedding-dimension re-check.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let healthy = state.startup_probes.iter().all(|probe| probe.healthy);
    Json(HealthResponse {
        status: if healthy { "ok".to_string() } else { "degraded".to_string() },
        probes: state.startup_probes.as_ref().clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::Entity;

    fn candidate(entity_id: &str, domain: &str) -> Candidate {
        Candidate {
            entity: Entity {
                entity_id: entity_id.to_string(),
                domain: domain.to_string(),
                device_class: None,
                area: Some("kert".to_string()),
                friendly_name: Some("Kert szenzor".to_string()),
                device_id: None,
                text: String::new(),
                embedding: Vec::new(),
                attributes: serde_json::Value::Null,
                state: None,
            },
            score: 0.5,
            cluster_context: None,
            memory_boosted: false,
            memory_boost: None,
            memory_relevance: None,
            synthetic_from_memory: false,
            final_score: Some(0.8),
            has_active_value: false,
            unavailable: false,
        }
    }

    #[test]
    fn candidate_to_dto_prefers_final_score_over_raw_score() {
        let dto = candidate_to_dto(&candidate("sensor.kert_humidity", "sensor"), true);
        assert_eq!(dto.similarity, 0.8);
        assert_eq!(dto.area_name.as_deref(), Some("kert"));
        assert!(dto.is_primary);
    }

    #[test]
    fn tools_are_only_surfaced_for_actuatable_domains_under_control_intent() {
        let entities = vec![
            candidate_to_dto(&candidate("sensor.kert_humidity", "sensor"), true),
            candidate_to_dto(&candidate("light.nappali", "light"), true),
        ];
        let tools = tools_for(&entities, "control");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "light.turn_on");
    }

    #[test]
    fn tools_are_never_surfaced_for_a_read_intent() {
        let entities = vec![candidate_to_dto(&candidate("light.nappali", "light"), true)];
        assert!(tools_for(&entities, "read").is_empty());
    }

    #[test]
    fn intent_label_defaults_to_read_when_unknown() {
        assert_eq!(intent_label(None), "read");
        assert_eq!(intent_label(Some(Intent::Control)), "control");
    }
}
