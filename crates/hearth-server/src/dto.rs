//! Wire types for the five HTTP endpoints (`spec.md §6.1`, "bit-exact fields").

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single chat turn as received over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnDto {
    pub role: String,
    pub content: String,
}

/// Body shared by `/process-request` and `/process-request-workflow`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRequestBody {
    pub user_message: String,
    #[serde(default)]
    pub conversation_history: Vec<TurnDto>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A single chat message in an LLM-facing reply.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDto {
    pub role: String,
    pub content: String,
}

/// A callable tool surfaced when `intent = control`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDto {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunctionDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolFunctionDto {
    pub name: String,
    pub parameters: ToolParametersDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolParametersDto {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Value,
    pub required: Vec<String>,
}

/// Response body for `POST /process-request`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRequestResponse {
    pub messages: Vec<MessageDto>,
    pub tools: Vec<ToolDto>,
}

/// A single retrieved entity surfaced to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RelevantEntityDto {
    pub entity_id: String,
    pub name: String,
    pub state: Option<String>,
    pub domain: String,
    pub area_name: Option<String>,
    pub similarity: f32,
    pub aliases: Vec<String>,
    pub is_primary: bool,
}

/// Workflow-run metadata surfaced alongside the extended response.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowMetadataDto {
    pub workflow_quality: f32,
    pub memory_entities_count: usize,
    pub memory_boosted_count: usize,
    pub entity_count: usize,
    pub phase: String,
}

/// Response body for `POST /process-request-workflow`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRequestWorkflowResponse {
    pub messages: Vec<MessageDto>,
    pub tools: Vec<ToolDto>,
    pub relevant_entities: Vec<RelevantEntityDto>,
    pub formatted_content: String,
    pub intent: String,
    pub metadata: WorkflowMetadataDto,
}

/// A single tool call as returned by the LLM, to be executed by `/process-response`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDto {
    pub id: Option<String>,
    pub function: ToolCallFunctionDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallFunctionDto {
    pub name: String,
    /// A JSON-encoded arguments object, matching the conventional LLM tool-call shape.
    pub arguments: String,
}

/// Body for `POST /process-response`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessResponseBody {
    #[serde(default)]
    pub tool_calls: Vec<ToolCallDto>,
}

/// Response body for `POST /process-response`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponseResult {
    pub status: String,
    pub message: String,
}

/// Body for `POST /process-conversation`: either a raw (possibly meta-task
/// wrapped) string, or a pre-parsed `messages[]` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProcessConversationBody {
    Messages { messages: Vec<TurnDto> },
    Raw(String),
}

/// Response body for `POST /process-conversation`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessConversationResponse {
    pub success: bool,
    pub entities: Vec<RelevantEntityDto>,
    pub formatted_content: String,
    pub strategy_used: String,
    pub execution_time_ms: u64,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub probes: Vec<hearth_core::health::HealthProbe>,
}
