//! Message Envelope and Channel Catalog
//!
//! Shared vocabulary for everything that crosses the process boundary. Every
//! message carries an id, a timestamp, and (except the init reply) the
//! request id it was produced for, so the UI can group streamed output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::todo::TodoItem;
use crate::utils::error::ErrorCode;

/// Channel names for messages crossing the process boundary.
/// Handlers registered on a channel accept exactly the payload shape
/// associated with it.
pub mod channels {
    // UI -> host commands
    pub const INIT: &str = "agent:init";
    pub const STATUS: &str = "agent:status";
    pub const SEND_MESSAGE: &str = "agent:send-message";
    pub const STOP: &str = "agent:stop";
    pub const ANSWER: &str = "agent:answer";

    // host -> UI pushes
    pub const MESSAGE_CHUNK: &str = "agent:message-chunk";
    pub const MESSAGE_COMPLETE: &str = "agent:message-complete";
    pub const TOOL_USE: &str = "agent:tool-use";
    pub const TOOL_RESULT: &str = "agent:tool-result";
    pub const QUESTION: &str = "agent:question";
    pub const TODO_UPDATE: &str = "agent:todo-update";
    pub const ARTIFACT_CREATED: &str = "agent:artifact-created";
    pub const SKILL_LOADED: &str = "agent:skill-loaded";
    pub const STATUS_UPDATE: &str = "agent:status-update";
    pub const ERROR: &str = "agent:error";
}

/// Current time in unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Fresh opaque message/correlation id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Envelope wrapped around every outbound message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// Unique per message instance
    pub id: String,
    /// Unix millis at creation
    pub timestamp: i64,
    /// Request correlation id; absent only on the init reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wrap a payload with a fresh id and the given request correlation id
    pub fn new(request_id: Option<String>, payload: T) -> Self {
        Self {
            id: new_id(),
            timestamp: now_millis(),
            request_id,
            payload,
        }
    }
}

// ============================================================================
// Command payloads (UI -> host)
// ============================================================================

/// `agent:init` request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitRequest {
    pub workspace_path: Option<String>,
    pub model: Option<String>,
    pub extra_instructions: Option<String>,
}

/// `agent:send-message` request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub request_id: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A raw file reference supplied with a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// `agent:answer` submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub question_id: String,
    pub request_id: String,
    pub selected_values: Vec<String>,
}

// ============================================================================
// Command replies
// ============================================================================

/// Success/failure reply for init, stop, and answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AckReply {
    /// Create a successful reply
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// Create a failed reply with message
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// `agent:status` reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub initialized: bool,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<String>,
}

/// `agent:send-message` acceptance reply; results arrive later as pushes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageReply {
    pub request_id: String,
}

// ============================================================================
// Push payloads (host -> UI)
// ============================================================================

/// Incremental fragment of generated text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageChunk {
    pub content: String,
    pub is_final: bool,
}

/// Token accounting for one run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Full accumulated response for one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageComplete {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The runtime invoked a named capability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsePayload {
    pub tool_name: String,
    pub tool_input: Value,
    pub tool_use_id: String,
}

/// Outcome of a tool invocation, correlated by tool use id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    pub tool_use_id: String,
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Invocation-to-result wall time, when the invocation was observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// One choice offered with a question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A structured question only the human can resolve
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPayload {
    pub question_id: String,
    pub question: String,
    pub options: Vec<QuestionOption>,
    pub multi_select: bool,
}

/// Wholesale snapshot of the task checklist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TodoUpdatePayload {
    pub todos: Vec<TodoItem>,
}

/// An artifact produced by the run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCreatedPayload {
    pub artifact: Value,
}

/// A skill was loaded into the run context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkillLoadedPayload {
    pub skill_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

/// Coarse progress indicator ("processing", "idle")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdatePayload {
    pub status: String,
    pub message: String,
}

/// Error surfaced to the UI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub recoverable: bool,
}
