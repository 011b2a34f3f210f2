//! Tool Execution Records
//!
//! Display records for tool invocations made during a run, correlated with
//! their results by tool use id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::envelope::{new_id, now_millis, ToolResultPayload};

/// Status of a tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRunStatus {
    /// Tool-use observed, result not yet in
    Running,
    /// Result arrived without error
    Success,
    /// Result arrived flagged as an error
    Error,
}

/// Record of one tool invocation within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    pub id: String,
    pub tool_use_id: String,
    pub tool_name: String,
    pub tool_input: Value,
    pub status: ToolRunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl ToolExecution {
    /// Create a running record from a tool-use event
    pub fn started(
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_input: Value,
    ) -> Self {
        Self {
            id: new_id(),
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            tool_input,
            status: ToolRunStatus::Running,
            output: None,
            error: None,
            started_at: now_millis(),
            completed_at: None,
        }
    }

    /// Mark as successful with output
    pub fn mark_success(&mut self, output: impl Into<String>) {
        self.status = ToolRunStatus::Success;
        self.output = Some(output.into());
        self.completed_at = Some(now_millis());
    }

    /// Mark as failed with error text
    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.status = ToolRunStatus::Error;
        self.error = Some(error.into());
        self.completed_at = Some(now_millis());
    }

    /// Milliseconds from invocation to result, once a result arrived
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at.map(|done| done - self.started_at)
    }

    /// Wire payload for the tool-result push, sourced from this record
    pub fn result_payload(&self) -> ToolResultPayload {
        ToolResultPayload {
            tool_use_id: self.tool_use_id.clone(),
            success: self.status == ToolRunStatus::Success,
            output: self
                .output
                .clone()
                .or_else(|| self.error.clone())
                .unwrap_or_default(),
            error: self.error.clone(),
            duration_ms: self.duration_ms(),
        }
    }
}
