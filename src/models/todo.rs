//! Task Checklist Models
//!
//! Entities for the single active task checklist owned by the TodoStore.

use serde::{Deserialize, Serialize};

/// Status of a checklist item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl TodoStatus {
    /// Transition table for the checklist state machine.
    /// Completed items may only be reopened; blocked items must pass back
    /// through pending or in_progress before completing.
    pub fn can_transition_to(self, next: TodoStatus) -> bool {
        use TodoStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Blocked)
                | (InProgress, Completed)
                | (InProgress, Blocked)
                | (InProgress, Pending)
                | (Blocked, Pending)
                | (Blocked, InProgress)
                | (Completed, Pending)
        )
    }
}

/// A single checklist item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: String,
    /// Trimmed, never empty
    pub content: String,
    pub status: TodoStatus,
    pub created_at: i64,
    pub updated_at: i64,
    /// Set if and only if status is completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Set if and only if status is blocked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

impl TodoItem {
    /// Build a pending item; content must already be trimmed and non-empty
    pub fn new(id: impl Into<String>, content: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            status: TodoStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            blocked_reason: None,
        }
    }
}

/// Incoming item for a wholesale checklist replace, before the store
/// assigns ids and timestamps
#[derive(Debug, Clone)]
pub struct TodoDraft {
    pub content: String,
    pub status: TodoStatus,
    pub blocked_reason: Option<String>,
}

impl TodoDraft {
    /// Draft for a plain pending task
    pub fn pending(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            status: TodoStatus::Pending,
            blocked_reason: None,
        }
    }
}

/// The active checklist, items in insertion order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TodoList {
    pub items: Vec<TodoItem>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Counts per status plus the total
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TodoSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub blocked: usize,
}
