//! Task-Status Store
//!
//! Owns the single active task checklist and enforces its state machine.
//! Creation and mutation notify the bound broadcaster exactly once each;
//! clear never notifies. Consumers only read snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::models::envelope::now_millis;
use crate::models::todo::{TodoDraft, TodoItem, TodoList, TodoStatus, TodoSummary};
use crate::utils::error::{AgentError, AgentResult};

/// Callback receiving a snapshot after every create or mutation
pub type TodoNotifier = Box<dyn Fn(TodoList) + Send + Sync>;

/// In-memory store for the active task checklist
pub struct TodoStore {
    list: RwLock<Option<TodoList>>,
    notifier: RwLock<Option<TodoNotifier>>,
    next_id: AtomicU64,
}

impl TodoStore {
    pub fn new() -> Self {
        Self {
            list: RwLock::new(None),
            notifier: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Bind the broadcaster for the current request
    pub async fn set_notifier(&self, notifier: TodoNotifier) {
        *self.notifier.write().await = Some(notifier);
    }

    /// Unbind the broadcaster at the end of a request
    pub async fn clear_notifier(&self) {
        *self.notifier.write().await = None;
    }

    async fn notify(&self, list: &TodoList) {
        if let Some(notifier) = self.notifier.read().await.as_ref() {
            notifier(list.clone());
        }
    }

    fn fresh_id(&self) -> String {
        format!("todo-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Replace the checklist wholesale with pending items built from contents
    pub async fn create_list(&self, contents: Vec<String>) -> AgentResult<TodoList> {
        let drafts = contents.into_iter().map(TodoDraft::pending).collect();
        self.replace_list(drafts).await
    }

    /// Replace the checklist wholesale. Drafts may carry non-pending
    /// statuses (a completed item gets its completed_at stamped now);
    /// blocked drafts must carry a reason.
    pub async fn replace_list(&self, drafts: Vec<TodoDraft>) -> AgentResult<TodoList> {
        if drafts.is_empty() {
            return Err(AgentError::validation("Task list must not be empty"));
        }
        let now = now_millis();
        let mut items = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let content = draft.content.trim();
            if content.is_empty() {
                return Err(AgentError::validation("Task content must not be empty"));
            }
            let mut item = TodoItem::new(self.fresh_id(), content, now);
            item.status = draft.status;
            match draft.status {
                TodoStatus::Completed => item.completed_at = Some(now),
                TodoStatus::Blocked => {
                    let reason = draft
                        .blocked_reason
                        .as_deref()
                        .map(str::trim)
                        .unwrap_or("");
                    if reason.is_empty() {
                        return Err(AgentError::validation("Blocked task requires a reason"));
                    }
                    item.blocked_reason = Some(reason.to_string());
                }
                _ => {}
            }
            items.push(item);
        }
        let list = TodoList {
            items,
            created_at: now,
            updated_at: now,
        };
        *self.list.write().await = Some(list.clone());
        self.notify(&list).await;
        Ok(list)
    }

    /// Transition one item per the state machine. Invalid transitions and
    /// missing reasons leave the item untouched.
    pub async fn update_status(
        &self,
        id: &str,
        status: TodoStatus,
        blocked_reason: Option<String>,
    ) -> AgentResult<TodoItem> {
        let snapshot;
        let updated;
        {
            let mut guard = self.list.write().await;
            let list = guard
                .as_mut()
                .ok_or_else(|| AgentError::not_found("No task list exists"))?;
            let item = list
                .items
                .iter_mut()
                .find(|item| item.id == id)
                .ok_or_else(|| AgentError::not_found(format!("Task not found: {id}")))?;

            if !item.status.can_transition_to(status) {
                return Err(AgentError::validation(format!(
                    "Invalid transition: {:?} -> {:?}",
                    item.status, status
                )));
            }
            let reason = if status == TodoStatus::Blocked {
                let reason = blocked_reason.as_deref().map(str::trim).unwrap_or("");
                if reason.is_empty() {
                    return Err(AgentError::validation("Blocking a task requires a reason"));
                }
                Some(reason.to_string())
            } else {
                None
            };

            let now = now_millis();
            item.status = status;
            item.updated_at = now;
            item.completed_at = (status == TodoStatus::Completed).then_some(now);
            item.blocked_reason = reason;
            updated = item.clone();
            list.updated_at = now;
            snapshot = list.clone();
        }
        self.notify(&snapshot).await;
        Ok(updated)
    }

    /// Drop the checklist. By contract this does not notify; only creation
    /// and mutation do.
    pub async fn clear(&self) {
        *self.list.write().await = None;
    }

    /// Snapshot of the current checklist
    pub async fn get_list(&self) -> Option<TodoList> {
        self.list.read().await.clone()
    }

    /// Snapshot of one item by id
    pub async fn get_by_id(&self, id: &str) -> Option<TodoItem> {
        self.list
            .read()
            .await
            .as_ref()
            .and_then(|list| list.items.iter().find(|item| item.id == id).cloned())
    }

    /// Snapshot of all items with the given status
    pub async fn get_by_status(&self, status: TodoStatus) -> Vec<TodoItem> {
        self.list
            .read()
            .await
            .as_ref()
            .map(|list| {
                list.items
                    .iter()
                    .filter(|item| item.status == status)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Counts per status and the total
    pub async fn get_summary(&self) -> TodoSummary {
        let guard = self.list.read().await;
        let mut summary = TodoSummary::default();
        if let Some(list) = guard.as_ref() {
            summary.total = list.items.len();
            for item in &list.items {
                match item.status {
                    TodoStatus::Pending => summary.pending += 1,
                    TodoStatus::InProgress => summary.in_progress += 1,
                    TodoStatus::Completed => summary.completed += 1,
                    TodoStatus::Blocked => summary.blocked += 1,
                }
            }
        }
        summary
    }
}

impl Default for TodoStore {
    fn default() -> Self {
        Self::new()
    }
}
