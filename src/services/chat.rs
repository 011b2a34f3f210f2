//! Chat Orchestrator
//!
//! Drains the bridge command stream and drives at most one agent run at a
//! time. Each run consumes the runtime's event stream, forwards chunks and
//! tool activity to the UI, intercepts checklist rewrites, and blocks on
//! questions only the human can answer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::envelope::{Attachment, QuestionOption, ToolResultPayload, Usage};
use crate::models::todo::{TodoDraft, TodoStatus};
use crate::models::tools::ToolExecution;
use crate::services::attachments::build_attachment_context;
use crate::services::bridge::{AgentBridge, AgentCommand};
use crate::services::runtime::{
    AgentRuntime, PermissionDecision, PermissionGate, RunEvent, RunRequest, ALLOWED_TOOLS,
    ASK_USER_TOOL, SKILL_TOOL, TODO_TOOL,
};
use crate::services::todo_store::TodoStore;
use crate::utils::error::{AgentError, AgentResult, ErrorCode};

/// Session parameters fixed at init time
#[derive(Debug, Clone)]
struct SessionConfig {
    workspace: PathBuf,
    model: Option<String>,
    extra_instructions: Option<String>,
}

/// Working state accumulated over one run
#[derive(Default)]
struct RunContext {
    accumulated: String,
    usage: Option<Usage>,
    executions: HashMap<String, ToolExecution>,
}

/// Serialized consumer of bridge commands
pub struct ChatOrchestrator {
    bridge: Arc<AgentBridge>,
    runtime: Arc<dyn AgentRuntime>,
    todos: Arc<TodoStore>,
    session: RwLock<Option<SessionConfig>>,
    resume_session: RwLock<Option<String>>,
}

impl ChatOrchestrator {
    pub fn new(
        bridge: Arc<AgentBridge>,
        runtime: Arc<dyn AgentRuntime>,
        todos: Arc<TodoStore>,
    ) -> Self {
        Self {
            bridge,
            runtime,
            todos,
            session: RwLock::new(None),
            resume_session: RwLock::new(None),
        }
    }

    /// Process commands until the bridge is dropped. The bridge guarantees
    /// at most one Message is in flight, so handling commands sequentially
    /// is exactly the serialization the protocol promises.
    pub async fn run(&self, mut commands: mpsc::UnboundedReceiver<AgentCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                AgentCommand::Init {
                    workspace_path,
                    model,
                    extra_instructions,
                } => {
                    self.handle_init(workspace_path, model, extra_instructions)
                        .await;
                }
                AgentCommand::Message {
                    request_id,
                    content,
                    attachments,
                    cancel,
                } => {
                    self.handle_message(request_id, content, attachments, cancel)
                        .await;
                }
                // the bridge already cancelled the run and dropped any
                // pending question resolvers
                AgentCommand::Stop => debug!("Stop acknowledged"),
                AgentCommand::Answer {
                    question_id,
                    selected_values,
                    ..
                } => {
                    debug!(
                        question_id,
                        answers = selected_values.len(),
                        "Answer resolved"
                    );
                }
            }
        }
        info!("Command stream closed, orchestrator exiting");
    }

    async fn handle_init(
        &self,
        workspace_path: PathBuf,
        model: Option<String>,
        extra_instructions: Option<String>,
    ) {
        if !workspace_path.is_dir() {
            self.bridge.mark_init_failed().await;
            self.bridge
                .send_error(
                    None,
                    ErrorCode::InitializationFailed,
                    format!("Workspace is not a directory: {}", workspace_path.display()),
                    None,
                )
                .await;
            return;
        }
        info!(workspace = %workspace_path.display(), "Session configured");
        *self.session.write().await = Some(SessionConfig {
            workspace: workspace_path,
            model,
            extra_instructions,
        });
        // a fresh session starts with no conversation history or checklist
        *self.resume_session.write().await = None;
        self.todos.clear().await;
    }

    async fn handle_message(
        &self,
        request_id: String,
        content: String,
        attachments: Vec<Attachment>,
        cancel: CancellationToken,
    ) {
        match self
            .run_once(&request_id, content, attachments, cancel)
            .await
        {
            Ok(Some((text, usage))) => {
                self.bridge
                    .send_message_complete(&request_id, text, usage)
                    .await;
            }
            // cancelled runs end silently; stop already reset the state
            Ok(None) => debug!(request_id, "Run cancelled, no completion pushed"),
            Err(AgentError::Aborted) => {
                debug!(request_id, "Run aborted, no completion pushed");
            }
            Err(err) => {
                warn!(request_id, "Run failed: {err}");
                self.bridge
                    .send_error(Some(&request_id), err.code(), err.to_string(), None)
                    .await;
            }
        }
        self.todos.clear_notifier().await;
        self.bridge.mark_complete().await;
    }

    /// One full agent run. Returns the accumulated text and usage, or None
    /// when the run was cancelled mid-stream.
    async fn run_once(
        &self,
        request_id: &str,
        content: String,
        attachments: Vec<Attachment>,
        cancel: CancellationToken,
    ) -> AgentResult<Option<(String, Option<Usage>)>> {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(AgentError::NotInitialized)?;

        {
            let bridge = Arc::clone(&self.bridge);
            let rid = request_id.to_string();
            self.todos
                .set_notifier(Box::new(move |list| {
                    bridge.send_todo_update(&rid, list.items);
                }))
                .await;
        }

        let mut prompt = content;
        prompt.push_str(&build_attachment_context(&attachments).await);

        let request = RunRequest {
            prompt,
            system_prompt: compose_system_prompt(session.extra_instructions.as_deref()),
            working_dir: session.workspace.clone(),
            model: session.model.clone(),
            allowed_tools: ALLOWED_TOOLS.iter().map(|tool| tool.to_string()).collect(),
            resume_session: self.resume_session.read().await.clone(),
            permission: Arc::new(QuestionGate {
                bridge: Arc::clone(&self.bridge),
                request_id: request_id.to_string(),
            }),
            cancel: cancel.clone(),
        };

        let mut events = self.runtime.run(request).await?;
        let mut ctx = RunContext::default();

        loop {
            // a cancelled run must not stay parked on a stream that only
            // closes when the runtime process finally dies
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            match event {
                RunEvent::TextDelta { content } => {
                    ctx.accumulated.push_str(&content);
                    self.bridge.send_message_chunk(request_id, &content, false);
                }
                RunEvent::ToolUse {
                    tool_use_id,
                    tool_name,
                    input,
                } => {
                    self.bridge
                        .send_tool_use(request_id, &tool_use_id, &tool_name, input.clone());
                    if tool_name == TODO_TOOL {
                        if let Err(e) = self.apply_todo_write(&input).await {
                            warn!("Ignoring malformed checklist rewrite: {e}");
                        }
                    } else if tool_name == SKILL_TOOL {
                        if let Some(skill) = skill_name(&input) {
                            self.bridge.send_skill_loaded(request_id, skill, None);
                        }
                    }
                    ctx.executions.insert(
                        tool_use_id.clone(),
                        ToolExecution::started(tool_use_id, tool_name, input),
                    );
                }
                RunEvent::ToolResult {
                    tool_use_id,
                    output,
                    is_error,
                } => {
                    let payload = match ctx.executions.get_mut(&tool_use_id) {
                        Some(execution) => {
                            if is_error {
                                execution.mark_error(output);
                            } else {
                                execution.mark_success(output);
                            }
                            execution.result_payload()
                        }
                        // result for an invocation we never saw start
                        None => ToolResultPayload {
                            tool_use_id,
                            success: !is_error,
                            output: output.clone(),
                            error: is_error.then_some(output),
                            duration_ms: None,
                        },
                    };
                    self.bridge.send_tool_result(request_id, payload);
                }
                RunEvent::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    ctx.usage = Some(Usage {
                        input_tokens,
                        output_tokens,
                    });
                }
                RunEvent::Session { session_id } => {
                    *self.resume_session.write().await = Some(session_id);
                }
                RunEvent::Completed { is_error, message } => {
                    if is_error {
                        return Err(run_failure(
                            message.unwrap_or_else(|| "Run failed".to_string()),
                        ));
                    }
                    break;
                }
            }
        }

        if cancel.is_cancelled() {
            return Ok(None);
        }
        debug!(
            request_id,
            tools = ctx.executions.len(),
            chars = ctx.accumulated.len(),
            "Run finished"
        );
        Ok(Some((ctx.accumulated, ctx.usage)))
    }

    /// Intercept a checklist rewrite and mirror it into the store. The
    /// store's notifier pushes the snapshot to the UI.
    async fn apply_todo_write(&self, input: &Value) -> AgentResult<()> {
        let todos = input
            .get("todos")
            .and_then(Value::as_array)
            .ok_or_else(|| AgentError::validation("todos array missing"))?;
        let mut drafts = Vec::with_capacity(todos.len());
        for todo in todos {
            let content = todo
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| AgentError::validation("todo content missing"))?;
            let status = match todo.get("status").and_then(Value::as_str) {
                Some("in_progress") => TodoStatus::InProgress,
                Some("completed") => TodoStatus::Completed,
                Some("blocked") => TodoStatus::Blocked,
                _ => TodoStatus::Pending,
            };
            drafts.push(TodoDraft {
                content: content.to_string(),
                status,
                blocked_reason: todo
                    .get("blockedReason")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
        self.todos.replace_list(drafts).await?;
        Ok(())
    }
}

/// Skill invocations name the skill under either key
fn skill_name(input: &Value) -> Option<&str> {
    input
        .get("name")
        .or_else(|| input.get("command"))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
}

/// Map a terminal run failure message onto the error taxonomy
fn run_failure(message: String) -> AgentError {
    match ErrorCode::classify(&message) {
        ErrorCode::Timeout => AgentError::Timeout(message),
        ErrorCode::NetworkError => AgentError::Network(message),
        ErrorCode::ApiError => AgentError::Api(message),
        _ => AgentError::Unknown(message),
    }
}

/// System prompt appended to every run
fn compose_system_prompt(extra_instructions: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are a desktop assistant working inside the user's workspace.\n\
         For any task with more than one step, maintain a task checklist \
         with the TodoWrite tool and keep it current as you work.\n\
         When a decision depends on the user's preference, ask with the \
         AskUserQuestion tool and wait for the answer instead of guessing.",
    );
    if let Some(extra) = extra_instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(extra);
    }
    prompt
}

/// Permission gate that turns AskUserQuestion invocations into a blocking
/// round trip through the bridge. Every other tool passes through.
struct QuestionGate {
    bridge: Arc<AgentBridge>,
    request_id: String,
}

#[async_trait]
impl PermissionGate for QuestionGate {
    async fn check(&self, tool_name: &str, input: &Value) -> AgentResult<PermissionDecision> {
        if tool_name != ASK_USER_TOOL {
            return Ok(PermissionDecision::Allow);
        }
        let questions = input
            .get("questions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if questions.is_empty() {
            return Ok(PermissionDecision::Allow);
        }

        let mut answered = Vec::with_capacity(questions.len());
        for mut question in questions {
            let text = question
                .get("question")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let multi_select = question
                .get("multiSelect")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let options = question
                .get("options")
                .and_then(Value::as_array)
                .map(|options| {
                    options
                        .iter()
                        .map(|option| QuestionOption {
                            label: option
                                .get("label")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            description: option
                                .get("description")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                        })
                        .collect()
                })
                .unwrap_or_default();

            let selected = self
                .bridge
                .ask_question(&self.request_id, &text, options, multi_select)
                .await?;
            if let Some(entry) = question.as_object_mut() {
                entry.insert("selectedValues".to_string(), selected.into());
            }
            answered.push(question);
        }

        let mut rewritten = input.clone();
        if let Some(entry) = rewritten.as_object_mut() {
            entry.insert("questions".to_string(), Value::Array(answered));
        }
        Ok(PermissionDecision::AllowWithInput(rewritten))
    }
}
