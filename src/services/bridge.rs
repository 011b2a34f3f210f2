//! Agent Bridge
//!
//! Admission control, request correlation, and the only component that
//! pushes messages to the UI process. Inbound commands become typed
//! AgentCommand values on a channel the orchestrator drains; outbound
//! results are one-way pushes wrapped in envelopes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::envelope::{
    channels, new_id, AckReply, AnswerSubmission, ArtifactCreatedPayload, Attachment, Envelope,
    ErrorPayload, InitRequest, MessageChunk, MessageComplete, QuestionOption, QuestionPayload,
    SendMessageReply, SendMessageRequest, SkillLoadedPayload, StatusReply, StatusUpdatePayload,
    TodoUpdatePayload, ToolResultPayload, ToolUsePayload, Usage,
};
use crate::models::todo::TodoItem;
use crate::services::events::UiSink;
use crate::utils::config::{default_workspace_dir, HostConfig};
use crate::utils::error::{AgentError, AgentResult, ErrorCode};

/// Status strings pushed on `agent:status-update`
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_IDLE: &str = "idle";

/// Internal command dispatched to the orchestrator
#[derive(Debug)]
pub enum AgentCommand {
    Init {
        workspace_path: PathBuf,
        model: Option<String>,
        extra_instructions: Option<String>,
    },
    Message {
        request_id: String,
        content: String,
        attachments: Vec<Attachment>,
        cancel: CancellationToken,
    },
    /// The in-flight run (if any) was already cancelled when this arrives
    Stop,
    /// Audit record; the oneshot resolution has already happened
    Answer {
        question_id: String,
        request_id: String,
        selected_values: Vec<String>,
    },
}

/// Bridge-visible state. The cancellation handle lives here so it is
/// installed and cleared under the same lock as the running flag.
#[derive(Debug, Clone, Default)]
struct BridgeState {
    initialized: bool,
    running: bool,
    model: Option<String>,
    workspace_path: Option<PathBuf>,
    active_cancel: Option<CancellationToken>,
}

/// The host side of the process boundary
pub struct AgentBridge {
    state: RwLock<BridgeState>,
    /// Suspended question resolvers keyed by question id
    pending_questions: Mutex<HashMap<String, oneshot::Sender<Vec<String>>>>,
    sink: Arc<dyn UiSink>,
    commands: mpsc::UnboundedSender<AgentCommand>,
    question_timeout: Option<Duration>,
    default_model: Option<String>,
}

impl AgentBridge {
    /// Build the bridge and the command stream the orchestrator drains
    pub fn new(
        sink: Arc<dyn UiSink>,
        config: &HostConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<AgentCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = Arc::new(Self {
            state: RwLock::new(BridgeState::default()),
            pending_questions: Mutex::new(HashMap::new()),
            sink,
            commands: tx,
            question_timeout: config.question_timeout_secs.map(Duration::from_secs),
            default_model: config.default_model.clone(),
        });
        (bridge, rx)
    }

    // ========================================================================
    // Command surface (UI -> host)
    // ========================================================================

    /// Handle `agent:init`. Ensures a workspace directory exists (creating
    /// the default one when none is supplied), records model and workspace,
    /// and hands the orchestrator an init command. `initialized` is set
    /// optimistically; mark_init_failed revises it.
    pub async fn init(&self, request: InitRequest) -> AckReply {
        let workspace = match request.workspace_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => match default_workspace_dir() {
                Ok(path) => path,
                Err(e) => return AckReply::failure(e.to_string()),
            },
        };
        if let Err(e) = tokio::fs::create_dir_all(&workspace).await {
            return AckReply::failure(format!("Failed to prepare workspace: {e}"));
        }
        let model = request.model.or_else(|| self.default_model.clone());

        {
            let mut state = self.state.write().await;
            state.workspace_path = Some(workspace.clone());
            state.model = model.clone();
            state.initialized = true;
        }

        let command = AgentCommand::Init {
            workspace_path: workspace,
            model,
            extra_instructions: request.extra_instructions,
        };
        if self.commands.send(command).is_err() {
            self.state.write().await.initialized = false;
            return AckReply::failure("Orchestrator is not running");
        }
        info!("Agent bridge initialized");
        AckReply::success()
    }

    /// Handle `agent:status`; pure read
    pub async fn status(&self) -> StatusReply {
        let state = self.state.read().await;
        StatusReply {
            initialized: state.initialized,
            running: state.running,
            model: state.model.clone(),
            workspace_path: state
                .workspace_path
                .as_ref()
                .map(|path| path.display().to_string()),
        }
    }

    /// Handle `agent:send-message`. Admission control happens here: the
    /// busy flag is only raised once both guards pass, so a rejection never
    /// leaves it stuck. On acceptance the reply returns immediately and all
    /// results arrive later as pushes.
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> AgentResult<SendMessageReply> {
        let request_id = request.request_id.clone();
        let cancel = CancellationToken::new();
        {
            let mut state = self.state.write().await;
            if !state.initialized {
                return Err(AgentError::NotInitialized);
            }
            if state.running {
                return Err(AgentError::Busy);
            }
            state.running = true;
            state.active_cancel = Some(cancel.clone());
        }
        self.send_status_update(&request_id, STATUS_PROCESSING, "Agent is processing");

        let command = AgentCommand::Message {
            request_id: request_id.clone(),
            content: request.content,
            attachments: request.attachments,
            cancel,
        };
        if self.commands.send(command).is_err() {
            self.mark_complete().await;
            return Err(AgentError::unknown("Orchestrator is not running"));
        }
        Ok(SendMessageReply { request_id })
    }

    /// Handle `agent:stop`. Cancels the in-flight run, abandons every
    /// pending question (resolvers dropped, never resolved), and releases
    /// the busy flag.
    pub async fn stop(&self) -> AckReply {
        let cancel = {
            let mut state = self.state.write().await;
            state.running = false;
            state.active_cancel.take()
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        self.abandon_questions().await;
        let _ = self.commands.send(AgentCommand::Stop);
        info!("Stop requested; in-flight run cancelled");
        AckReply::success()
    }

    /// Handle `agent:answer`. Resolves the matching suspended question
    /// exactly once; an unknown id is a failure with no other effect.
    pub async fn answer(&self, submission: AnswerSubmission) -> AckReply {
        let sender = self
            .pending_questions
            .lock()
            .await
            .remove(&submission.question_id);
        match sender {
            Some(sender) => {
                // a dropped receiver means the run already ended; the entry
                // is gone either way
                let _ = sender.send(submission.selected_values.clone());
                let _ = self.commands.send(AgentCommand::Answer {
                    question_id: submission.question_id,
                    request_id: submission.request_id,
                    selected_values: submission.selected_values,
                });
                AckReply::success()
            }
            None => AckReply::failure(format!(
                "No pending question: {}",
                submission.question_id
            )),
        }
    }

    // ========================================================================
    // Interactive round trip
    // ========================================================================

    /// Push a question to the UI and suspend until the human answers, the
    /// configured timeout elapses (empty answer), or stop abandons it
    /// (Err(Aborted)).
    pub async fn ask_question(
        &self,
        request_id: &str,
        question: &str,
        options: Vec<QuestionOption>,
        multi_select: bool,
    ) -> AgentResult<Vec<String>> {
        let question_id = new_id();
        let (tx, rx) = oneshot::channel();
        self.pending_questions
            .lock()
            .await
            .insert(question_id.clone(), tx);
        self.push(
            channels::QUESTION,
            Some(request_id),
            QuestionPayload {
                question_id: question_id.clone(),
                question: question.to_string(),
                options,
                multi_select,
            },
        );
        debug!(question_id, "Awaiting answer from UI");

        let answer = match self.question_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(result) => result,
                Err(_) => {
                    self.pending_questions.lock().await.remove(&question_id);
                    warn!(question_id, "Question timed out, resolving with empty answer");
                    return Ok(Vec::new());
                }
            },
            None => rx.await,
        };
        answer.map_err(|_| AgentError::Aborted)
    }

    async fn abandon_questions(&self) {
        let mut pending = self.pending_questions.lock().await;
        if !pending.is_empty() {
            debug!(count = pending.len(), "Abandoning pending questions");
        }
        pending.clear();
    }

    // ========================================================================
    // Push surface (host -> UI)
    // ========================================================================

    fn push<T: Serialize>(&self, channel: &str, request_id: Option<&str>, payload: T) {
        let envelope = Envelope::new(request_id.map(str::to_string), payload);
        match serde_json::to_value(&envelope) {
            Ok(value) => self.sink.push(channel, value),
            Err(e) => warn!(channel, "Failed to serialize push payload: {e}"),
        }
    }

    pub fn send_message_chunk(&self, request_id: &str, content: &str, is_final: bool) {
        self.push(
            channels::MESSAGE_CHUNK,
            Some(request_id),
            MessageChunk {
                content: content.to_string(),
                is_final,
            },
        );
    }

    /// Final content push; also reports idle and releases the busy flag
    pub async fn send_message_complete(
        &self,
        request_id: &str,
        content: String,
        usage: Option<Usage>,
    ) {
        self.push(
            channels::MESSAGE_COMPLETE,
            Some(request_id),
            MessageComplete { content, usage },
        );
        self.send_status_update(request_id, STATUS_IDLE, "Ready");
        self.mark_complete().await;
    }

    pub fn send_tool_use(
        &self,
        request_id: &str,
        tool_use_id: &str,
        tool_name: &str,
        tool_input: Value,
    ) {
        self.push(
            channels::TOOL_USE,
            Some(request_id),
            ToolUsePayload {
                tool_name: tool_name.to_string(),
                tool_input,
                tool_use_id: tool_use_id.to_string(),
            },
        );
    }

    pub fn send_tool_result(&self, request_id: &str, result: ToolResultPayload) {
        self.push(channels::TOOL_RESULT, Some(request_id), result);
    }

    pub fn send_todo_update(&self, request_id: &str, todos: Vec<TodoItem>) {
        self.push(
            channels::TODO_UPDATE,
            Some(request_id),
            TodoUpdatePayload { todos },
        );
    }

    pub fn send_artifact_created(&self, request_id: &str, artifact: Value) {
        self.push(
            channels::ARTIFACT_CREATED,
            Some(request_id),
            ArtifactCreatedPayload { artifact },
        );
    }

    pub fn send_skill_loaded(&self, request_id: &str, skill_name: &str, preview: Option<String>) {
        self.push(
            channels::SKILL_LOADED,
            Some(request_id),
            SkillLoadedPayload {
                skill_name: skill_name.to_string(),
                preview,
            },
        );
    }

    pub fn send_status_update(&self, request_id: &str, status: &str, message: &str) {
        self.push(
            channels::STATUS_UPDATE,
            Some(request_id),
            StatusUpdatePayload {
                status: status.to_string(),
                message: message.to_string(),
            },
        );
    }

    /// Push an error; non-recoverable codes also release the busy flag
    pub async fn send_error(
        &self,
        request_id: Option<&str>,
        code: ErrorCode,
        message: impl Into<String>,
        details: Option<Value>,
    ) {
        let recoverable = code.recoverable();
        self.push(
            channels::ERROR,
            request_id,
            ErrorPayload {
                code,
                message: message.into(),
                details,
                recoverable,
            },
        );
        if !recoverable {
            self.mark_complete().await;
        }
    }

    /// Release the busy flag and the cancellation handle.
    /// Safe to call on every exit path; extra calls are no-ops.
    pub async fn mark_complete(&self) {
        let mut state = self.state.write().await;
        state.running = false;
        state.active_cancel = None;
    }

    /// Revision hook for the optimistic init: the orchestrator reports that
    /// initialization actually failed.
    pub async fn mark_init_failed(&self) {
        self.state.write().await.initialized = false;
    }
}
