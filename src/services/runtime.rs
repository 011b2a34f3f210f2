//! Agent Runtime
//!
//! The opaque source of typed run events. The orchestrator only consumes and
//! classifies this stream; the CLI-backed implementation spawns the
//! configured runtime command and adapts its stream-json output line by line.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::utils::config::HostConfig;
use crate::utils::error::{AgentError, AgentResult};

/// Tool the agent uses to rewrite the task checklist
pub const TODO_TOOL: &str = "TodoWrite";
/// Tool the agent uses to put a structured question to the human
pub const ASK_USER_TOOL: &str = "AskUserQuestion";
/// Tool the agent uses to load a skill into the run context
pub const SKILL_TOOL: &str = "Skill";

/// Tools the orchestrator permits the runtime to call
pub const ALLOWED_TOOLS: &[&str] = &[
    "Read",
    "Write",
    "Edit",
    "Glob",
    "Grep",
    "Bash",
    "WebFetch",
    SKILL_TOOL,
    TODO_TOOL,
    ASK_USER_TOOL,
];

/// Typed event yielded by a runtime run
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Incremental assistant text
    TextDelta { content: String },
    /// The runtime invoked a tool
    ToolUse {
        tool_use_id: String,
        tool_name: String,
        input: Value,
    },
    /// Outcome of a prior tool invocation
    ToolResult {
        tool_use_id: String,
        output: String,
        is_error: bool,
    },
    /// Token accounting for the run
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },
    /// Opaque session handle for conversational continuity
    Session { session_id: String },
    /// Terminal event; the stream ends after this
    Completed {
        is_error: bool,
        message: Option<String>,
    },
}

/// Decision returned by the permission gate before a tool runs
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    Allow,
    /// Allow with a rewritten input (collected answers injected, etc.)
    AllowWithInput(Value),
}

/// Gate consulted before each tool invocation is forwarded.
/// An Err return means the run can no longer proceed (abandoned question).
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn check(&self, tool_name: &str, input: &Value) -> AgentResult<PermissionDecision>;
}

/// Everything one run needs
pub struct RunRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub working_dir: PathBuf,
    pub model: Option<String>,
    pub allowed_tools: Vec<String>,
    pub resume_session: Option<String>,
    pub permission: Arc<dyn PermissionGate>,
    pub cancel: CancellationToken,
}

/// Opaque generator of run events
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Start one run; events arrive on the returned channel until it closes
    async fn run(&self, request: RunRequest) -> AgentResult<mpsc::Receiver<RunEvent>>;
}

/// Runtime adapter that drives a stream-json CLI.
///
/// Spawns the configured command per run, pipes the prompt to stdin (which
/// enables true streaming output), parses stdout JSON lines into RunEvents
/// on a background task, and logs stderr. Conversation continuity uses the
/// session id captured from the stream, passed back via `--resume`.
pub struct CliRuntime {
    config: HostConfig,
}

impl CliRuntime {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AgentRuntime for CliRuntime {
    async fn run(&self, request: RunRequest) -> AgentResult<mpsc::Receiver<RunEvent>> {
        let RunRequest {
            prompt,
            system_prompt,
            working_dir,
            model,
            allowed_tools,
            resume_session,
            permission,
            cancel,
        } = request;

        let mut cmd = Command::new(&self.config.runtime_command);
        cmd.args(&self.config.runtime_args)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--append-system-prompt")
            .arg(&system_prompt)
            .arg("--allowed-tools")
            .arg(allowed_tools.join(","))
            .current_dir(&working_dir)
            .kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref model) = model {
            cmd.arg("--model").arg(model);
        }
        if let Some(ref resume) = resume_session {
            cmd.arg("--resume").arg(resume);
        }

        let mut child = cmd.spawn()?;
        debug!(command = %self.config.runtime_command, "Spawned agent runtime");

        // Prompt goes to stdin; dropping the handle signals EOF
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.flush().await?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::unknown("Runtime stdout unavailable"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "runtime_stderr", "{line}");
                }
            });
        }

        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            'read: loop {
                let line = tokio::select! {
                    _ = cancel.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => line,
                        _ => break,
                    },
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let raw: Value = match serde_json::from_str(line) {
                    Ok(value) => value,
                    Err(e) => {
                        debug!("Skipping unparseable runtime line: {e}");
                        continue;
                    }
                };
                for mut event in adapt_line(&raw) {
                    if let RunEvent::ToolUse {
                        tool_name, input, ..
                    } = &mut event
                    {
                        match permission.check(tool_name, input).await {
                            Ok(PermissionDecision::Allow) => {}
                            Ok(PermissionDecision::AllowWithInput(rewritten)) => {
                                *input = rewritten;
                            }
                            Err(e) => {
                                debug!("Permission gate ended the run: {e}");
                                break 'read;
                            }
                        }
                    }
                    if tx.send(event).await.is_err() {
                        warn!("Runtime event receiver dropped, stopping reader");
                        break 'read;
                    }
                }
            }
            // close the stream before reaping so the consumer unblocks
            // immediately; a cancelled child is killed rather than awaited
            drop(tx);
            let _ = child.start_kill();
            let _ = child.wait().await;
        });

        Ok(rx)
    }
}

/// Adapt one stream-json line into zero or more run events.
///
/// The stream interleaves assistant content blocks (text, tool_use), user
/// tool_result blocks, and a terminal result record carrying usage totals.
/// Any record may carry the session id for `--resume` continuity.
fn adapt_line(raw: &Value) -> Vec<RunEvent> {
    let mut events = Vec::new();

    if let Some(session_id) = raw.get("session_id").and_then(Value::as_str) {
        if !session_id.is_empty() {
            events.push(RunEvent::Session {
                session_id: session_id.to_string(),
            });
        }
    }

    match raw.get("type").and_then(Value::as_str) {
        Some("assistant") => {
            for block in content_blocks(raw) {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            if !text.is_empty() {
                                events.push(RunEvent::TextDelta {
                                    content: text.to_string(),
                                });
                            }
                        }
                    }
                    Some("tool_use") => {
                        let tool_use_id = block
                            .get("id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let tool_name = block
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let input = block.get("input").cloned().unwrap_or(Value::Null);
                        events.push(RunEvent::ToolUse {
                            tool_use_id,
                            tool_name,
                            input,
                        });
                    }
                    _ => {}
                }
            }
        }
        Some("user") => {
            for block in content_blocks(raw) {
                if block.get("type").and_then(Value::as_str) == Some("tool_result") {
                    let tool_use_id = block
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let is_error = block
                        .get("is_error")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    events.push(RunEvent::ToolResult {
                        tool_use_id,
                        output: result_text(block),
                        is_error,
                    });
                }
            }
        }
        Some("result") => {
            if let Some(usage) = raw.get("usage") {
                events.push(RunEvent::Usage {
                    input_tokens: usage
                        .get("input_tokens")
                        .and_then(Value::as_u64)
                        .unwrap_or(0) as u32,
                    output_tokens: usage
                        .get("output_tokens")
                        .and_then(Value::as_u64)
                        .unwrap_or(0) as u32,
                });
            }
            let is_error = raw
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            events.push(RunEvent::Completed {
                is_error,
                message: raw
                    .get("result")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
        _ => {}
    }

    events
}

/// Content blocks of a message record, if any
fn content_blocks(raw: &Value) -> Vec<&Value> {
    raw.get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_array)
        .map(|blocks| blocks.iter().collect())
        .unwrap_or_default()
}

/// Tool result content is either a plain string or a list of text blocks
fn result_text(block: &Value) -> String {
    match block.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}
