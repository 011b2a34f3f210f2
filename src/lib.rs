//! Atelier Host - Agent Backend Library
//!
//! The host side of the Atelier desktop assistant shell. The UI process
//! renders chat, task, and artifact panes; this crate owns everything on the
//! other side of the process boundary:
//! - The bridge that admits commands, correlates streamed results by request
//!   id, and holds the pending question table
//! - The chat orchestrator that drives one agent run at a time
//! - The task-status store both sides observe

pub mod models;
pub mod services;
pub mod utils;

pub use models::envelope::{channels, Envelope};
pub use models::todo::{TodoDraft, TodoItem, TodoList, TodoStatus, TodoSummary};
pub use services::bridge::{AgentBridge, AgentCommand};
pub use services::chat::ChatOrchestrator;
pub use services::events::{ChannelSink, PushFrame, UiSink};
pub use services::runtime::{AgentRuntime, CliRuntime, RunEvent, RunRequest};
pub use services::todo_store::TodoStore;
pub use utils::config::HostConfig;
pub use utils::error::{AgentError, AgentResult, ErrorCode};
