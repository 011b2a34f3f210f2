//! Services
//!
//! The moving parts of the host: the bridge, the chat orchestrator, the
//! task-status store, and the seams to the UI process and the agent runtime.

pub mod attachments;
pub mod bridge;
pub mod chat;
pub mod events;
pub mod runtime;
pub mod todo_store;
