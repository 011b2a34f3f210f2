//! Data Models
//!
//! Wire shapes and entities shared by the bridge, the orchestrator, and the
//! task-status store.

pub mod envelope;
pub mod todo;
pub mod tools;
