//! Error Handling
//!
//! Unified error types for the agent host.
//! Uses thiserror for ergonomic error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host-wide error type
#[derive(Error, Debug)]
pub enum AgentError {
    /// A message arrived before a successful init
    #[error("Agent not initialized")]
    NotInitialized,

    /// A message arrived while another request was in flight
    #[error("Agent is busy processing another request")]
    Busy,

    /// Init was accepted optimistically but the orchestrator could not start
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Upstream API rejected or failed the request
    #[error("API error: {0}")]
    Api(String),

    /// Connection-level failure talking to the runtime
    #[error("Network error: {0}")]
    Network(String),

    /// The runtime did not respond in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// The run was cancelled by stop or an abandoned question.
    /// Never surfaced as an error push; the loop just winds down.
    #[error("Run aborted")]
    Aborted,

    /// Anything the taxonomy cannot place
    #[error("{0}")]
    Unknown(String),
}

/// Result type alias for host errors
pub type AgentResult<T> = Result<T, AgentError>;

impl AgentError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an unknown error
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Wire-level code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::AgentNotInitialized,
            Self::Busy => ErrorCode::AgentBusy,
            Self::InitializationFailed(_) => ErrorCode::InitializationFailed,
            Self::Api(_) => ErrorCode::ApiError,
            Self::Network(_) => ErrorCode::NetworkError,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Aborted => ErrorCode::Unknown,
            other => ErrorCode::classify(&other.to_string()),
        }
    }
}

/// Convert AgentError to a string suitable for command replies
impl From<AgentError> for String {
    fn from(err: AgentError) -> String {
        err.to_string()
    }
}

/// Error codes pushed to the UI process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AgentNotInitialized,
    AgentBusy,
    InitializationFailed,
    ApiError,
    NetworkError,
    Timeout,
    Unknown,
}

impl ErrorCode {
    /// Whether the UI may retry without re-initializing
    pub fn recoverable(self) -> bool {
        matches!(
            self,
            Self::ApiError | Self::NetworkError | Self::Timeout | Self::Unknown
        )
    }

    /// Classify a run failure by matching on its message text.
    /// Timeout is checked before network before API, falling back to Unknown.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("network") || lower.contains("connection") {
            Self::NetworkError
        } else if lower.contains("api") {
            Self::ApiError
        } else {
            Self::Unknown
        }
    }
}
