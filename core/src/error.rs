//! Structured error types for steward
//!
//! One enum covers the whole orchestration taxonomy: submission-time
//! failures, loop-fatal failures, and synchronous protocol misuse.

use std::time::Duration;
use thiserror::Error;

/// Primary error type for steward operations
#[derive(Error, Debug)]
pub enum StewardError {
    // =========================================================================
    // Submission Errors
    // =========================================================================
    /// Workspace allocation failed; the task never starts
    #[error("session creation failed: {reason}")]
    SessionCreation { reason: String },

    /// Submission named a runner kind no factory handles
    #[error("unsupported runner: {runner}")]
    UnsupportedRunner { runner: String },

    // =========================================================================
    // Loop Errors
    // =========================================================================
    /// Language-model backend unreachable or erroring
    #[error("provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    /// A tool call failed
    #[error("tool execution failed: {tool} - {error}")]
    ToolExecution { tool: String, error: String },

    /// Tool call exceeded its execution deadline
    #[error("tool timeout: {tool} after {duration:?}")]
    ToolTimeout { tool: String, duration: Duration },

    /// Loop exhausted its iteration budget without a final answer
    #[error("iteration limit reached (max {max})")]
    IterationLimit { max: usize },

    // =========================================================================
    // Approval Errors
    // =========================================================================
    /// Approval id already present in the pending set
    #[error("duplicate approval id: {id}")]
    DuplicateApproval { id: uuid::Uuid },

    /// Approval was already resolved; first resolution wins
    #[error("approval already resolved: {id}")]
    AlreadyResolved { id: uuid::Uuid },

    /// Approval id not known to the manager
    #[error("approval not found: {id}")]
    ApprovalNotFound { id: uuid::Uuid },

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    /// Task id not known to the manager
    #[error("task not found: {id}")]
    TaskNotFound { id: uuid::Uuid },

    /// Tool name not present in the registry
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    // =========================================================================
    // External Error Wrappers
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),
}

impl StewardError {
    /// Check if the error is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { status, .. } => matches!(status, 0 | 408 | 429 | 500 | 502 | 503 | 504),
            Self::ToolTimeout { .. } => true,

            Self::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),

            Self::SessionCreation { .. }
            | Self::UnsupportedRunner { .. }
            | Self::ToolExecution { .. }
            | Self::IterationLimit { .. }
            | Self::DuplicateApproval { .. }
            | Self::AlreadyResolved { .. }
            | Self::ApprovalNotFound { .. }
            | Self::TaskNotFound { .. }
            | Self::ToolNotFound { .. }
            | Self::InvalidConfig { .. }
            | Self::Json { .. } => false,
        }
    }

    /// Stable code string surfaced over the protocol
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionCreation { .. } => "session_creation",
            Self::UnsupportedRunner { .. } => "unsupported_runner",
            Self::Provider { .. } => "provider_error",
            Self::ToolExecution { .. } => "tool_execution",
            Self::ToolTimeout { .. } => "tool_timeout",
            Self::IterationLimit { .. } => "iteration_limit",
            Self::DuplicateApproval { .. } => "duplicate_approval",
            Self::AlreadyResolved { .. } => "already_resolved",
            Self::ApprovalNotFound { .. } => "approval_not_found",
            Self::TaskNotFound { .. } => "task_not_found",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }
}

impl From<serde_json::Error> for StewardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias using StewardError
pub type Result<T> = std::result::Result<T, StewardError>;
