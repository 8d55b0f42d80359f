//! Domain errors for daemon operations.
//!
//! `SessionError` is the error type the core operations return.
//! `domain_error_response` maps each variant to a JSON-RPC error code and
//! attaches structured context so AI agents can handle failures
//! programmatically.

use agent_desktop_ipc::RpcResponse;
use agent_desktop_ipc::error_codes;
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("No session exists; create one first")]
    NoSession,
    #[error("Multiple sessions exist, specify one of: {}", .ids.join(", "))]
    Ambiguous { ids: Vec<String> },
    #[error("Display :{display} failed to initialize: {reason}")]
    InitFailed { display: u32, reason: String },
    #[error("Failed to launch '{command}': {reason}")]
    LaunchFailed { command: String, reason: String },
    #[error("{tool} failed: {stderr}")]
    ToolFailed { tool: String, stderr: String },
    #[error("{tool} timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
    #[error("Screen capture failed: {0}")]
    CaptureFailed(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Session limit reached: maximum {0} sessions allowed")]
    LimitReached(usize),
}

impl SessionError {
    /// Returns the JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            SessionError::NotFound(_) => error_codes::SESSION_NOT_FOUND,
            SessionError::NoSession => error_codes::NO_SESSION,
            SessionError::Ambiguous { .. } => error_codes::AMBIGUOUS_SESSION,
            SessionError::InitFailed { .. } => error_codes::INIT_FAILED,
            SessionError::LaunchFailed { .. } => error_codes::LAUNCH_FAILED,
            SessionError::ToolFailed { .. } => error_codes::TOOL_FAILED,
            SessionError::Timeout { .. } => error_codes::TOOL_TIMEOUT,
            SessionError::CaptureFailed(_) => error_codes::CAPTURE_FAILED,
            SessionError::InvalidArgument(_) => error_codes::INVALID_ARGUMENT,
            SessionError::LimitReached(_) => error_codes::SESSION_LIMIT,
        }
    }

    /// Returns structured context about the error for debugging.
    pub fn context(&self) -> Value {
        match self {
            SessionError::NotFound(id) => json!({ "session_id": id }),
            SessionError::NoSession => json!({}),
            SessionError::Ambiguous { ids } => json!({ "session_ids": ids }),
            SessionError::InitFailed { display, reason } => {
                json!({ "display": display, "reason": reason })
            }
            SessionError::LaunchFailed { command, reason } => {
                json!({ "command": command, "reason": reason })
            }
            SessionError::ToolFailed { tool, stderr } => {
                json!({ "tool": tool, "stderr": stderr })
            }
            SessionError::Timeout { tool, timeout_ms } => {
                json!({ "tool": tool, "timeout_ms": timeout_ms })
            }
            SessionError::CaptureFailed(reason) => json!({ "reason": reason }),
            SessionError::InvalidArgument(reason) => json!({ "reason": reason }),
            SessionError::LimitReached(max) => json!({ "max_sessions": max }),
        }
    }

    /// Returns a helpful suggestion for resolving the error.
    pub fn suggestion(&self) -> String {
        match self {
            SessionError::NotFound(_) | SessionError::NoSession => {
                "Run 'list' to see live sessions or 'create' to start a new one.".to_string()
            }
            SessionError::Ambiguous { .. } => {
                "Pass an explicit 'session' parameter.".to_string()
            }
            SessionError::InitFailed { .. } => {
                "Check that Xvfb is installed and the display number is free.".to_string()
            }
            SessionError::LaunchFailed { command, .. } => {
                format!(
                    "Command '{}' did not start. Check that it exists and is in PATH.",
                    command
                )
            }
            SessionError::ToolFailed { tool, .. } => {
                format!("Check that '{}' is installed and the session is alive.", tool)
            }
            SessionError::Timeout { .. } => {
                "The tool did not respond in time. The display may be overloaded; try again."
                    .to_string()
            }
            SessionError::CaptureFailed(_) => {
                "Check that ffmpeg is installed and the session is alive.".to_string()
            }
            SessionError::InvalidArgument(_) => {
                "Check the parameter types and allowed values for this method.".to_string()
            }
            SessionError::LimitReached(_) => {
                "Destroy unused sessions or raise AGENT_DESKTOP_MAX_SESSIONS.".to_string()
            }
        }
    }
}

/// Convert a SessionError into a structured JSON-RPC error response.
pub fn session_error_response(id: u64, err: &SessionError) -> RpcResponse {
    RpcResponse::domain_error(
        id,
        err.code(),
        &err.to_string(),
        error_codes::category_for_code(err.code()).as_str(),
        Some(err.context()),
        Some(err.suggestion()),
    )
}
