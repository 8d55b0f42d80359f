use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::error_codes;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(|v| v.as_str())
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.params.as_ref()?.get(key)?.as_bool()
    }

    pub fn param_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.params.as_ref()?.get(key)?.as_array()
    }

    pub fn param_u64(&self, key: &str, default: u64) -> u64 {
        self.params
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or(default)
    }

    pub fn param_u32(&self, key: &str, default: u32) -> u32 {
        self.param_u64(key, default as u64) as u32
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.as_ref()?.get(key)?.as_f64()
    }

    pub fn param_object(&self, key: &str) -> Option<&serde_json::Map<String, Value>> {
        self.params.as_ref()?.get(key)?.as_object()
    }

    #[allow(clippy::result_large_err)]
    pub fn require_str(&self, key: &str) -> Result<&str, RpcResponse> {
        self.param_str(key)
            .ok_or_else(|| RpcResponse::error(self.id, -32602, &format!("Missing '{}' param", key)))
    }
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    jsonrpc: String,
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcServerError>,
}

#[derive(Debug, Serialize)]
pub struct RpcServerError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Structured error data for programmatic handling by AI agents.
///
/// This provides rich context about errors including:
/// - Category for routing error handling logic
/// - Retryable flag for automatic retry decisions
/// - Context with error-specific details
/// - Suggestion for how to resolve the error
#[derive(Debug, Serialize)]
pub struct ErrorData {
    /// Error category (not_found, invalid_input, busy, internal, external, timeout)
    pub category: String,
    /// Whether this error might succeed on retry
    pub retryable: bool,
    /// Error-specific context (session_id, command, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Human-readable suggestion for resolving the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcServerError {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    /// Create an error response with structured ErrorData.
    ///
    /// This is the preferred method for domain errors as it provides
    /// machine-readable context for AI agents.
    pub fn error_with_data(id: u64, code: i32, message: &str, error_data: ErrorData) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcServerError {
                code,
                message: message.to_string(),
                data: Some(serde_json::to_value(error_data).unwrap_or(json!({}))),
            }),
        }
    }

    /// Create an error response from a DomainError-like interface.
    ///
    /// This helper constructs a fully structured error response with:
    /// - Semantic error code
    /// - Human-readable message
    /// - Category, retryable flag, context, and suggestion
    pub fn domain_error(
        id: u64,
        code: i32,
        message: &str,
        category: &str,
        context: Option<Value>,
        suggestion: Option<String>,
    ) -> Self {
        Self::error_with_data(
            id,
            code,
            message,
            ErrorData {
                category: category.to_string(),
                retryable: error_codes::is_retryable(code),
                context,
                suggestion,
            },
        )
    }

    pub fn action_success(id: u64) -> Self {
        Self::success(id, json!({ "success": true }))
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
