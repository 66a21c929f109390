//! JSON-RPC error objects
//!
//! Gateway errors are rendered as JSON-RPC 2.0 error objects. The machine-readable
//! [`ErrorCode`](crate::error::ErrorCode) and the error context travel in `data`.
//! Errors produced by a target are re-emitted exactly as the target sent them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ErrorCode, GatewayError};

/// Error codes used on the gateway's own JSON-RPC surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpErrorCode {
    // Standard JSON-RPC error codes
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    // Gateway error codes (server error range)
    NotFound = -32001,
    Duplicate = -32002,
    Unauthorized = -32003,
    ConnectionRefused = -32004,
    RequestTimeout = -32005,
    RequestCancelled = -32006,
}

impl McpErrorCode {
    /// Get the error code as i32
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Get a default message for this error code
    pub fn default_message(&self) -> &'static str {
        match self {
            McpErrorCode::ParseError => "Parse error",
            McpErrorCode::InvalidRequest => "Invalid request",
            McpErrorCode::MethodNotFound => "Method not found",
            McpErrorCode::InvalidParams => "Invalid params",
            McpErrorCode::InternalError => "Internal error",
            McpErrorCode::NotFound => "Not found",
            McpErrorCode::Duplicate => "Duplicate",
            McpErrorCode::Unauthorized => "Unauthorized",
            McpErrorCode::ConnectionRefused => "Connection refused",
            McpErrorCode::RequestTimeout => "Request timed out",
            McpErrorCode::RequestCancelled => "Request cancelled",
        }
    }

    fn for_error_code(code: ErrorCode) -> Self {
        match code {
            ErrorCode::NotFound => McpErrorCode::NotFound,
            ErrorCode::Duplicate => McpErrorCode::Duplicate,
            ErrorCode::BadRequest => McpErrorCode::InvalidParams,
            ErrorCode::Unauthorized => McpErrorCode::Unauthorized,
            ErrorCode::ConnectionRefused => McpErrorCode::ConnectionRefused,
            ErrorCode::Timeout => McpErrorCode::RequestTimeout,
            ErrorCode::Cancelled => McpErrorCode::RequestCancelled,
            ErrorCode::TargetError | ErrorCode::Internal => McpErrorCode::InternalError,
        }
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    /// Create a new error
    pub fn new(code: McpErrorCode, message: String) -> Self {
        Self {
            code: code.code(),
            message,
            data: None,
        }
    }

    /// Create a new error with additional data
    pub fn with_data(code: McpErrorCode, message: String, data: Value) -> Self {
        Self {
            code: code.code(),
            message,
            data: Some(data),
        }
    }

    /// Create a parse error
    pub fn parse_error(message: String) -> Self {
        Self::new(McpErrorCode::ParseError, message)
    }

    /// Create an invalid request error
    pub fn invalid_request(message: String) -> Self {
        Self::new(McpErrorCode::InvalidRequest, message)
    }

    /// Create a method not found error
    pub fn method_not_found(method: String) -> Self {
        Self::with_data(
            McpErrorCode::MethodNotFound,
            format!("Method '{}' not found", method),
            json!({ "method": method }),
        )
    }

    /// Create an invalid params error
    pub fn invalid_params(message: String) -> Self {
        Self::new(McpErrorCode::InvalidParams, message)
    }

    /// Create an internal error
    pub fn internal_error(message: String) -> Self {
        Self::new(McpErrorCode::InternalError, message)
    }
}

impl From<GatewayError> for McpError {
    fn from(error: GatewayError) -> Self {
        if let GatewayError::Target(native) = error {
            return native;
        }

        let code = error.code();
        let mut data = Map::new();
        data.insert("code".to_string(), json!(code));
        data.insert("category".to_string(), json!(error.category()));
        let context = error.context();
        if !context.is_empty() {
            data.insert("context".to_string(), json!(context));
        }

        McpError::with_data(
            McpErrorCode::for_error_code(code),
            error.to_string(),
            Value::Object(data),
        )
    }
}
