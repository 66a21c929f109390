//! Error types and handling for the capability gateway

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mcp::errors::McpError;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Structured context attached to an error (offending name, URL, command, ...)
pub type ErrorContext = BTreeMap<String, String>;

/// Machine-readable error code carried by every surfaced error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    Duplicate,
    BadRequest,
    Unauthorized,
    ConnectionRefused,
    Timeout,
    Cancelled,
    TargetError,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Duplicate => "DUPLICATE",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::TargetError => "TARGET_ERROR",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Unknown target, prompt, tool or resource
    #[error("Not found: {message}")]
    NotFound { message: String, context: ErrorContext },

    /// Name collision on registration
    #[error("Duplicate: {message}")]
    Duplicate { message: String, context: ErrorContext },

    /// Invalid attributes or arguments
    #[error("Bad request: {message}")]
    BadRequest { message: String, context: ErrorContext },

    /// Authorization-class failure reported by a target
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String, context: ErrorContext },

    /// Nothing listening, spawn failure or connect timeout
    #[error("Connection refused: {message}")]
    ConnectionRefused { message: String, context: ErrorContext },

    /// An outbound request exceeded the caller's deadline
    #[error("Request timed out: {message}")]
    Timeout { message: String, context: ErrorContext },

    /// An outbound request was cancelled by the caller
    #[error("Request cancelled: {message}")]
    Cancelled { message: String, context: ErrorContext },

    /// Error returned by a target, passed through unmodified
    #[error("Target error {}: {}", .0.code, .0.message)]
    Target(McpError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Malformed traffic on a transport
    #[error("MCP protocol error: {message}")]
    Protocol { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Create a not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a duplicate error
    pub fn duplicate<S: Into<String>>(message: S) -> Self {
        Self::Duplicate {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a bad-request error
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create an authorization error
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a connection-refused error
    pub fn connection_refused<S: Into<String>>(message: S) -> Self {
        Self::ConnectionRefused {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::Cancelled {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Attach a context entry. Variants without a context map are returned unchanged.
    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        if let Some(context) = self.context_mut() {
            context.insert(key.into(), value.into());
        }
        self
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            GatewayError::NotFound { context, .. }
            | GatewayError::Duplicate { context, .. }
            | GatewayError::BadRequest { context, .. }
            | GatewayError::Unauthorized { context, .. }
            | GatewayError::ConnectionRefused { context, .. }
            | GatewayError::Timeout { context, .. }
            | GatewayError::Cancelled { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Structured context of this error, empty when none was attached
    pub fn context(&self) -> ErrorContext {
        match self {
            GatewayError::NotFound { context, .. }
            | GatewayError::Duplicate { context, .. }
            | GatewayError::BadRequest { context, .. }
            | GatewayError::Unauthorized { context, .. }
            | GatewayError::ConnectionRefused { context, .. }
            | GatewayError::Timeout { context, .. }
            | GatewayError::Cancelled { context, .. } => context.clone(),
            _ => ErrorContext::new(),
        }
    }

    /// Machine-readable code of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::NotFound { .. } => ErrorCode::NotFound,
            GatewayError::Duplicate { .. } => ErrorCode::Duplicate,
            GatewayError::BadRequest { .. } | GatewayError::Config { .. } => ErrorCode::BadRequest,
            GatewayError::Unauthorized { .. } => ErrorCode::Unauthorized,
            GatewayError::ConnectionRefused { .. } => ErrorCode::ConnectionRefused,
            GatewayError::Timeout { .. } => ErrorCode::Timeout,
            GatewayError::Cancelled { .. } => ErrorCode::Cancelled,
            GatewayError::Target(_) => ErrorCode::TargetError,
            GatewayError::Protocol { .. }
            | GatewayError::Io(_)
            | GatewayError::Serde(_)
            | GatewayError::Yaml(_)
            | GatewayError::Http(_)
            | GatewayError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this error is an authorization-class failure
    pub fn is_unauthorized(&self) -> bool {
        self.code() == ErrorCode::Unauthorized
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::NotFound { .. }
            | GatewayError::Duplicate { .. }
            | GatewayError::BadRequest { .. }
            | GatewayError::Config { .. } => "config",
            GatewayError::Unauthorized { .. } => "auth",
            GatewayError::ConnectionRefused { .. }
            | GatewayError::Timeout { .. }
            | GatewayError::Cancelled { .. } => "connection",
            GatewayError::Target(_) => "target",
            GatewayError::Protocol { .. } => "mcp",
            GatewayError::Io(_) => "io",
            GatewayError::Serde(_) => "serialization",
            GatewayError::Yaml(_) => "yaml",
            GatewayError::Http(_) => "http",
            GatewayError::Internal(_) => "internal",
        }
    }
}

impl Clone for GatewayError {
    fn clone(&self) -> Self {
        match self {
            GatewayError::NotFound { message, context } => GatewayError::NotFound {
                message: message.clone(),
                context: context.clone(),
            },
            GatewayError::Duplicate { message, context } => GatewayError::Duplicate {
                message: message.clone(),
                context: context.clone(),
            },
            GatewayError::BadRequest { message, context } => GatewayError::BadRequest {
                message: message.clone(),
                context: context.clone(),
            },
            GatewayError::Unauthorized { message, context } => GatewayError::Unauthorized {
                message: message.clone(),
                context: context.clone(),
            },
            GatewayError::ConnectionRefused { message, context } => GatewayError::ConnectionRefused {
                message: message.clone(),
                context: context.clone(),
            },
            GatewayError::Timeout { message, context } => GatewayError::Timeout {
                message: message.clone(),
                context: context.clone(),
            },
            GatewayError::Cancelled { message, context } => GatewayError::Cancelled {
                message: message.clone(),
                context: context.clone(),
            },
            GatewayError::Target(error) => GatewayError::Target(error.clone()),
            GatewayError::Config { message } => GatewayError::Config { message: message.clone() },
            GatewayError::Protocol { message } => GatewayError::Protocol { message: message.clone() },

            // Non-cloneable sources keep their rendered message
            GatewayError::Io(e) => GatewayError::Io(std::io::Error::new(e.kind(), e.to_string())),
            GatewayError::Serde(e) => GatewayError::protocol(format!("Serialization error: {}", e)),
            GatewayError::Yaml(e) => GatewayError::config(format!("YAML error: {}", e)),
            GatewayError::Http(e) => GatewayError::protocol(format!("HTTP client error: {}", e)),
            GatewayError::Internal(e) => GatewayError::Internal(anyhow::anyhow!("{}", e)),
        }
    }
}
