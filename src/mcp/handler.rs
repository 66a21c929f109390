//! Server-side request handling
//!
//! An [`McpHandler`] answers JSON-RPC requests. The in-process transport pairs a
//! client with a handler, and the gateway itself is a handler.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::mcp::errors::McpError;
use crate::mcp::types::McpRequest;
use crate::mcp::types::McpResponse;

#[async_trait]
pub trait McpHandler: Send + Sync {
    /// Handle one message. Notifications yield `None`.
    async fn handle_request(&self, request: McpRequest) -> Option<McpResponse>;
}

/// Build the response for `request` from a handler outcome
pub fn respond(request: &McpRequest, outcome: Result<Value>) -> Option<McpResponse> {
    let id = request.id.clone()?;
    Some(match outcome {
        Ok(result) => McpResponse::success(id, result),
        Err(error) => McpResponse::failure(id, McpError::from(error)),
    })
}
