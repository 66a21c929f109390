//! MCP protocol types
//!
//! Listing entries keep any field they do not model in `extra`, so entries relayed
//! through the gateway reach the client with the target's metadata intact.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{GatewayError, Result};
use crate::mcp::errors::McpError;

/// Protocol version the gateway speaks by default
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

/// JSON-RPC method names used by the gateway
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const CANCELLED: &str = "notifications/cancelled";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
}

/// MCP Request message (a notification when `id` is absent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID (string or number, absent for notifications)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    /// Create a request expecting a response
    pub fn new<S: Into<String>>(id: Value, method: S, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Create a notification
    pub fn notification<S: Into<String>>(method: S, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Look up a string parameter
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.as_ref()?.get(key)?.as_str()
    }
}

/// MCP Response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID this responds to
    #[serde(default)]
    pub id: Value,
    /// Result (if successful)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (if failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: McpError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Turn the response into the call's outcome. Target errors are kept verbatim.
    pub fn into_result(self) -> Result<Value> {
        match (self.error, self.result) {
            (Some(error), _) => Err(GatewayError::Target(error)),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Object(Map::new())),
        }
    }
}

/// A message read off a transport
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Request or notification initiated by the peer
    Request(McpRequest),
    /// Response to one of our requests
    Response(McpResponse),
}

impl IncomingMessage {
    /// Classify a raw JSON-RPC message
    pub fn from_value(value: Value) -> Result<Self> {
        if value.get("method").is_some() {
            Ok(IncomingMessage::Request(serde_json::from_value(value)?))
        } else if value.get("result").is_some() || value.get("error").is_some() {
            Ok(IncomingMessage::Response(serde_json::from_value(value)?))
        } else {
            Err(GatewayError::protocol(format!(
                "Message is neither a request nor a response: {}",
                value
            )))
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }
}

/// Stable key used to pair responses with pending requests
pub fn request_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// MCP Tool definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (unique identifier within one target)
    pub name: String,
    /// Optional human-readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for input parameters
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
    /// Optional JSON Schema for the structured result
    #[serde(rename = "outputSchema", default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Optional tool annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tool {
    pub fn new<S: Into<String>>(name: S, description: Option<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            title: None,
            description,
            input_schema,
            output_schema: None,
            annotations: None,
            extra: Map::new(),
        }
    }
}

fn empty_object_schema() -> Value {
    json!({ "type": "object" })
}

/// Prompt template argument definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// Prompt template as listed by `prompts/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Unique template name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PromptArgument>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Rendered prompt message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role ("user" or "assistant")
    pub role: String,
    /// Message content block
    pub content: Value,
}

impl PromptMessage {
    /// A user message carrying a single text block
    pub fn user_text<S: Into<String>>(text: S) -> Self {
        Self {
            role: "user".to_string(),
            content: json!({ "type": "text", "text": text.into() }),
        }
    }
}

/// Result of `prompts/get`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptGetResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

/// MCP Resource definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource URI (unique identifier)
    pub uri: String,
    /// Human-readable name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource content
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// MCP Resource template definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    /// RFC 6570 URI template
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Name and version of a client or server implementation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

/// Result of the `initialize` handshake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: Value,
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}
