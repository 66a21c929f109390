//! In-process MCP server over a fixed prompt table

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{GatewayError, Result};
use crate::mcp::errors::McpError;
use crate::mcp::handler::{respond, McpHandler};
use crate::mcp::types::{
    methods, Implementation, InitializeResult, McpRequest, McpResponse, PromptGetResponse, PromptMessage,
    PromptTemplate, DEFAULT_PROTOCOL_VERSION,
};
use crate::prompts::Prompt;

/// Serves one immutable snapshot of a prompt table
pub struct PromptServer {
    name: String,
    prompts: Vec<Prompt>,
}

impl PromptServer {
    pub fn new(name: impl Into<String>, prompts: Vec<Prompt>) -> Self {
        Self {
            name: name.into(),
            prompts,
        }
    }

    fn initialize(&self, request: &McpRequest) -> Result<Value> {
        let result = InitializeResult {
            protocol_version: request
                .str_param("protocolVersion")
                .unwrap_or(DEFAULT_PROTOCOL_VERSION)
                .to_string(),
            capabilities: json!({ "prompts": { "listChanged": false }, "logging": {} }),
            server_info: Implementation {
                name: self.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
        };
        Ok(serde_json::to_value(result)?)
    }

    fn list(&self) -> Result<Value> {
        let prompts: Vec<PromptTemplate> = self
            .prompts
            .iter()
            .map(|prompt| PromptTemplate {
                name: prompt.name.clone(),
                title: Some(prompt.title.clone()),
                description: prompt.description.clone(),
                arguments: Vec::new(),
                extra: Default::default(),
            })
            .collect();
        Ok(json!({ "prompts": prompts }))
    }

    fn get(&self, request: &McpRequest) -> Result<Value> {
        let name = request
            .str_param("name")
            .ok_or_else(|| GatewayError::bad_request("prompts/get requires a 'name'"))?;
        let prompt = self
            .prompts
            .iter()
            .find(|prompt| prompt.name == name)
            .ok_or_else(|| {
                GatewayError::not_found(format!("Prompt '{}' not found", name)).with_context("name", name)
            })?;

        let response = PromptGetResponse {
            description: prompt.description.clone(),
            messages: vec![PromptMessage::user_text(prompt.body.clone())],
        };
        Ok(serde_json::to_value(response)?)
    }
}

#[async_trait]
impl McpHandler for PromptServer {
    async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        if request.is_notification() {
            return None;
        }

        let outcome = match request.method.as_str() {
            methods::INITIALIZE => self.initialize(&request),
            methods::PING => Ok(json!({})),
            methods::PROMPTS_LIST => self.list(),
            methods::PROMPTS_GET => self.get(&request),
            other => {
                let id = request.id.clone().unwrap_or(Value::Null);
                return Some(McpResponse::failure(id, McpError::method_not_found(other.to_string())));
            }
        };
        respond(&request, outcome)
    }
}
