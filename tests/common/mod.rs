//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use capmux::config::{CapabilitySet, McpClientConfig};
use capmux::error::GatewayError;
use capmux::gateway::{ConnectOptions, GatewayServer, Target};
use capmux::mcp::handler::respond;
use capmux::mcp::{McpHandler, McpRequest, McpResponse};

/// In-process MCP server with a fixed catalogue.
///
/// Only the capability kinds it actually holds are advertised. Every call is
/// answered with `<server>:<name>` so tests can tell which target served it.
#[derive(Clone, Default)]
pub struct FixtureServer {
    pub name: String,
    pub tools: Vec<String>,
    pub prompts: Vec<String>,
    pub resources: Vec<String>,
    pub templates: Vec<String>,
    /// Tools that never answer within a test's lifetime
    pub slow_tools: Vec<String>,
}

impl FixtureServer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn prompts(mut self, prompts: &[&str]) -> Self {
        self.prompts = prompts.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn resources(mut self, resources: &[&str]) -> Self {
        self.resources = resources.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn templates(mut self, templates: &[&str]) -> Self {
        self.templates = templates.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn slow_tool(mut self, tool: &str) -> Self {
        self.tools.push(tool.to_string());
        self.slow_tools.push(tool.to_string());
        self
    }

    fn capabilities(&self) -> Value {
        let mut capabilities = Map::new();
        if !self.tools.is_empty() {
            capabilities.insert("tools".to_string(), json!({}));
        }
        if !self.prompts.is_empty() {
            capabilities.insert("prompts".to_string(), json!({}));
        }
        if !self.resources.is_empty() || !self.templates.is_empty() {
            capabilities.insert("resources".to_string(), json!({ "subscribe": true }));
        }
        Value::Object(capabilities)
    }

    fn tag(&self, key: &str) -> String {
        format!("{}:{}", self.name, key)
    }

    fn served(&self, key: &str) -> bool {
        self.resources.iter().any(|r| r == key)
            || self
                .templates
                .iter()
                .any(|t| key.starts_with(t.split('{').next().unwrap_or_default()))
    }
}

#[async_trait]
impl McpHandler for FixtureServer {
    async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        if request.is_notification() {
            return None;
        }

        let name = request.str_param("name").unwrap_or_default().to_string();
        let uri = request.str_param("uri").unwrap_or_default().to_string();
        let outcome = match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": "2025-06-18",
                "capabilities": self.capabilities(),
                "serverInfo": { "name": self.name, "version": "0.0.1" }
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({
                "tools": self.tools.iter().map(|t| json!({
                    "name": t,
                    "description": format!("{} from {}", t, self.name),
                    "inputSchema": { "type": "object" }
                })).collect::<Vec<_>>()
            })),
            "tools/call" if self.slow_tools.contains(&name) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!({ "content": [] }))
            }
            "tools/call" if self.tools.contains(&name) => Ok(json!({
                "content": [{ "type": "text", "text": self.tag(&name) }],
                "arguments": request.params.as_ref().and_then(|p| p.get("arguments")).cloned()
            })),
            "prompts/list" => Ok(json!({
                "prompts": self.prompts.iter().map(|p| json!({ "name": p })).collect::<Vec<_>>()
            })),
            "prompts/get" if self.prompts.contains(&name) => Ok(json!({
                "messages": [{ "role": "user", "content": { "type": "text", "text": self.tag(&name) } }]
            })),
            "resources/list" => Ok(json!({
                "resources": self.resources.iter().map(|r| json!({ "uri": r, "name": r })).collect::<Vec<_>>()
            })),
            "resources/templates/list" => Ok(json!({
                "resourceTemplates": self.templates.iter().map(|t| json!({ "uriTemplate": t, "name": t })).collect::<Vec<_>>()
            })),
            "resources/read" if self.served(&uri) => Ok(json!({
                "contents": [{ "uri": uri, "text": self.tag(&uri) }]
            })),
            "resources/subscribe" | "resources/unsubscribe" if self.served(&uri) => Ok(json!({})),
            other => Err(GatewayError::not_found(format!("{} cannot serve {} '{}{}'", self.name, other, name, uri))),
        };
        respond(&request, outcome)
    }
}

pub fn target(fixture: FixtureServer) -> Target {
    let name = fixture.name.clone();
    Target::in_process(name, Arc::new(fixture), McpClientConfig::default())
}

pub fn gateway() -> Arc<GatewayServer> {
    Arc::new(GatewayServer::new("test-gateway", CapabilitySet::default()))
}

/// Gateway with every fixture registered and connected, in order
pub async fn gateway_with(fixtures: Vec<FixtureServer>) -> Arc<GatewayServer> {
    let gateway = gateway();
    for fixture in fixtures {
        gateway
            .add_target(target(fixture), ConnectOptions::throwing())
            .await
            .expect("fixture target connects");
    }
    gateway
}

/// Run one request through the gateway and return its result or error object
pub async fn call(gateway: &GatewayServer, method: &str, params: Value) -> Result<Value, Value> {
    let request = McpRequest::new(json!(1), method, Some(params));
    let response = gateway.handle_request(request).await.expect("requests get a response");
    match (response.result, response.error) {
        (Some(result), None) => Ok(result),
        (_, Some(error)) => Err(serde_json::to_value(error).expect("error serializes")),
        (None, None) => Ok(Value::Null),
    }
}

pub fn names(listing: &Value, key: &str, field: &str) -> Vec<String> {
    listing[key]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item[field].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
