//! The gateway registry
//!
//! [`GatewayServer`] owns the ordered target list and answers the protocol surface
//! by running the capability handlers over a snapshot of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CapabilitySet, Config};
use crate::error::{GatewayError, Result};
use crate::gateway::capabilities::{prompts, resource_templates, resources, tools};
use crate::gateway::naming;
use crate::gateway::target::{ConnectOptions, Target, TargetAttributes, TargetInfo, TargetUpdate};
use crate::mcp::clients::RequestOptions;
use crate::mcp::errors::McpError;
use crate::mcp::handler::{respond, McpHandler};
use crate::mcp::types::{
    methods, Implementation, InitializeResult, McpRequest, McpResponse, DEFAULT_PROTOCOL_VERSION,
};
use crate::prompts::PromptManager;

/// Targets whose close failed during [`GatewayServer::close`]
#[derive(Debug, Default)]
pub struct CloseReport {
    pub failures: Vec<(String, GatewayError)>,
}

impl CloseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct GatewayServer {
    id: String,
    instructions: Option<String>,
    capabilities: CapabilitySet,
    targets: RwLock<Vec<Arc<Target>>>,
    prompt_manager: RwLock<Option<Arc<PromptManager>>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl GatewayServer {
    pub fn new(id: impl Into<String>, capabilities: CapabilitySet) -> Self {
        Self {
            id: id.into(),
            instructions: None,
            capabilities,
            targets: RwLock::new(Vec::new()),
            prompt_manager: RwLock::new(None),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Build a gateway from configuration and connect its targets.
    ///
    /// Target connect failures are logged, never fatal. The prompt provider is
    /// mounted first when the gateway advertises prompts.
    pub async fn from_config(config: &Config) -> Result<Arc<Self>> {
        config.validate()?;
        let mut server = Self::new(config.gateway.id.clone(), config.gateway.capabilities);
        server.instructions = config.gateway.instructions.clone();
        let server = Arc::new(server);

        if config.gateway.capabilities.prompts {
            let manager = PromptManager::new(config.prompts.clone(), config.client.clone())?;
            server.mount_prompt_manager(Arc::new(manager)).await?;
        }

        for target_config in &config.targets {
            let target = Target::from_config(target_config, &config.client)?;
            server.add_target(target, ConnectOptions::default()).await?;
        }

        Ok(server)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Token cancelled once the gateway has closed
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Register the prompt provider's target and keep a handle on the provider
    pub async fn mount_prompt_manager(&self, manager: Arc<PromptManager>) -> Result<()> {
        self.add_target(manager.target(), ConnectOptions::throwing()).await?;
        *self.prompt_manager.write().await = Some(manager);
        Ok(())
    }

    pub async fn prompt_manager(&self) -> Option<Arc<PromptManager>> {
        self.prompt_manager.read().await.clone()
    }

    /// Register and connect a target.
    ///
    /// Fails `DUPLICATE` on a case-insensitive name collision. Authorization
    /// failures while connecting are always swallowed; other connect failures
    /// are returned only with `throw_on_error`.
    pub async fn add_target(&self, target: impl Into<Arc<Target>>, options: ConnectOptions) -> Result<Arc<Target>> {
        let target: Arc<Target> = target.into();
        if self.is_closed() {
            return Err(GatewayError::bad_request(format!("Gateway '{}' is closed", self.id)));
        }
        naming::validate_target_name(target.name())?;
        {
            let attributes = target.attributes().await;
            let targets = self.targets.read().await;
            self.check_admissible(&targets, &target, &attributes).await?;
        }

        match target.connect(options).await {
            Ok(()) => {}
            Err(e) if e.is_unauthorized() => {
                warn!(
                    target_name = %target.name(),
                    error_code = %e.code(),
                    "Target requires authorization, keeping it registered but disconnected: {}",
                    e
                );
            }
            Err(e) => return Err(e),
        }

        let mut targets = self.targets.write().await;
        let attributes = target.attributes().await;
        let admissible = self.check_admissible(&targets, &target, &attributes).await;
        if let Err(e) = admissible {
            drop(targets);
            if let Err(close_err) = target.close().await {
                debug!("Failed to close rejected target '{}': {}", target.name(), close_err);
            }
            return Err(e);
        }
        targets.push(Arc::clone(&target));
        info!(target_name = %target.name(), "Target registered");
        Ok(target)
    }

    async fn check_admissible(
        &self,
        targets: &[Arc<Target>],
        candidate: &Arc<Target>,
        attributes: &TargetAttributes,
    ) -> Result<()> {
        if targets.iter().any(|t| t.is_named(candidate.name())) {
            return Err(
                GatewayError::duplicate(format!("Target '{}' already exists", candidate.name()))
                    .with_context("name", candidate.name()),
            );
        }
        check_prefix(targets, candidate.name(), attributes.tool_prefix.as_deref()).await
    }

    /// Close and unregister a target
    pub async fn remove_target(&self, name: &str) -> Result<Arc<Target>> {
        let removed = {
            let mut targets = self.targets.write().await;
            let index = targets
                .iter()
                .position(|t| t.is_named(name))
                .ok_or_else(|| target_not_found(name))?;
            targets.remove(index)
        };

        {
            let mut manager = self.prompt_manager.write().await;
            if manager.as_ref().is_some_and(|m| Arc::ptr_eq(&m.target(), &removed)) {
                debug!(target_name = %removed.name(), "Unmounting prompt manager");
                *manager = None;
            }
        }

        if let Err(e) = removed.close().await {
            warn!(target_name = %removed.name(), "Failed to close removed target: {}", e);
        }
        info!(target_name = %removed.name(), "Target removed");
        Ok(removed)
    }

    /// Apply a partial attribute update to a target
    pub async fn update_target(&self, name: &str, update: TargetUpdate) -> Result<TargetAttributes> {
        // The write lock keeps the prefix check and the update atomic
        let targets = self.targets.write().await;
        let target = targets
            .iter()
            .find(|t| t.is_named(name))
            .cloned()
            .ok_or_else(|| target_not_found(name))?;

        if let Some(prefix) = update.tool_prefix.as_deref() {
            let others: Vec<Arc<Target>> = targets
                .iter()
                .filter(|t| !Arc::ptr_eq(t, &target))
                .cloned()
                .collect();
            check_prefix(&others, target.name(), Some(prefix)).await?;
        }

        Ok(target.update(update).await)
    }

    pub async fn get_target(&self, name: &str) -> Result<Arc<Target>> {
        self.targets
            .read()
            .await
            .iter()
            .find(|t| t.is_named(name))
            .cloned()
            .ok_or_else(|| target_not_found(name))
    }

    /// Snapshot of the registered targets, in registration order
    pub async fn targets(&self) -> Vec<Arc<Target>> {
        self.targets.read().await.clone()
    }

    pub async fn list_targets(&self) -> Vec<TargetInfo> {
        let targets = self.targets().await;
        join_all(targets.iter().map(|t| t.info())).await
    }

    /// Reconnect every registered target, one after another
    pub async fn connect_targets(&self, options: ConnectOptions) -> Result<()> {
        for target in self.targets().await {
            target.connect(options).await?;
        }
        Ok(())
    }

    /// Close every target concurrently, then stop serving. Safe to call more than once.
    pub async fn close(&self) -> CloseReport {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Gateway '{}' already closed", self.id);
            return CloseReport::default();
        }

        info!("Closing gateway '{}'", self.id);
        let targets = self.targets().await;
        let outcomes = join_all(targets.iter().map(|target| async move {
            (target.name().to_string(), target.close().await)
        }))
        .await;

        let mut report = CloseReport::default();
        for (name, outcome) in outcomes {
            if let Err(e) = outcome {
                warn!(target_name = %name, "Failed to close target: {}", e);
                report.failures.push((name, e));
            }
        }

        self.shutdown.cancel();
        report
    }

    fn supports(&self, method: &str) -> bool {
        let caps = &self.capabilities;
        match method {
            methods::INITIALIZE | methods::PING => true,
            methods::TOOLS_LIST | methods::TOOLS_CALL => caps.tools,
            methods::PROMPTS_LIST | methods::PROMPTS_GET => caps.prompts,
            methods::RESOURCES_LIST | methods::RESOURCES_READ => caps.resources,
            methods::RESOURCES_TEMPLATES_LIST => caps.resources && caps.resource_templates,
            methods::RESOURCES_SUBSCRIBE | methods::RESOURCES_UNSUBSCRIBE => {
                caps.resources && caps.resource_subscriptions
            }
            _ => false,
        }
    }

    fn advertised_capabilities(&self) -> Value {
        let caps = &self.capabilities;
        let mut advertised = serde_json::Map::new();
        if caps.tools {
            advertised.insert("tools".to_string(), json!({ "listChanged": false }));
        }
        if caps.prompts {
            advertised.insert("prompts".to_string(), json!({ "listChanged": false }));
        }
        if caps.resources {
            advertised.insert(
                "resources".to_string(),
                json!({ "subscribe": caps.resource_subscriptions, "listChanged": false }),
            );
        }
        Value::Object(advertised)
    }

    fn initialize(&self, request: &McpRequest) -> Result<Value> {
        let result = InitializeResult {
            protocol_version: request
                .str_param("protocolVersion")
                .unwrap_or(DEFAULT_PROTOCOL_VERSION)
                .to_string(),
            capabilities: self.advertised_capabilities(),
            server_info: Implementation {
                name: self.id.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: self.instructions.clone(),
        };
        Ok(serde_json::to_value(result)?)
    }

    /// Answer one request, forwarding `options` to whichever target serves it
    pub async fn dispatch(&self, request: McpRequest, options: RequestOptions) -> Option<McpResponse> {
        if request.is_notification() {
            debug!("Gateway '{}' notification: {}", self.id, request.method);
            return None;
        }
        if !self.supports(&request.method) {
            let id = request.id.clone().unwrap_or(Value::Null);
            return Some(McpResponse::failure(id, McpError::method_not_found(request.method)));
        }

        let outcome = self.route(&request, &options).await;
        if let Err(e) = &outcome {
            debug!("'{}' failed with {}: {}", request.method, e.code(), e);
        }
        respond(&request, outcome)
    }

    async fn route(&self, request: &McpRequest, options: &RequestOptions) -> Result<Value> {
        let targets = self.targets().await;
        let params = request.params.as_ref();
        let arguments = params.and_then(|p| p.get("arguments")).cloned();

        match request.method.as_str() {
            methods::INITIALIZE => self.initialize(request),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => Ok(json!({ "tools": tools::list_tools(&targets).await })),
            methods::TOOLS_CALL => {
                let name = required_param(request, "name")?;
                tools::call_tool(&targets, name, arguments, options).await
            }
            methods::PROMPTS_LIST => Ok(json!({ "prompts": prompts::list_prompts(&targets).await })),
            methods::PROMPTS_GET => {
                let name = required_param(request, "name")?;
                prompts::get_prompt(&targets, name, arguments, options).await
            }
            methods::RESOURCES_LIST => Ok(json!({ "resources": resources::list_resources(&targets).await })),
            methods::RESOURCES_READ => {
                let uri = required_param(request, "uri")?;
                resources::read_resource(&targets, uri, options).await
            }
            methods::RESOURCES_TEMPLATES_LIST => Ok(json!({
                "resourceTemplates": resource_templates::list_resource_templates(&targets).await
            })),
            methods::RESOURCES_SUBSCRIBE => {
                let uri = required_param(request, "uri")?;
                resources::subscribe_resource(&targets, uri, options).await
            }
            methods::RESOURCES_UNSUBSCRIBE => {
                let uri = required_param(request, "uri")?;
                resources::unsubscribe_resource(&targets, uri, options).await
            }
            other => Err(GatewayError::protocol(format!("Unroutable method '{}'", other))),
        }
    }
}

#[async_trait]
impl McpHandler for GatewayServer {
    async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        self.dispatch(request, RequestOptions::default()).await
    }
}

/// Reject a prefix overlapping another target's prefix
async fn check_prefix(others: &[Arc<Target>], name: &str, prefix: Option<&str>) -> Result<()> {
    let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    for other in others {
        if let Some(existing) = other.attributes().await.tool_prefix {
            if naming::prefixes_overlap(prefix, &existing) {
                return Err(GatewayError::bad_request(format!(
                    "Tool prefix '{}' of target '{}' overlaps prefix '{}' of target '{}'",
                    prefix,
                    name,
                    existing,
                    other.name()
                ))
                .with_context("name", name)
                .with_context("tool_prefix", prefix));
            }
        }
    }
    Ok(())
}

fn required_param<'a>(request: &'a McpRequest, key: &str) -> Result<&'a str> {
    request.str_param(key).ok_or_else(|| {
        GatewayError::bad_request(format!("'{}' requires a string '{}' parameter", request.method, key))
            .with_context("param", key)
    })
}

fn target_not_found(name: &str) -> GatewayError {
    GatewayError::not_found(format!("Target '{}' not found", name)).with_context("name", name)
}

