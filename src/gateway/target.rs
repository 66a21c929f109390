//! Backend targets
//!
//! A [`Target`] owns its transport connection, a connection status and the live
//! attributes (`tool_prefix`, `disabled_tools`, `disabled`) the capability handlers
//! read on every aggregation pass.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{McpClientConfig, TargetConfig};
use crate::error::{GatewayError, Result};
use crate::gateway::naming;
use crate::mcp::clients::{Connection, RequestOptions};
use crate::mcp::handler::McpHandler;
use crate::mcp::transport::{TargetTransport, TransportKind};
use crate::mcp::types::{methods, InitializeResult, PromptTemplate, Resource, ResourceTemplate, Tool};

/// Connection status of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Disconnected,
    Connected,
    Error,
}

/// Options for [`Target::connect`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectOptions {
    /// Propagate connect failures instead of logging them
    pub throw_on_error: bool,
}

impl ConnectOptions {
    pub fn throwing() -> Self {
        Self { throw_on_error: true }
    }
}

/// Attributes that can change while the target stays connected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAttributes {
    pub tool_prefix: Option<String>,
    pub disabled_tools: BTreeSet<String>,
    pub disabled: bool,
}

/// Partial attribute update; `None` fields are left unchanged.
/// An empty `tool_prefix` clears the prefix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetUpdate {
    #[serde(default)]
    pub tool_prefix: Option<String>,
    #[serde(default)]
    pub disabled_tools: Option<Vec<String>>,
    #[serde(default)]
    pub disabled: Option<bool>,
}

/// Serializable snapshot of a target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetInfo {
    pub name: String,
    pub transport: TransportKind,
    pub endpoint: String,
    pub status: TargetStatus,
    #[serde(flatten)]
    pub attributes: TargetAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

struct Session {
    status: TargetStatus,
    connection: Option<Arc<Connection>>,
    server_info: Option<InitializeResult>,
    last_error: Option<String>,
}

/// One backend server multiplexed by the gateway
pub struct Target {
    name: String,
    transport: RwLock<TargetTransport>,
    client_config: McpClientConfig,
    attributes: RwLock<TargetAttributes>,
    /// Serializes connect and close; holds the live connection
    session: Mutex<Session>,
}

impl Target {
    pub fn new(name: impl Into<String>, transport: TargetTransport, client_config: McpClientConfig) -> Self {
        Self {
            name: name.into(),
            transport: RwLock::new(transport),
            client_config,
            attributes: RwLock::new(TargetAttributes::default()),
            session: Mutex::new(Session {
                status: TargetStatus::Disconnected,
                connection: None,
                server_info: None,
                last_error: None,
            }),
        }
    }

    /// Target backed by a handler in this process
    pub fn in_process(
        name: impl Into<String>,
        handler: Arc<dyn McpHandler>,
        client_config: McpClientConfig,
    ) -> Self {
        Self::new(name, TargetTransport::InProcess { handler }, client_config)
    }

    /// Build an unconnected target from configuration
    pub fn from_config(config: &TargetConfig, client_config: &McpClientConfig) -> Result<Self> {
        config.validate()?;
        let attributes = TargetAttributes {
            tool_prefix: config.tool_prefix.clone().filter(|p| !p.is_empty()),
            disabled_tools: config.disabled_tools.iter().cloned().collect(),
            disabled: config.disabled,
        };
        Ok(Self::new(
            config.name.clone(),
            TargetTransport::from_config(&config.transport)?,
            client_config.clone(),
        )
        .with_attributes(attributes))
    }

    /// Set the initial attributes of a target that is not registered yet
    pub fn with_attributes(self, attributes: TargetAttributes) -> Self {
        Self {
            attributes: RwLock::new(attributes),
            ..self
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn status(&self) -> TargetStatus {
        self.session.lock().await.status
    }

    pub async fn attributes(&self) -> TargetAttributes {
        self.attributes.read().await.clone()
    }

    pub async fn transport_kind(&self) -> TransportKind {
        self.transport.read().await.kind()
    }

    pub async fn info(&self) -> TargetInfo {
        let session = self.session.lock().await;
        let transport = self.transport.read().await;
        TargetInfo {
            name: self.name.clone(),
            transport: transport.kind(),
            endpoint: transport.endpoint(),
            status: session.status,
            attributes: self.attributes.read().await.clone(),
            last_error: session.last_error.clone(),
            server_name: session.server_info.as_ref().map(|i| i.server_info.name.clone()),
        }
    }

    /// Connect, replacing any existing session.
    ///
    /// On failure the status becomes `error` (`disconnected` for authorization
    /// failures); the error is returned only when `throw_on_error` is set.
    pub async fn connect(&self, options: ConnectOptions) -> Result<()> {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.connection.take() {
            debug!("Closing previous session of target '{}' before reconnecting", self.name);
            if let Err(e) = previous.close().await {
                warn!("Failed to close previous session of target '{}': {}", self.name, e);
            }
        }

        let transport = self.transport.read().await.clone();
        let kind = transport.kind();
        info!(target_name = %self.name, transport = %kind, endpoint = %transport.endpoint(), "Connecting to target");

        match self.open(&transport).await {
            Ok((connection, server_info)) => {
                session.connection = Some(Arc::new(connection));
                session.server_info = Some(server_info);
                session.status = TargetStatus::Connected;
                session.last_error = None;
                info!(target_name = %self.name, transport = %kind, "Target connected");
                Ok(())
            }
            Err(e) => {
                let e = with_endpoint_context(e, &self.name, &transport);
                session.status = if e.is_unauthorized() {
                    TargetStatus::Disconnected
                } else {
                    TargetStatus::Error
                };
                session.last_error = Some(e.to_string());
                error!(
                    target_name = %self.name,
                    transport = %kind,
                    error_code = %e.code(),
                    "Failed to connect to target: {}",
                    e
                );
                if options.throw_on_error {
                    Err(e)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Close the connection. A target that is not connected is left as is.
    pub async fn close(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let Some(connection) = session.connection.take() else {
            debug!("Target '{}' has no open connection", self.name);
            return Ok(());
        };

        session.status = TargetStatus::Disconnected;
        session.server_info = None;
        info!(target_name = %self.name, "Closing target");
        connection.close().await
    }

    /// Open a connection over `transport`, bounded by the connect timeout
    async fn open(&self, transport: &TargetTransport) -> Result<(Connection, InitializeResult)> {
        let limit = self.client_config.connect_timeout();
        match tokio::time::timeout(limit, Connection::open(&self.name, transport, &self.client_config)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let (key, value) = transport.context_entry();
                Err(GatewayError::connection_refused(format!(
                    "Timed out connecting to target '{}' after {:?}",
                    self.name, limit
                ))
                .with_context("name", &self.name)
                .with_context(key, value))
            }
        }
    }

    /// Swap the in-process handler.
    ///
    /// The new server is connected before the old one is retired, and the swap
    /// happens under the session lock, so concurrent callers always reach one of
    /// the two. When the new server cannot be connected the old one keeps serving.
    pub async fn rebuild(&self, handler: Arc<dyn McpHandler>, options: ConnectOptions) -> Result<()> {
        {
            let transport = self.transport.read().await;
            if !matches!(*transport, TargetTransport::InProcess { .. }) {
                return Err(GatewayError::bad_request(format!(
                    "Target '{}' is not an in-process target",
                    self.name
                ))
                .with_context("name", &self.name));
            }
        }

        let transport = TargetTransport::InProcess { handler };
        let (connection, server_info) = match self.open(&transport).await {
            Ok(opened) => opened,
            Err(e) => {
                let e = with_endpoint_context(e, &self.name, &transport);
                error!(target_name = %self.name, error_code = %e.code(), "Failed to rebuild target: {}", e);
                return if options.throw_on_error { Err(e) } else { Ok(()) };
            }
        };

        let mut session = self.session.lock().await;
        *self.transport.write().await = transport;
        // In-flight requests hold their own handle on the retired connection
        let retired = session.connection.replace(Arc::new(connection));
        session.server_info = Some(server_info);
        session.status = TargetStatus::Connected;
        session.last_error = None;
        drop(session);

        if retired.is_some() {
            debug!("Retired previous in-process server of target '{}'", self.name);
        }
        info!(target_name = %self.name, "Target rebuilt");
        Ok(())
    }

    /// Apply a partial attribute update
    pub async fn update(&self, update: TargetUpdate) -> TargetAttributes {
        let mut attributes = self.attributes.write().await;
        if let Some(prefix) = update.tool_prefix {
            attributes.tool_prefix = Some(prefix).filter(|p| !p.is_empty());
        }
        if let Some(disabled_tools) = update.disabled_tools {
            attributes.disabled_tools = disabled_tools.into_iter().collect();
        }
        if let Some(disabled) = update.disabled {
            if attributes.disabled != disabled {
                info!(target_name = %self.name, disabled, "Target enablement changed");
            }
            attributes.disabled = disabled;
        }
        attributes.clone()
    }

    /// Exclude the target from aggregation, or bring it back. The connection is untouched.
    pub async fn set_disabled(&self, disabled: bool) {
        self.update(TargetUpdate {
            disabled: Some(disabled),
            ..TargetUpdate::default()
        })
        .await;
    }

    async fn connection(&self) -> Result<Arc<Connection>> {
        let session = self.session.lock().await;
        session.connection.clone().ok_or_else(|| {
            GatewayError::connection_refused(format!("Target '{}' is not connected", self.name))
                .with_context("name", &self.name)
        })
    }

    /// Forward a request to the target
    pub async fn request(&self, method: &str, params: Option<Value>, options: &RequestOptions) -> Result<Value> {
        let connection = self.connection().await?;
        debug!("Forwarding '{}' to target '{}'", method, self.name);
        connection.request(method, params, options).await
    }

    /// Whether the target advertised `capability` during `initialize`
    pub async fn advertises(&self, capability: &str) -> bool {
        let session = self.session.lock().await;
        session
            .server_info
            .as_ref()
            .map(|info| info.capabilities.get(capability).is_some())
            .unwrap_or(false)
    }

    /// Fetch every page of a listing. Kinds the target did not advertise list as empty.
    async fn list_all<T: serde::de::DeserializeOwned>(
        &self,
        capability: &str,
        method: &str,
        key: &str,
        options: &RequestOptions,
    ) -> Result<Vec<T>> {
        if self.status().await == TargetStatus::Connected && !self.advertises(capability).await {
            debug!("Target '{}' does not advertise {}, skipping '{}'", self.name, capability, method);
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let mut page = self.request(method, params, options).await?;

            let entries = page.get_mut(key).map(Value::take).unwrap_or(Value::Array(Vec::new()));
            let entries: Vec<T> = serde_json::from_value(entries).map_err(|e| {
                GatewayError::protocol(format!("Invalid '{}' listing from target '{}': {}", method, self.name, e))
            })?;
            items.extend(entries);

            match page.get("nextCursor").and_then(Value::as_str) {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next) => {
                    cursor = Some(next.to_string());
                }
                _ => break,
            }
        }

        Ok(items)
    }

    fn listing_options(&self) -> RequestOptions {
        RequestOptions::with_timeout(self.client_config.request_timeout())
    }

    /// Native tool listing, without prefixes or filtering
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.list_all("tools", methods::TOOLS_LIST, "tools", &self.listing_options()).await
    }

    /// Native tool listing under the caller's cancellation; the timeout defaults to the request timeout
    pub async fn list_tools_with(&self, options: &RequestOptions) -> Result<Vec<Tool>> {
        let options = RequestOptions {
            timeout: options.timeout.or(Some(self.client_config.request_timeout())),
            cancellation: options.cancellation.clone(),
        };
        self.list_all("tools", methods::TOOLS_LIST, "tools", &options).await
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptTemplate>> {
        self.list_all("prompts", methods::PROMPTS_LIST, "prompts", &self.listing_options()).await
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        self.list_all("resources", methods::RESOURCES_LIST, "resources", &self.listing_options()).await
    }

    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        self.list_all(
            "resources",
            methods::RESOURCES_TEMPLATES_LIST,
            "resourceTemplates",
            &self.listing_options(),
        )
        .await
    }

    /// Invoke a tool by its original name
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>, options: &RequestOptions) -> Result<Value> {
        let mut params = json!({ "name": name });
        if let Some(arguments) = arguments {
            params["arguments"] = arguments;
        }
        self.request(methods::TOOLS_CALL, Some(params), options).await
    }

    pub async fn get_prompt(&self, name: &str, arguments: Option<Value>, options: &RequestOptions) -> Result<Value> {
        let mut params = json!({ "name": name });
        if let Some(arguments) = arguments {
            params["arguments"] = arguments;
        }
        self.request(methods::PROMPTS_GET, Some(params), options).await
    }

    pub async fn read_resource(&self, uri: &str, options: &RequestOptions) -> Result<Value> {
        self.request(methods::RESOURCES_READ, Some(json!({ "uri": uri })), options).await
    }

    pub async fn subscribe_resource(&self, uri: &str, options: &RequestOptions) -> Result<Value> {
        self.request(methods::RESOURCES_SUBSCRIBE, Some(json!({ "uri": uri })), options).await
    }

    pub async fn unsubscribe_resource(&self, uri: &str, options: &RequestOptions) -> Result<Value> {
        self.request(methods::RESOURCES_UNSUBSCRIBE, Some(json!({ "uri": uri })), options).await
    }

    /// Case-insensitive name match
    pub fn is_named(&self, name: &str) -> bool {
        naming::same_target_name(&self.name, name)
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target").field("name", &self.name).finish_non_exhaustive()
    }
}

fn with_endpoint_context(error: GatewayError, name: &str, transport: &TargetTransport) -> GatewayError {
    let (key, value) = transport.context_entry();
    let context = error.context();
    let mut error = error;
    if !context.contains_key("name") {
        error = error.with_context("name", name);
    }
    if !context.contains_key(key) {
        error = error.with_context(key, value);
    }
    error
}
