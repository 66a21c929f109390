use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::gateway::naming;
use crate::mcp::types::DEFAULT_PROTOCOL_VERSION;
use crate::prompts::Prompt;

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

fn default_client_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Identity and advertised capabilities of the gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Settings applied to every outbound target connection
    #[serde(default)]
    pub client: McpClientConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Backend targets, in merge order
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    /// Initial table of the built-in prompt provider
    #[serde(default)]
    pub prompts: Vec<Prompt>,
}

/// Gateway identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Registry id, also reported as the server name on `initialize`
    pub id: String,
    /// Optional instructions returned on `initialize`
    #[serde(default)]
    pub instructions: Option<String>,
    /// Capability kinds the gateway advertises
    #[serde(default)]
    pub capabilities: CapabilitySet,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            id: env!("CARGO_PKG_NAME").to_string(),
            instructions: None,
            capabilities: CapabilitySet::default(),
        }
    }
}

/// Which capability kinds a gateway advertises and serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    #[serde(default = "default_true")]
    pub tools: bool,
    #[serde(default = "default_true")]
    pub prompts: bool,
    #[serde(default = "default_true")]
    pub resources: bool,
    #[serde(default = "default_true")]
    pub resource_templates: bool,
    #[serde(default)]
    pub resource_subscriptions: bool,
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self {
            tools: true,
            prompts: true,
            resources: true,
            resource_templates: true,
            resource_subscriptions: false,
        }
    }
}

/// MCP Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpClientConfig {
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Timeout for listing requests in seconds
    pub request_timeout_secs: u64,
    /// MCP protocol version to use
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Client name for MCP handshake
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Client version for MCP handshake
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

impl McpClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            request_timeout_secs: 60,
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            client_version: default_client_version(),
        }
    }
}

/// Logging output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// One backend target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Unique (case-insensitive) target name
    pub name: String,
    /// How to reach the target
    pub transport: TransportConfig,
    /// Prefix prepended to every tool name this target exposes
    #[serde(default)]
    pub tool_prefix: Option<String>,
    /// Original tool names hidden from listings and calls
    #[serde(default)]
    pub disabled_tools: Vec<String>,
    /// Exclude the target from aggregation without disconnecting it
    #[serde(default)]
    pub disabled: bool,
}

/// Transport descriptor of a configured target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Spawned child process speaking newline-delimited JSON-RPC
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Streamable HTTP, or the legacy event-stream transport for `/sse` paths
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl Config {
    /// Load .env files in order of precedence
    fn load_env_files() {
        let env = std::env::var("CAPMUX_ENV")
            .or_else(|_| std::env::var("ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let env_specific_file = format!(".env.{}", env);
        let env_files = [".env", env_specific_file.as_str(), ".env.local"];

        for env_file in env_files {
            match dotenvy::from_filename(env_file) {
                Ok(_) => tracing::info!("Loaded environment variables from {}", env_file),
                Err(e) if e.not_found() => tracing::debug!("No {} file found, skipping", env_file),
                Err(e) => tracing::warn!("Failed to load {}: {}", env_file, e),
            }
        }

        tracing::debug!("Environment: {}", env);
    }

    /// Load configuration from file, then apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_env_files();

        let mut config = if path.as_ref().exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                GatewayError::config(format!("Failed to read config file: {}", e))
            })?;
            Self::from_yaml(&content)?
        } else {
            tracing::warn!(
                "Config file {} not found, using defaults",
                path.as_ref().display()
            );
            Self::default()
        };

        config.apply_environment_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML without validating it
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        if let Some(id) = non_empty_env("CAPMUX_GATEWAY_ID") {
            self.gateway.id = id;
        }

        if let Some(level) = non_empty_env("CAPMUX_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = non_empty_env("CAPMUX_LOG_FORMAT") {
            self.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(GatewayError::config(format!(
                        "Invalid CAPMUX_LOG_FORMAT environment variable: {}",
                        other
                    )))
                }
            };
        }

        if let Some(secs) = non_empty_env("CAPMUX_CONNECT_TIMEOUT_SECS") {
            self.client.connect_timeout_secs = secs.parse().map_err(|e| {
                GatewayError::config(format!(
                    "Invalid CAPMUX_CONNECT_TIMEOUT_SECS environment variable: {}",
                    e
                ))
            })?;
        }

        if let Some(secs) = non_empty_env("CAPMUX_REQUEST_TIMEOUT_SECS") {
            self.client.request_timeout_secs = secs.parse().map_err(|e| {
                GatewayError::config(format!(
                    "Invalid CAPMUX_REQUEST_TIMEOUT_SECS environment variable: {}",
                    e
                ))
            })?;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.gateway.id.trim().is_empty() {
            return Err(GatewayError::config("gateway.id must not be empty"));
        }
        if self.client.connect_timeout_secs == 0 {
            return Err(GatewayError::config("client.connect_timeout_secs must be greater than 0"));
        }
        if self.client.request_timeout_secs == 0 {
            return Err(GatewayError::config("client.request_timeout_secs must be greater than 0"));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            target.validate()?;
            if !names.insert(target.name.to_lowercase()) {
                return Err(GatewayError::config(format!(
                    "Duplicate target name '{}'",
                    target.name
                )));
            }
        }

        for (i, a) in self.targets.iter().enumerate() {
            for b in &self.targets[i + 1..] {
                if let (Some(pa), Some(pb)) = (a.tool_prefix.as_deref(), b.tool_prefix.as_deref()) {
                    if naming::prefixes_overlap(pa, pb) {
                        return Err(GatewayError::config(format!(
                            "Tool prefix '{}' of target '{}' overlaps prefix '{}' of target '{}'",
                            pa, a.name, pb, b.name
                        )));
                    }
                }
            }
        }

        let mut prompt_names = HashSet::new();
        for prompt in &self.prompts {
            let prompt = prompt.normalized()?;
            if !prompt_names.insert(prompt.name.clone()) {
                return Err(GatewayError::config(format!(
                    "Duplicate prompt name '{}'",
                    prompt.name
                )));
            }
        }

        Ok(())
    }
}

impl TargetConfig {
    /// Validate a single target entry
    pub fn validate(&self) -> Result<()> {
        naming::validate_target_name(&self.name)
            .map_err(|e| GatewayError::config(e.to_string()))?;

        match &self.transport {
            TransportConfig::Stdio { command, .. } => {
                if command.trim().is_empty() {
                    return Err(GatewayError::config(format!(
                        "Target '{}' has an empty command",
                        self.name
                    )));
                }
            }
            TransportConfig::Http { url, .. } => {
                let parsed = url::Url::parse(url).map_err(|e| {
                    GatewayError::config(format!("Target '{}' has an invalid url '{}': {}", self.name, url, e))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(GatewayError::config(format!(
                        "Target '{}' url must use http or https, got '{}'",
                        self.name,
                        parsed.scheme()
                    )));
                }
            }
        }

        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
