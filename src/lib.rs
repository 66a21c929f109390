//! capmux - MCP capability gateway
//!
//! Connects to any number of MCP servers (child processes, HTTP endpoints or
//! in-process handlers) and presents their tools, prompts, resources and resource
//! templates as one virtual server.

pub mod config;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod prompts;
pub mod startup;

pub use config::Config;
pub use error::{ErrorCode, GatewayError, Result};
pub use gateway::{ConnectOptions, GatewayServer, Target, TargetInfo, TargetStatus, TargetUpdate};
pub use mcp::{McpHandler, TargetTransport};
pub use prompts::{Prompt, PromptManager};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "capmux.yaml";
