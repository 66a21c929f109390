//! Configuration module for the gateway
//!
//! YAML file, `.env` files and `CAPMUX_*` environment overrides.

mod config;

pub use config::{
    CapabilitySet, Config, GatewayConfig, LogFormat, LoggingConfig, McpClientConfig, TargetConfig,
    TransportConfig,
};
