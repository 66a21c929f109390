//! Startup logging: configuration summary and per-target connection report

use std::path::Path;

use tracing::{info, warn};

use crate::config::{CapabilitySet, Config};
use crate::gateway::{TargetInfo, TargetStatus};

/// Startup logger for the gateway
pub struct StartupLogger;

impl StartupLogger {
    /// Display the configuration in effect and how every target came up
    pub fn display_startup_info(config: &Config, config_path: Option<&Path>, targets: &[TargetInfo], version: &str) {
        info!("🚀 capmux v{} starting...", version);
        info!("");

        Self::display_configuration(config, config_path);
        Self::display_capabilities(config.gateway.capabilities);
        Self::display_targets(targets);

        let connected = targets.iter().filter(|t| t.status == TargetStatus::Connected).count();
        info!("");
        if connected == targets.len() {
            info!("✅ Gateway '{}' ready with {} target(s)", config.gateway.id, targets.len());
        } else {
            warn!(
                "⚠️  Gateway '{}' ready with {}/{} target(s) connected",
                config.gateway.id,
                connected,
                targets.len()
            );
        }
    }

    fn display_configuration(config: &Config, config_path: Option<&Path>) {
        info!("📁 Configuration:");
        match config_path {
            Some(path) => info!("   Config file: {:?} ✅", path),
            None => info!("   Config file: built-in defaults"),
        }
        info!("   Gateway id: {}", config.gateway.id);
        info!(
            "   Timeouts: connect {}s, request {}s",
            config.client.connect_timeout_secs, config.client.request_timeout_secs
        );
        info!("");
    }

    fn display_capabilities(capabilities: CapabilitySet) {
        info!("🎯 Capabilities:");
        let flags = [
            ("tools", capabilities.tools),
            ("prompts", capabilities.prompts),
            ("resources", capabilities.resources),
            ("resource templates", capabilities.resources && capabilities.resource_templates),
            ("resource subscriptions", capabilities.resources && capabilities.resource_subscriptions),
        ];
        for (name, enabled) in flags {
            info!("   {} {}", if enabled { "✅" } else { "❌" }, name);
        }
        info!("");
    }

    fn display_targets(targets: &[TargetInfo]) {
        info!("🌐 Targets:");
        if targets.is_empty() {
            warn!("   ⚠️  No targets registered");
            return;
        }

        for target in targets {
            let prefix = target
                .attributes
                .tool_prefix
                .as_deref()
                .map(|p| format!(" prefix '{}'", p))
                .unwrap_or_default();
            let disabled = if target.attributes.disabled { " (disabled)" } else { "" };
            match target.status {
                TargetStatus::Connected => info!(
                    "   ✅ {} [{}] {}{}{}",
                    target.name, target.transport, target.endpoint, prefix, disabled
                ),
                TargetStatus::Disconnected => warn!(
                    "   ⚠️  {} [{}] {} disconnected{}",
                    target.name,
                    target.transport,
                    target.endpoint,
                    target.last_error.as_deref().map(|e| format!(": {}", e)).unwrap_or_default()
                ),
                TargetStatus::Error => warn!(
                    "   ❌ {} [{}] {}: {}",
                    target.name,
                    target.transport,
                    target.endpoint,
                    target.last_error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
    }
}

/// Display startup banner with version information
pub fn display_startup_banner(version: &str) {
    info!("");
    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║                         capmux v{}                          ║", version);
    info!("║              MCP capability gateway & multiplexer            ║");
    info!("╚══════════════════════════════════════════════════════════════╝");
    info!("");
}
