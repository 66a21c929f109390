//! Transport descriptors

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::TransportConfig;
use crate::error::{GatewayError, Result};
use crate::mcp::handler::McpHandler;

/// How a target is reached
#[derive(Clone)]
pub enum TargetTransport {
    /// Child process speaking newline-delimited JSON-RPC on stdin/stdout
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    /// Remote HTTP endpoint
    Http {
        url: String,
        headers: HashMap<String, String>,
    },
    /// Handler living in this process
    InProcess { handler: Arc<dyn McpHandler> },
}

/// Concrete wire protocol used by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Stdio,
    StreamableHttp,
    Sse,
    InProcess,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Stdio => "stdio",
            TransportKind::StreamableHttp => "streamable-http",
            TransportKind::Sse => "sse",
            TransportKind::InProcess => "in-process",
        };
        f.write_str(name)
    }
}

/// Pick the HTTP sub-protocol from the URL path: `/sse` selects the event-stream transport
pub fn http_kind(url: &Url) -> TransportKind {
    if url.path().trim_end_matches('/').ends_with("/sse") {
        TransportKind::Sse
    } else {
        TransportKind::StreamableHttp
    }
}

impl TargetTransport {
    /// Build a transport from configuration, expanding `${VAR}` references
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        Ok(match config {
            TransportConfig::Stdio { command, args, env } => TargetTransport::Stdio {
                command: command.clone(),
                args: args.clone(),
                env: expand_values(env)?,
            },
            TransportConfig::Http { url, headers } => TargetTransport::Http {
                url: url.clone(),
                headers: expand_values(headers)?,
            },
        })
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            TargetTransport::Stdio { .. } => TransportKind::Stdio,
            TargetTransport::Http { url, .. } => match Url::parse(url) {
                Ok(parsed) => http_kind(&parsed),
                Err(_) => TransportKind::StreamableHttp,
            },
            TargetTransport::InProcess { .. } => TransportKind::InProcess,
        }
    }

    /// Human-readable endpoint, used in logs and error context
    pub fn endpoint(&self) -> String {
        match self {
            TargetTransport::Stdio { command, args, .. } if args.is_empty() => command.clone(),
            TargetTransport::Stdio { command, args, .. } => format!("{} {}", command, args.join(" ")),
            TargetTransport::Http { url, .. } => url.clone(),
            TargetTransport::InProcess { .. } => "in-process".to_string(),
        }
    }

    /// Key and value of the error context identifying this endpoint
    pub fn context_entry(&self) -> (&'static str, String) {
        match self {
            TargetTransport::Stdio { command, .. } => ("command", command.clone()),
            TargetTransport::Http { url, .. } => ("url", url.clone()),
            TargetTransport::InProcess { .. } => ("transport", "in-process".to_string()),
        }
    }
}

impl fmt::Debug for TargetTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetTransport::Stdio { command, args, env } => f
                .debug_struct("Stdio")
                .field("command", command)
                .field("args", args)
                .field("env_keys", &env.keys().collect::<Vec<_>>())
                .finish(),
            TargetTransport::Http { url, headers } => f
                .debug_struct("Http")
                .field("url", url)
                .field("header_names", &headers.keys().collect::<Vec<_>>())
                .finish(),
            TargetTransport::InProcess { .. } => f.write_str("InProcess"),
        }
    }
}

fn expand_values(values: &HashMap<String, String>) -> Result<HashMap<String, String>> {
    values
        .iter()
        .map(|(key, value)| {
            let expanded = shellexpand::env(value).map_err(|e| {
                GatewayError::config(format!("Failed to expand '{}': {}", key, e))
            })?;
            Ok((key.clone(), expanded.into_owned()))
        })
        .collect()
}
