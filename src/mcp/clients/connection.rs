//! A live session with one target, whatever the wire protocol

use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::McpClientConfig;
use crate::error::{GatewayError, Result};
use crate::mcp::clients::{InProcessClient, SseClient, StdioClient, StreamableHttpClient};
use crate::mcp::transport::{TargetTransport, TransportKind};
use crate::mcp::types::{methods, request_key, InitializeResult, McpRequest, McpResponse};

/// Deadline and cancellation signal supplied by the caller of an outbound request
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancellation: None,
        }
    }

    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            timeout: None,
            cancellation: Some(cancellation),
        }
    }
}

/// Open connection to a target
pub enum Connection {
    Stdio(StdioClient),
    StreamableHttp(StreamableHttpClient),
    Sse(SseClient),
    InProcess(InProcessClient),
}

impl Connection {
    /// Establish the transport and run the `initialize` handshake
    pub async fn open(
        name: &str,
        transport: &TargetTransport,
        client_config: &McpClientConfig,
    ) -> Result<(Self, InitializeResult)> {
        let connection = match transport {
            TargetTransport::Stdio { command, args, env } => {
                Connection::Stdio(StdioClient::spawn(name, command, args, env).await?)
            }
            TargetTransport::Http { url, headers } => match transport.kind() {
                TransportKind::Sse => {
                    Connection::Sse(SseClient::connect(name, url, headers, client_config).await?)
                }
                _ => Connection::StreamableHttp(StreamableHttpClient::new(
                    name,
                    url,
                    headers,
                    client_config,
                )?),
            },
            TargetTransport::InProcess { handler } => {
                Connection::InProcess(InProcessClient::pair(name, handler.clone()))
            }
        };

        match connection.initialize(client_config).await {
            Ok(info) => {
                info!(
                    target_name = name,
                    server = %info.server_info.name,
                    protocol = %info.protocol_version,
                    "Initialized MCP session"
                );
                Ok((connection, info))
            }
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    debug!("Failed to close half-open connection to '{}': {}", name, close_err);
                }
                Err(e)
            }
        }
    }

    async fn initialize(&self, client_config: &McpClientConfig) -> Result<InitializeResult> {
        let params = json!({
            "protocolVersion": client_config.protocol_version,
            "capabilities": {},
            "clientInfo": {
                "name": client_config.client_name,
                "version": client_config.client_version
            }
        });

        let result = self
            .request(
                methods::INITIALIZE,
                Some(params),
                &RequestOptions::with_timeout(client_config.request_timeout()),
            )
            .await?;
        let info: InitializeResult = serde_json::from_value(result).map_err(|e| {
            GatewayError::protocol(format!("Invalid initialize result: {}", e))
        })?;

        self.notify(methods::INITIALIZED, None).await?;
        Ok(info)
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Connection::Stdio(_) => TransportKind::Stdio,
            Connection::StreamableHttp(_) => TransportKind::StreamableHttp,
            Connection::Sse(_) => TransportKind::Sse,
            Connection::InProcess(_) => TransportKind::InProcess,
        }
    }

    async fn send(&self, request: McpRequest) -> Result<McpResponse> {
        match self {
            Connection::Stdio(client) => client.send(request).await,
            Connection::StreamableHttp(client) => client.send(request).await,
            Connection::Sse(client) => client.send(request).await,
            Connection::InProcess(client) => client.send(request).await,
        }
    }

    async fn forget(&self, key: &str) {
        match self {
            Connection::Stdio(client) => client.forget(key).await,
            Connection::Sse(client) => client.forget(key).await,
            Connection::StreamableHttp(_) | Connection::InProcess(_) => {}
        }
    }

    /// Send a notification
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = McpRequest::notification(method, params);
        match self {
            Connection::Stdio(client) => client.notify(notification).await,
            Connection::StreamableHttp(client) => client.notify(notification).await,
            Connection::Sse(client) => client.notify(notification).await,
            Connection::InProcess(client) => client.notify(notification).await,
        }
    }

    /// Send a request, honouring the caller's deadline and cancellation signal.
    /// A cancelled request is announced to the target with `notifications/cancelled`.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: &RequestOptions,
    ) -> Result<Value> {
        let id = Value::String(Uuid::new_v4().to_string());
        let key = request_key(&id);
        let request = McpRequest::new(id.clone(), method, params);

        let exchange = async {
            match options.timeout {
                Some(limit) => tokio::time::timeout(limit, self.send(request))
                    .await
                    .map_err(|_| {
                        GatewayError::timeout(format!("'{}' did not complete within {:?}", method, limit))
                    })?,
                None => self.send(request).await,
            }
        };

        let outcome = match &options.cancellation {
            Some(token) => tokio::select! {
                outcome = exchange => outcome,
                _ = token.cancelled() => Err(GatewayError::cancelled(format!("'{}' was cancelled", method))),
            },
            None => exchange.await,
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                self.forget(&key).await;
                if matches!(e, GatewayError::Cancelled { .. } | GatewayError::Timeout { .. }) {
                    let reason = e.to_string();
                    let params = json!({ "requestId": id, "reason": reason });
                    if let Err(notify_err) = self.notify(methods::CANCELLED, Some(params)).await {
                        debug!("Failed to announce cancellation: {}", notify_err);
                    }
                }
                return Err(e);
            }
        };

        response.into_result()
    }

    /// Tear the transport down. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        match self {
            Connection::Stdio(client) => client.close().await,
            Connection::StreamableHttp(client) => client.close().await,
            Connection::Sse(client) => client.close().await,
            Connection::InProcess(client) => client.close().await,
        }
    }
}
