//! Legacy HTTP+SSE transport
//!
//! A long-lived GET opens the event stream. Its first `endpoint` event names the
//! URL messages are POSTed to, and responses arrive later as `message` events.

use std::collections::HashMap;
use std::sync::Arc;

use eventsource_client::{Client as _, ClientBuilder, ReconnectOptions, SSE};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::McpClientConfig;
use crate::error::{GatewayError, Result};
use crate::mcp::clients::http_support::{build_http_client, request_error, status_error};
use crate::mcp::clients::pending::{await_response, PendingRequests};
use crate::mcp::types::{request_key, IncomingMessage, McpRequest, McpResponse};

/// Client for a legacy SSE MCP endpoint
pub struct SseClient {
    name: String,
    url: String,
    http: Client,
    endpoint: RwLock<Option<Url>>,
    pending: Arc<PendingRequests>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SseClient {
    /// Open the event stream and wait for the `endpoint` event
    pub async fn connect(
        name: &str,
        url: &str,
        headers: &HashMap<String, String>,
        client_config: &McpClientConfig,
    ) -> Result<Self> {
        let base = Url::parse(url).map_err(|e| {
            GatewayError::bad_request(format!("Invalid url '{}': {}", url, e)).with_context("url", url)
        })?;
        let http = build_http_client(headers, client_config)?;
        let events = event_stream_client(url, headers)?;

        info!("Opening SSE stream for target '{}': {}", name, url);
        let pending = Arc::new(PendingRequests::new());
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<Result<String>>();

        let reader_name = name.to_string();
        let reader_url = url.to_string();
        let reader_pending = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            let mut stream = events.stream();

            while let Some(event) = stream.next().await {
                let event = match event {
                    Ok(SSE::Event(event)) => event,
                    Ok(SSE::Comment(_)) => continue,
                    Err(e) => {
                        warn!("SSE stream error for target '{}': {}", reader_name, e);
                        if let Some(tx) = endpoint_tx.take() {
                            let _ = tx.send(Err(GatewayError::connection_refused(format!(
                                "Could not open SSE stream {}: {}",
                                reader_url, e
                            ))
                            .with_context("url", &reader_url)));
                        }
                        break;
                    }
                };
                match event.event_type.as_str() {
                    "endpoint" => {
                        if let Some(tx) = endpoint_tx.take() {
                            let _ = tx.send(Ok(event.data));
                        }
                    }
                    "message" => match IncomingMessage::parse(&event.data) {
                        Ok(IncomingMessage::Response(response)) => {
                            reader_pending.complete(response).await;
                        }
                        Ok(IncomingMessage::Request(request)) => {
                            debug!("Ignoring server message '{}' from target '{}'", request.method, reader_name);
                        }
                        Err(e) => warn!("Failed to parse SSE message from target '{}': {}", reader_name, e),
                    },
                    other => debug!("Ignoring SSE event '{}' from target '{}'", other, reader_name),
                }
            }

            warn!("SSE stream for target '{}' ended", reader_name);
            reader_pending.fail_all().await;
        });

        let endpoint = match endpoint_rx.await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(e)) => {
                reader.abort();
                return Err(e);
            }
            Err(_) => {
                reader.abort();
                return Err(GatewayError::connection_refused(format!(
                    "SSE stream for target '{}' closed before announcing an endpoint",
                    name
                ))
                .with_context("url", url));
            }
        };

        let endpoint = base.join(endpoint.trim()).map_err(|e| {
            reader.abort();
            GatewayError::protocol(format!("Target '{}' announced an invalid endpoint '{}': {}", name, endpoint, e))
        })?;
        debug!("Target '{}' message endpoint: {}", name, endpoint);

        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            http,
            endpoint: RwLock::new(Some(endpoint)),
            pending,
            reader: Mutex::new(Some(reader)),
        })
    }

    async fn post(&self, message: &McpRequest) -> Result<()> {
        let endpoint = self.endpoint.read().await.clone().ok_or_else(|| {
            GatewayError::connection_refused(format!("SSE connection to target '{}' is closed", self.name))
                .with_context("url", &self.url)
        })?;

        let response = self
            .http
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(message)
            .send()
            .await
            .map_err(|e| request_error(e, endpoint.as_str()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, endpoint.as_str(), &body));
        }
        Ok(())
    }

    /// Send a request and wait for its response on the event stream
    pub async fn send(&self, request: McpRequest) -> Result<McpResponse> {
        let id = request
            .id
            .as_ref()
            .ok_or_else(|| GatewayError::protocol("Request without id"))?;
        let key = request_key(id);
        let receiver = self.pending.register(key.clone()).await;

        debug!("Sending SSE request to '{}': method={}", self.name, request.method);
        if let Err(e) = self.post(&request).await {
            self.pending.forget(&key).await;
            return Err(e);
        }

        await_response(receiver, &self.name).await
    }

    pub async fn notify(&self, notification: McpRequest) -> Result<()> {
        self.post(&notification).await
    }

    pub async fn forget(&self, key: &str) {
        self.pending.forget(key).await;
    }

    /// Drop the event stream. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        self.endpoint.write().await.take();
        if let Some(reader) = self.reader.lock().await.take() {
            debug!("Closing SSE stream for target '{}'", self.name);
            reader.abort();
        }
        self.pending.fail_all().await;
        Ok(())
    }
}

/// Build the event stream client. A dropped stream ends the session, so reconnects are off.
fn event_stream_client(
    url: &str,
    headers: &HashMap<String, String>,
) -> Result<impl eventsource_client::Client> {
    let mut builder = ClientBuilder::for_url(url).map_err(|e| {
        GatewayError::bad_request(format!("Failed to create SSE client for '{}': {}", url, e)).with_context("url", url)
    })?;
    for (key, value) in headers {
        builder = builder
            .header(key, value)
            .map_err(|e| GatewayError::bad_request(format!("Invalid header '{}': {}", key, e)))?;
    }
    Ok(builder.reconnect(ReconnectOptions::reconnect(false).build()).build())
}
