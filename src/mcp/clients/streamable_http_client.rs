//! Streamable HTTP transport
//!
//! Every message is POSTed to the target URL. Replies come back either as a JSON
//! body or as a short `text/event-stream`. The session id handed out on
//! `initialize` is echoed on later requests and the session is deleted on close.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::McpClientConfig;
use crate::error::{GatewayError, Result};
use crate::mcp::clients::http_support::{build_http_client, request_error, status_error};
use crate::mcp::clients::sse_parser::SseDecoder;
use crate::mcp::types::{methods, IncomingMessage, McpRequest, McpResponse};

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Client for a streamable HTTP MCP endpoint
pub struct StreamableHttpClient {
    name: String,
    url: String,
    http: Client,
    protocol_version: String,
    session_id: RwLock<Option<String>>,
    initialized: RwLock<bool>,
}

impl StreamableHttpClient {
    pub fn new(
        name: &str,
        url: &str,
        headers: &std::collections::HashMap<String, String>,
        client_config: &McpClientConfig,
    ) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            http: build_http_client(headers, client_config)?,
            protocol_version: client_config.protocol_version.clone(),
            session_id: RwLock::new(None),
            initialized: RwLock::new(false),
        })
    }

    async fn post(&self, message: &McpRequest) -> Result<Response> {
        let mut builder = self
            .http
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .json(message);

        if let Some(session_id) = self.session_id.read().await.as_ref() {
            builder = builder.header(SESSION_HEADER, session_id);
        }
        if *self.initialized.read().await {
            builder = builder.header(PROTOCOL_VERSION_HEADER, &self.protocol_version);
        }

        let response = builder.send().await.map_err(|e| request_error(e, &self.url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &self.url, &body));
        }
        Ok(response)
    }

    /// Send a request and wait for its response
    pub async fn send(&self, request: McpRequest) -> Result<McpResponse> {
        debug!("Sending streamable HTTP request to '{}': method={}", self.name, request.method);
        let response = self.post(&request).await?;

        if request.method == methods::INITIALIZE {
            if let Some(session_id) = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
            {
                info!("Target '{}' opened session {}", self.name, session_id);
                *self.session_id.write().await = Some(session_id.to_string());
            }
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/event-stream"))
            .unwrap_or(false);

        if is_event_stream {
            self.read_event_stream(response, &request).await
        } else {
            let body = response.text().await.map_err(|e| request_error(e, &self.url))?;
            match IncomingMessage::parse(&body)? {
                IncomingMessage::Response(response) => Ok(response),
                IncomingMessage::Request(other) => Err(GatewayError::protocol(format!(
                    "Target '{}' answered with a '{}' message instead of a response",
                    self.name, other.method
                ))),
            }
        }
    }

    /// Read an event-stream reply until the response to `request` shows up
    async fn read_event_stream(&self, response: Response, request: &McpRequest) -> Result<McpResponse> {
        use futures_util::StreamExt;

        let expected = request.id.clone().unwrap_or_default();
        let mut decoder = SseDecoder::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| request_error(e, &self.url))?;
            for event in decoder.push(&chunk) {
                if let Some(response) = self.match_event(&event.data, &expected) {
                    return Ok(response);
                }
            }
        }
        if let Some(event) = decoder.finish() {
            if let Some(response) = self.match_event(&event.data, &expected) {
                return Ok(response);
            }
        }

        Err(GatewayError::protocol(format!(
            "Event stream from target '{}' ended without a response to '{}'",
            self.name, request.method
        )))
    }

    fn match_event(&self, data: &str, expected: &serde_json::Value) -> Option<McpResponse> {
        if data.trim().is_empty() {
            return None;
        }
        match IncomingMessage::parse(data) {
            Ok(IncomingMessage::Response(response)) if &response.id == expected => Some(response),
            Ok(IncomingMessage::Response(response)) => {
                debug!("Ignoring response {} from target '{}'", response.id, self.name);
                None
            }
            Ok(IncomingMessage::Request(request)) => {
                debug!("Ignoring server message '{}' from target '{}'", request.method, self.name);
                None
            }
            Err(e) => {
                warn!("Failed to parse event from target '{}': {}", self.name, e);
                None
            }
        }
    }

    /// Send a notification; the target answers 202 with no body
    pub async fn notify(&self, notification: McpRequest) -> Result<()> {
        self.post(&notification).await?;
        if notification.method == methods::INITIALIZED {
            *self.initialized.write().await = true;
        }
        Ok(())
    }

    /// Terminate the session, if the target handed one out
    pub async fn close(&self) -> Result<()> {
        *self.initialized.write().await = false;
        let Some(session_id) = self.session_id.write().await.take() else {
            return Ok(());
        };

        debug!("Deleting session {} on target '{}'", session_id, self.name);
        match self
            .http
            .delete(&self.url)
            .header(SESSION_HEADER, &session_id)
            .send()
            .await
        {
            Ok(response)
                if response.status().is_success()
                    || response.status() == StatusCode::METHOD_NOT_ALLOWED => {}
            Ok(response) => {
                warn!("Target '{}' refused session termination: HTTP {}", self.name, response.status());
            }
            Err(e) => warn!("Failed to terminate session on target '{}': {}", self.name, e),
        }
        Ok(())
    }
}
