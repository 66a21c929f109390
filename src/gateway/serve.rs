//! Newline-delimited JSON-RPC front end for the gateway

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::gateway::server::GatewayServer;
use crate::mcp::clients::RequestOptions;
use crate::mcp::errors::McpError;
use crate::mcp::types::{methods, request_key, McpRequest, McpResponse};

type InFlight = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Serve the gateway over stdin/stdout until stdin closes or the gateway shuts down
pub async fn serve_stdio(server: Arc<GatewayServer>) -> Result<()> {
    serve(server, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve the gateway over a byte stream pair.
///
/// Requests are handled concurrently; responses are written as they complete.
/// `notifications/cancelled` aborts the matching in-flight request.
pub async fn serve<R, W>(server: Arc<GatewayServer>, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));
    let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
    let shutdown = server.shutdown_token();
    let mut lines = BufReader::new(reader).lines();
    let mut tasks = JoinSet::new();

    info!("Gateway '{}' ready - waiting for JSON-RPC messages", server.id());

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.cancelled() => {
                info!("Gateway shut down, leaving serve loop");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Input closed, leaving serve loop");
                break;
            }
            Err(e) => {
                error!("Failed to read from input: {}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: McpRequest = match serde_json::from_str(trimmed) {
            Ok(request) => request,
            Err(e) => {
                warn!("Discarding malformed message: {}", e);
                let response = McpResponse::failure(Value::Null, McpError::parse_error(e.to_string()));
                write_response(&writer, &response).await?;
                continue;
            }
        };

        if request.method == methods::CANCELLED {
            cancel_in_flight(&in_flight, &request).await;
            continue;
        }

        let token = CancellationToken::new();
        let key = request.id.as_ref().map(request_key);
        if let Some(key) = &key {
            in_flight.lock().await.insert(key.clone(), token.clone());
        }

        let server = Arc::clone(&server);
        let writer = Arc::clone(&writer);
        let in_flight = Arc::clone(&in_flight);
        tasks.spawn(async move {
            let response = server.dispatch(request, RequestOptions::with_cancellation(token.clone())).await;
            if let Some(key) = key {
                in_flight.lock().await.remove(&key);
            }
            // The client already gave up on a cancelled request
            if token.is_cancelled() {
                return;
            }
            if let Some(response) = response {
                if let Err(e) = write_response(&writer, &response).await {
                    debug!("Failed to write response (client likely disconnected): {}", e);
                }
            }
        });

        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                error!("Request task failed: {}", e);
            }
        }
    }

    for token in in_flight.lock().await.values() {
        token.cancel();
    }
    while let Some(finished) = tasks.join_next().await {
        if let Err(e) = finished {
            error!("Request task failed: {}", e);
        }
    }
    Ok(())
}

async fn cancel_in_flight(in_flight: &InFlight, notification: &McpRequest) {
    let Some(id) = notification.params.as_ref().and_then(|p| p.get("requestId")) else {
        debug!("Ignoring cancellation without a requestId");
        return;
    };
    let key = request_key(id);
    match in_flight.lock().await.get(&key) {
        Some(token) => {
            debug!("Cancelling request {}", key);
            token.cancel();
        }
        None => debug!("No in-flight request {} to cancel", key),
    }
}

async fn write_response<W>(writer: &Arc<Mutex<W>>, response: &McpResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    let mut writer = writer.lock().await;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
