//! Requests awaiting a response from a peer

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::mcp::types::{request_key, McpResponse};

/// Pending requests keyed by JSON-RPC id
#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<HashMap<String, oneshot::Sender<McpResponse>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request id and get the receiver its response will arrive on
    pub async fn register(&self, key: String) -> oneshot::Receiver<McpResponse> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(key, tx);
        rx
    }

    /// Route a response to its waiter. Returns false when nobody was waiting.
    pub async fn complete(&self, response: McpResponse) -> bool {
        let key = request_key(&response.id);
        let sender = self.inner.lock().await.remove(&key);
        match sender {
            Some(sender) => {
                if sender.send(response).is_err() {
                    debug!("Waiter for request {} went away before the response arrived", key);
                }
                true
            }
            None => {
                warn!("Received response for unknown request {}", key);
                false
            }
        }
    }

    /// Drop a request that will no longer be awaited
    pub async fn forget(&self, key: &str) {
        self.inner.lock().await.remove(key);
    }

    /// Drop every waiter; their receivers observe a closed channel
    pub async fn fail_all(&self) {
        let mut pending = self.inner.lock().await;
        if !pending.is_empty() {
            debug!("Failing {} pending requests", pending.len());
        }
        pending.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Wait for the response of a registered request
pub async fn await_response(
    receiver: oneshot::Receiver<McpResponse>,
    target: &str,
) -> Result<McpResponse> {
    receiver.await.map_err(|_| {
        GatewayError::connection_refused(format!("Target '{}' closed the connection", target))
            .with_context("name", target)
    })
}
