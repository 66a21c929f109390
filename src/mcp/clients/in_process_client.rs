//! Paired in-process transport
//!
//! No I/O: messages travel over a channel to a task driving an [`McpHandler`].

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::mcp::clients::pending::await_response;
use crate::mcp::handler::McpHandler;
use crate::mcp::types::{McpRequest, McpResponse};

type Envelope = (McpRequest, Option<oneshot::Sender<McpResponse>>);

/// Client end of an in-process pairing
pub struct InProcessClient {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl InProcessClient {
    /// Start a server task for `handler` and return the client end
    pub fn pair(name: &str, handler: Arc<dyn McpHandler>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Envelope>();

        let server_name = name.to_string();
        let server = tokio::spawn(async move {
            while let Some((request, reply)) = receiver.recv().await {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let response = handler.handle_request(request).await;
                    if let (Some(reply), Some(response)) = (reply, response) {
                        let _ = reply.send(response);
                    }
                });
            }
            debug!("In-process server for '{}' stopped", server_name);
        });

        Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            server: Mutex::new(Some(server)),
        }
    }

    async fn dispatch(&self, envelope: Envelope) -> Result<()> {
        let sender = self.sender.lock().await;
        let sender = sender.as_ref().ok_or_else(|| self.closed())?;
        sender.send(envelope).map_err(|_| self.closed())
    }

    fn closed(&self) -> GatewayError {
        GatewayError::connection_refused(format!("In-process server '{}' is closed", self.name))
            .with_context("name", &self.name)
    }

    pub async fn send(&self, request: McpRequest) -> Result<McpResponse> {
        let (tx, rx) = oneshot::channel();
        self.dispatch((request, Some(tx))).await?;
        await_response(rx, &self.name).await
    }

    pub async fn notify(&self, notification: McpRequest) -> Result<()> {
        self.dispatch((notification, None)).await
    }

    /// Stop the server task. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        self.sender.lock().await.take();
        if let Some(server) = self.server.lock().await.take() {
            if let Err(e) = server.await {
                if !e.is_cancelled() {
                    return Err(GatewayError::Internal(anyhow::anyhow!(
                        "In-process server '{}' panicked: {}",
                        self.name,
                        e
                    )));
                }
            }
        }
        Ok(())
    }
}
