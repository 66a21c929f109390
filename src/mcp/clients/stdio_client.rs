//! Child-process transport
//!
//! Spawns the target command and speaks newline-delimited JSON-RPC over its
//! stdin/stdout. Stderr is forwarded to the log.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, Result};
use crate::mcp::clients::pending::{await_response, PendingRequests};
use crate::mcp::errors::McpError;
use crate::mcp::types::{methods, request_key, IncomingMessage, McpRequest, McpResponse};

/// Connection to a spawned MCP server process
pub struct StdioClient {
    name: String,
    command: String,
    child: Mutex<Option<Child>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: Arc<PendingRequests>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Ambient process environment overlaid with the target's variables
pub fn merged_environment(overrides: &HashMap<String, String>) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

impl StdioClient {
    /// Spawn the process and start the reader and writer tasks
    pub async fn spawn(
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        info!("Starting MCP server process for target '{}': {}", name, command);

        let mut cmd = Command::new(command);
        cmd.args(args)
            .env_clear()
            .envs(merged_environment(env))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            GatewayError::connection_refused(format!(
                "Failed to spawn MCP server for target '{}': {}",
                name, e
            ))
            .with_context("name", name)
            .with_context("command", command)
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            GatewayError::connection_refused(format!("Failed to get stdin for target '{}'", name))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            GatewayError::connection_refused(format!("Failed to get stdout for target '{}'", name))
        })?;
        let stderr = child.stderr.take();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let pending = Arc::new(PendingRequests::new());
        let mut tasks = Vec::new();

        let writer_name = name.to_string();
        tasks.push(tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(message) = outbound_rx.recv().await {
                let mut frame = message.into_bytes();
                frame.push(b'\n');
                if let Err(e) = stdin.write_all(&frame).await {
                    error!("Failed to write to target '{}' stdin: {}", writer_name, e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    error!("Failed to flush target '{}' stdin: {}", writer_name, e);
                    break;
                }
            }
        }));

        let reader_name = name.to_string();
        let reader_pending = Arc::clone(&pending);
        let reply_tx = outbound_tx.clone();
        tasks.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        debug!("Target '{}' stdout: {}", reader_name, line);
                        match IncomingMessage::parse(&line) {
                            Ok(IncomingMessage::Response(response)) => {
                                reader_pending.complete(response).await;
                            }
                            Ok(IncomingMessage::Request(request)) => {
                                answer_server_request(&reader_name, request, &reply_tx);
                            }
                            Err(e) => {
                                warn!("Failed to parse message from target '{}': {} (line: {})", reader_name, e, line);
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read from target '{}' stdout: {}", reader_name, e);
                        break;
                    }
                }
            }
            warn!("Target '{}' stdout reader ended", reader_name);
            reader_pending.fail_all().await;
        }));

        if let Some(stderr) = stderr {
            let stderr_name = name.to_string();
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("Target '{}' stderr: {}", stderr_name, line);
                }
            }));
        }

        Ok(Self {
            name: name.to_string(),
            command: command.to_string(),
            child: Mutex::new(Some(child)),
            outbound: Mutex::new(Some(outbound_tx)),
            pending,
            tasks: Mutex::new(tasks),
        })
    }

    async fn write(&self, message: &McpRequest) -> Result<()> {
        let json = serde_json::to_string(message)?;
        let outbound = self.outbound.lock().await;
        let sender = outbound.as_ref().ok_or_else(|| self.not_running())?;
        sender.send(json).map_err(|_| self.not_running())
    }

    fn not_running(&self) -> GatewayError {
        GatewayError::connection_refused(format!("MCP server for target '{}' is not running", self.name))
            .with_context("name", &self.name)
            .with_context("command", &self.command)
    }

    /// Send a request and wait for its response
    pub async fn send(&self, request: McpRequest) -> Result<McpResponse> {
        let id = request
            .id
            .as_ref()
            .ok_or_else(|| GatewayError::protocol("Request without id"))?;
        let key = request_key(id);
        let receiver = self.pending.register(key.clone()).await;

        if let Err(e) = self.write(&request).await {
            self.pending.forget(&key).await;
            return Err(e);
        }

        await_response(receiver, &self.name).await
    }

    /// Send a notification
    pub async fn notify(&self, notification: McpRequest) -> Result<()> {
        self.write(&notification).await
    }

    /// Stop waiting for a request
    pub async fn forget(&self, key: &str) {
        self.pending.forget(key).await;
    }

    /// Kill the process and stop the I/O tasks. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        self.outbound.lock().await.take();

        if let Some(mut process) = self.child.lock().await.take() {
            info!("Stopping MCP server process for target '{}'", self.name);
            if let Err(e) = process.kill().await {
                warn!("Failed to kill MCP server for target '{}': {}", self.name, e);
            }
            match timeout(Duration::from_secs(5), process.wait()).await {
                Ok(Ok(status)) => debug!("Target '{}' process exited with status: {}", self.name, status),
                Ok(Err(e)) => error!("Error waiting for target '{}' process to exit: {}", self.name, e),
                Err(_) => warn!("Target '{}' process did not exit within timeout", self.name),
            }
        }

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.pending.fail_all().await;
        Ok(())
    }
}

/// Answer a request the server sent us. Only `ping` is supported.
fn answer_server_request(name: &str, request: McpRequest, reply: &mpsc::UnboundedSender<String>) {
    let Some(id) = request.id.clone() else {
        debug!("Target '{}' notification: {}", name, request.method);
        return;
    };

    let response = if request.method == methods::PING {
        McpResponse::success(id, json!({}))
    } else {
        debug!("Rejecting server request '{}' from target '{}'", request.method, name);
        McpResponse::failure(id, McpError::method_not_found(request.method))
    };

    match serde_json::to_string(&response) {
        Ok(json) => {
            if reply.send(json).is_err() {
                debug!("Target '{}' writer closed before reply could be sent", name);
            }
        }
        Err(e) => warn!("Failed to serialize reply for target '{}': {}", name, e),
    }
}
