//! Legacy HTTP+SSE targets against a minimal SSE MCP server

mod common;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use capmux::config::McpClientConfig;
use capmux::gateway::{ConnectOptions, Target, TargetAttributes, TargetStatus};
use capmux::mcp::{TargetTransport, TransportKind};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use common::{call, gateway, names};

type EventSender = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

/// Serves `GET /sse` as an event stream and answers `POST /messages` on it
struct LegacySseServer {
    addr: SocketAddr,
    stream_headers: Arc<Mutex<Vec<String>>>,
    posts: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl LegacySseServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let events: EventSender = Arc::new(Mutex::new(None));
        let stream_headers = Arc::new(Mutex::new(Vec::new()));
        let posts = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let stream_headers = Arc::clone(&stream_headers);
            let posts = Arc::clone(&posts);
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    tokio::spawn(serve_connection(
                        socket,
                        Arc::clone(&events),
                        Arc::clone(&stream_headers),
                        Arc::clone(&posts),
                    ));
                }
            })
        };

        Self {
            addr,
            stream_headers,
            posts,
            task,
        }
    }

    fn url(&self) -> String {
        format!("http://{}/sse", self.addr)
    }
}

impl Drop for LegacySseServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(
    socket: TcpStream,
    events: EventSender,
    stream_headers: Arc<Mutex<Vec<String>>>,
    posts: Arc<Mutex<Vec<String>>>,
) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);

    loop {
        let mut request_line = String::new();
        match reader.read_line(&mut request_line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let mut headers = Vec::new();
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            let line = line.trim_end().to_ascii_lowercase();
            if line.is_empty() {
                break;
            }
            if let Some(length) = line.strip_prefix("content-length:") {
                content_length = length.trim().parse().unwrap_or(0);
            }
            headers.push(line);
        }
        let mut body = vec![0; content_length];
        if reader.read_exact(&mut body).await.is_err() {
            return;
        }

        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();

        if method == "GET" && path == "/sse" {
            *stream_headers.lock().await = headers;
            let (tx, mut rx) = mpsc::unbounded_channel();
            *events.lock().await = Some(tx);

            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\n\
                        Transfer-Encoding: chunked\r\n\r\n";
            if write.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            if write_chunk(&mut write, ": connected\n\nevent: endpoint\ndata: /messages?session=s1\n\n")
                .await
                .is_err()
            {
                return;
            }
            while let Some(frame) = rx.recv().await {
                if write_chunk(&mut write, &frame).await.is_err() {
                    return;
                }
            }
            return;
        }

        if method == "POST" && path.starts_with("/messages") {
            posts.lock().await.push(path.clone());
            if let Ok(message) = serde_json::from_slice::<Value>(&body) {
                if let Some(reply) = answer(&message) {
                    if let Some(tx) = events.lock().await.as_ref() {
                        let _ = tx.send(format!("event: message\ndata: {}\n\n", reply));
                    }
                }
            }
            if write
                .write_all(b"HTTP/1.1 202 Accepted\r\nContent-Length: 0\r\n\r\n")
                .await
                .is_err()
            {
                return;
            }
            continue;
        }

        let _ = write
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await;
    }
}

async fn write_chunk(write: &mut OwnedWriteHalf, data: &str) -> std::io::Result<()> {
    let frame = format!("{:x}\r\n{}\r\n", data.len(), data);
    write.write_all(frame.as_bytes()).await?;
    write.flush().await
}

/// JSON-RPC reply for `message`; notifications get none
fn answer(message: &Value) -> Option<Value> {
    let id = message.get("id").cloned()?;
    let result = match message["method"].as_str().unwrap_or_default() {
        "initialize" => json!({
            "protocolVersion": "2025-06-18",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "legacy-sse", "version": "0.1.0" }
        }),
        "tools/list" => json!({
            "tools": [{ "name": "echo", "inputSchema": { "type": "object" } }]
        }),
        "tools/call" => json!({
            "content": [{ "type": "text", "text": format!("sse:{}", message["params"]["arguments"]["text"].as_str().unwrap_or_default()) }]
        }),
        other => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("Method not found: {}", other) }
            }))
        }
    };
    Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

fn sse_target(name: &str, url: String, headers: HashMap<String, String>) -> Target {
    Target::new(name, TargetTransport::Http { url, headers }, McpClientConfig::default())
}

#[tokio::test]
async fn test_sse_path_selects_legacy_transport() {
    let server = LegacySseServer::start().await;
    let headers = HashMap::from([("X-Api-Key".to_string(), "k-123".to_string())]);
    let target = sse_target("legacy", server.url(), headers).with_attributes(TargetAttributes {
        tool_prefix: Some("old_".to_string()),
        ..TargetAttributes::default()
    });

    let gateway = gateway();
    let added = gateway.add_target(target, ConnectOptions::throwing()).await.unwrap();
    assert_eq!(added.status().await, TargetStatus::Connected);
    assert_eq!(added.transport_kind().await, TransportKind::Sse);
    assert!(server
        .stream_headers
        .lock()
        .await
        .iter()
        .any(|h| h == "x-api-key: k-123"));

    let listing = call(&gateway, "tools/list", json!({})).await.unwrap();
    assert_eq!(names(&listing, "tools", "name"), vec!["old_echo"]);

    let result = call(&gateway, "tools/call", json!({ "name": "old_echo", "arguments": { "text": "héllo" } }))
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "sse:héllo");

    // Every message went to the announced endpoint
    let posts = server.posts.lock().await.clone();
    assert!(posts.len() >= 4, "unexpected posts: {:?}", posts);
    assert!(posts.iter().all(|p| p == "/messages?session=s1"));

    assert!(gateway.close().await.is_clean());
    assert_eq!(added.status().await, TargetStatus::Disconnected);
}

#[tokio::test]
async fn test_sse_stream_without_listener_is_refused() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{}/sse", port);

    let gateway = gateway();
    let added = gateway
        .add_target(sse_target("down", url.clone(), HashMap::new()), ConnectOptions::default())
        .await
        .unwrap();

    assert_eq!(added.status().await, TargetStatus::Error);
    let info = added.info().await;
    assert!(info.last_error.is_some());
}
