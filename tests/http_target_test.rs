//! Streamable HTTP targets against a mock MCP endpoint

mod common;

use std::collections::HashMap;

use capmux::config::McpClientConfig;
use capmux::error::ErrorCode;
use capmux::gateway::{ConnectOptions, Target, TargetAttributes, TargetStatus};
use capmux::mcp::{RequestOptions, TargetTransport, TransportKind};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use common::{call, gateway, names};

const SESSION_ID: &str = "session-1";

/// Answers JSON-RPC requests with the id they carried; notifications get 202
struct EchoServer;

impl Respond for EchoServer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        let Some(id) = body.get("id").cloned() else {
            return ResponseTemplate::new(202);
        };

        let result = match body["method"].as_str().unwrap_or_default() {
            "initialize" => json!({
                "protocolVersion": "2025-06-18",
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "echo-server", "version": "1.0.0" }
            }),
            "tools/list" => json!({
                "tools": [{ "name": "echo", "inputSchema": { "type": "object" }, "annotations": { "readOnlyHint": true } }]
            }),
            "tools/call" => {
                // Tool results arrive as an event stream to exercise both reply shapes
                let message = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": { "content": [{ "type": "text", "text": body["params"]["arguments"]["text"] }] }
                });
                let stream = format!(
                    "event: message\ndata: {{\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}}\n\n\
                     event: message\ndata: {{\"jsonrpc\":\"2.0\",\"id\":\"stale\",\"result\":{{}}}}\n\n\
                     event: message\ndata: {}\n\n",
                    message
                );
                return ResponseTemplate::new(200).set_body_raw(stream, "text/event-stream");
            }
            other => {
                return ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("Method not found: {}", other) }
                }))
            }
        };

        let template = ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": id, "result": result }));
        if body["method"] == "initialize" {
            template.insert_header("mcp-session-id", SESSION_ID)
        } else {
            template
        }
    }
}

fn http_target(name: &str, url: String, headers: HashMap<String, String>) -> Target {
    Target::new(name, TargetTransport::Http { url, headers }, McpClientConfig::default())
}

#[tokio::test]
async fn test_prefixed_http_tool_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(EchoServer)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", SESSION_ID))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let headers = HashMap::from([("Authorization".to_string(), "Bearer secret".to_string())]);
    let target = http_target("remote", format!("{}/mcp", server.uri()), headers).with_attributes(TargetAttributes {
        tool_prefix: Some("b_".to_string()),
        ..TargetAttributes::default()
    });

    let gateway = gateway();
    gateway.add_target(target, ConnectOptions::throwing()).await.unwrap();

    let listing = call(&gateway, "tools/list", json!({})).await.unwrap();
    assert_eq!(names(&listing, "tools", "name"), vec!["b_echo"]);
    assert_eq!(listing["tools"][0]["annotations"]["readOnlyHint"], true);

    let result = call(&gateway, "tools/call", json!({ "name": "b_echo", "arguments": { "text": "hi" } }))
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "hi");

    let err = call(&gateway, "tools/call", json!({ "name": "echo" })).await.unwrap_err();
    assert_eq!(err["data"]["code"], "NOT_FOUND");

    assert!(gateway.close().await.is_clean());
}

#[tokio::test]
async fn test_unauthorized_target_stays_registered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let gateway = gateway();
    let target = http_target("locked", format!("{}/mcp", server.uri()), HashMap::new());
    let added = gateway.add_target(target, ConnectOptions::throwing()).await.unwrap();

    assert_eq!(added.status().await, TargetStatus::Disconnected);
    assert!(added.info().await.last_error.is_some());
    assert_eq!(gateway.targets().await.len(), 1);
}

#[tokio::test]
async fn test_no_listener_is_connection_refused() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{}/mcp", port);

    let gateway = gateway();
    let err = gateway
        .add_target(http_target("down", url.clone(), HashMap::new()), ConnectOptions::throwing())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ConnectionRefused);
    assert_eq!(err.context()["url"], url);
    assert!(gateway.targets().await.is_empty());
}

#[tokio::test]
async fn test_event_stream_reply_is_matched_by_id_and_passed_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(EchoServer)
        .mount(&server)
        .await;

    let target = http_target("remote", format!("{}/mcp", server.uri()), HashMap::new());
    target.connect(ConnectOptions::throwing()).await.unwrap();
    assert_eq!(target.transport_kind().await, TransportKind::StreamableHttp);

    let text = "naïve café ☕";
    let result = target
        .call_tool("echo", Some(json!({ "text": text })), &RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], text);
    assert_eq!(result["content"].as_array().map(Vec::len), Some(1));

    target.close().await.unwrap();
}
