//! The newline-delimited JSON-RPC front end

mod common;

use std::time::Duration;

use capmux::gateway::serve;
use serde_json::{json, Value};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, DuplexStream};

use common::{gateway_with, FixtureServer};

async fn send(writer: &mut (impl AsyncWriteExt + Unpin), message: Value) {
    let mut line = message.to_string();
    line.push('\n');
    writer.write_all(line.as_bytes()).await.unwrap();
}

async fn next_message(lines: &mut Lines<BufReader<ReadHalf<DuplexStream>>>) -> Value {
    let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("response within deadline")
        .unwrap()
        .expect("stream still open");
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn test_session_over_byte_stream() {
    let gateway = gateway_with(vec![FixtureServer::new("one").tools(&["a"])]).await;
    let (client, gateway_side) = duplex(64 * 1024);
    let (gateway_read, gateway_write) = tokio::io::split(gateway_side);
    let serving = tokio::spawn(serve(gateway.clone(), gateway_read, gateway_write));

    let (client_read, mut client_write) = tokio::io::split(client);
    let mut lines = BufReader::new(client_read).lines();

    send(
        &mut client_write,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": { "protocolVersion": "2025-06-18" } }),
    )
    .await;
    let response = next_message(&mut lines).await;
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["serverInfo"]["name"], "test-gateway");

    send(&mut client_write, json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })).await;
    send(&mut client_write, json!({ "jsonrpc": "2.0", "id": "list", "method": "tools/list" })).await;
    let response = next_message(&mut lines).await;
    assert_eq!(response["id"], "list");
    assert_eq!(response["result"]["tools"][0]["name"], "a");

    send(&mut client_write, json!({ "jsonrpc": "2.0", "id": 3, "method": "bogus/method" })).await;
    let response = next_message(&mut lines).await;
    assert_eq!(response["error"]["code"], -32601);

    drop(client_write);
    drop(lines);
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancelled_request_gets_no_response() {
    let gateway = gateway_with(vec![FixtureServer::new("slow").slow_tool("wait")]).await;
    let (client, gateway_side) = duplex(64 * 1024);
    let (gateway_read, gateway_write) = tokio::io::split(gateway_side);
    let serving = tokio::spawn(serve(gateway.clone(), gateway_read, gateway_write));

    let (client_read, mut client_write) = tokio::io::split(client);
    let mut lines = BufReader::new(client_read).lines();

    send(
        &mut client_write,
        json!({ "jsonrpc": "2.0", "id": 10, "method": "tools/call", "params": { "name": "wait" } }),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    send(
        &mut client_write,
        json!({ "jsonrpc": "2.0", "method": "notifications/cancelled", "params": { "requestId": 10 } }),
    )
    .await;
    send(&mut client_write, json!({ "jsonrpc": "2.0", "id": 11, "method": "ping" })).await;

    let response = next_message(&mut lines).await;
    assert_eq!(response["id"], 11);

    drop(client_write);
    drop(lines);
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_gateway_close_ends_the_serve_loop() {
    let gateway = gateway_with(vec![FixtureServer::new("one").tools(&["a"])]).await;
    let (_client, gateway_side) = duplex(1024);
    let (gateway_read, gateway_write) = tokio::io::split(gateway_side);
    let serving = tokio::spawn(serve(gateway.clone(), gateway_read, gateway_write));

    gateway.close().await;
    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("serve loop exits after close")
        .unwrap()
        .unwrap();
}
