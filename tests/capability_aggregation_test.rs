//! Merged listings and routing across several targets

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use capmux::config::{CapabilitySet, McpClientConfig};
use capmux::gateway::{ConnectOptions, GatewayServer, Target, TargetAttributes, TargetStatus};
use capmux::mcp::TargetTransport;
use capmux::mcp::{McpHandler, McpRequest};
use serde_json::json;

use common::{call, gateway, gateway_with, names, target, FixtureServer};

#[tokio::test]
async fn test_tool_prefix_applies_to_listing_and_call() {
    let gateway = gateway();
    let github = target(FixtureServer::new("github").tools(&["search", "open_pr"])).with_attributes(
        TargetAttributes {
            tool_prefix: Some("gh_".to_string()),
            disabled_tools: ["open_pr".to_string()].into_iter().collect(),
            disabled: false,
        },
    );
    gateway.add_target(github, ConnectOptions::throwing()).await.unwrap();
    gateway
        .add_target(target(FixtureServer::new("local").tools(&["search"])), ConnectOptions::throwing())
        .await
        .unwrap();

    let listing = call(&gateway, "tools/list", json!({})).await.unwrap();
    assert_eq!(names(&listing, "tools", "name"), vec!["gh_search", "search"]);
    assert_eq!(listing["tools"][0]["description"], "search from github");

    let result = call(&gateway, "tools/call", json!({ "name": "gh_search", "arguments": { "q": "rust" } }))
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "github:search");
    assert_eq!(result["arguments"], json!({ "q": "rust" }));

    let result = call(&gateway, "tools/call", json!({ "name": "search" })).await.unwrap();
    assert_eq!(result["content"][0]["text"], "local:search");

    let err = call(&gateway, "tools/call", json!({ "name": "gh_open_pr" })).await.unwrap_err();
    assert_eq!(err["data"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    // A sole candidate answers for itself
    let gateway = gateway_with(vec![FixtureServer::new("one").tools(&["a"])]).await;
    let err = call(&gateway, "tools/call", json!({ "name": "nope" })).await.unwrap_err();
    assert_eq!(err["code"], -32001);

    let gateway = gateway_with(vec![
        FixtureServer::new("one").tools(&["a"]),
        FixtureServer::new("two").tools(&["b"]),
    ])
    .await;
    let err = call(&gateway, "tools/call", json!({ "name": "nope" })).await.unwrap_err();
    assert_eq!(err["code"], -32001);
    assert_eq!(err["data"]["code"], "NOT_FOUND");
    assert_eq!(err["data"]["context"]["name"], "nope");
}

fn unreachable_target(name: &str, prefix: &str) -> Target {
    Target::new(
        name,
        TargetTransport::Stdio {
            command: "capmux-no-such-command-anywhere".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
        },
        McpClientConfig::default(),
    )
    .with_attributes(TargetAttributes {
        tool_prefix: Some(prefix.to_string()),
        ..TargetAttributes::default()
    })
}

#[tokio::test]
async fn test_prefixed_tool_on_errored_target_reports_connection_failure() {
    let gateway = gateway_with(vec![FixtureServer::new("a").tools(&["echo"])]).await;
    gateway
        .add_target(unreachable_target("b", "b_"), ConnectOptions::default())
        .await
        .unwrap();
    assert_eq!(gateway.get_target("b").await.unwrap().status().await, TargetStatus::Error);

    // Both the unprefixed target and "b" are candidates; only "b" fails to list
    let err = call(&gateway, "tools/call", json!({ "name": "b_echo" })).await.unwrap_err();
    assert_eq!(err["data"]["code"], "CONNECTION_REFUSED");
    assert_eq!(err["data"]["context"]["name"], "b");

    let result = call(&gateway, "tools/call", json!({ "name": "echo" })).await.unwrap();
    assert_eq!(result["content"][0]["text"], "a:echo");
}

#[tokio::test]
async fn test_sole_errored_candidate_reports_connection_failure() {
    let gateway = gateway();
    gateway
        .add_target(unreachable_target("b", "b_"), ConnectOptions::default())
        .await
        .unwrap();

    let err = call(&gateway, "tools/call", json!({ "name": "b_echo" })).await.unwrap_err();
    assert_eq!(err["data"]["code"], "CONNECTION_REFUSED");
}

#[tokio::test]
async fn test_colliding_prompts_are_qualified() {
    let gateway = gateway_with(vec![
        FixtureServer::new("one").prompts(&["summarize", "only_one"]),
        FixtureServer::new("two").prompts(&["summarize"]),
    ])
    .await;

    let listing = call(&gateway, "prompts/list", json!({})).await.unwrap();
    assert_eq!(
        names(&listing, "prompts", "name"),
        vec!["one::summarize", "only_one", "two::summarize"]
    );

    let result = call(&gateway, "prompts/get", json!({ "name": "two::summarize" })).await.unwrap();
    assert_eq!(result["messages"][0]["content"]["text"], "two:summarize");

    let result = call(&gateway, "prompts/get", json!({ "name": "only_one" })).await.unwrap();
    assert_eq!(result["messages"][0]["content"]["text"], "one:only_one");
}

#[tokio::test]
async fn test_colliding_resources_are_qualified_and_routed() {
    let gateway = gateway_with(vec![
        FixtureServer::new("one").resources(&["file:///readme.md"]),
        FixtureServer::new("two").resources(&["file:///readme.md", "file:///notes.md"]),
    ])
    .await;

    let listing = call(&gateway, "resources/list", json!({})).await.unwrap();
    assert_eq!(
        names(&listing, "resources", "uri"),
        vec!["one::file:///readme.md", "two::file:///readme.md", "file:///notes.md"]
    );

    let result = call(&gateway, "resources/read", json!({ "uri": "two::file:///readme.md" }))
        .await
        .unwrap();
    assert_eq!(result["contents"][0]["text"], "two:file:///readme.md");

    let result = call(&gateway, "resources/read", json!({ "uri": "file:///notes.md" })).await.unwrap();
    assert_eq!(result["contents"][0]["text"], "two:file:///notes.md");
}

#[tokio::test]
async fn test_templated_uri_routes_to_template_owner() {
    let gateway = gateway_with(vec![
        FixtureServer::new("files").resources(&["file:///a"]),
        FixtureServer::new("tickets").templates(&["tickets://{id}"]),
    ])
    .await;

    let listing = call(&gateway, "resources/templates/list", json!({})).await.unwrap();
    assert_eq!(names(&listing, "resourceTemplates", "uriTemplate"), vec!["tickets://{id}"]);

    let result = call(&gateway, "resources/read", json!({ "uri": "tickets://42" })).await.unwrap();
    assert_eq!(result["contents"][0]["text"], "tickets:tickets://42");

    let err = call(&gateway, "resources/read", json!({ "uri": "nothing://here" })).await.unwrap_err();
    assert_eq!(err["data"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_targets_without_a_capability_are_skipped() {
    let gateway = gateway_with(vec![
        FixtureServer::new("tools_only").tools(&["a"]),
        FixtureServer::new("prompts_only").prompts(&["p"]),
    ])
    .await;

    let tools = call(&gateway, "tools/list", json!({})).await.unwrap();
    assert_eq!(names(&tools, "tools", "name"), vec!["a"]);
    let prompts = call(&gateway, "prompts/list", json!({})).await.unwrap();
    assert_eq!(names(&prompts, "prompts", "name"), vec!["p"]);
    let resources = call(&gateway, "resources/list", json!({})).await.unwrap();
    assert!(names(&resources, "resources", "uri").is_empty());
}

#[tokio::test]
async fn test_initialize_advertises_configured_capabilities() {
    let capabilities = CapabilitySet {
        prompts: false,
        resource_subscriptions: true,
        ..CapabilitySet::default()
    };
    let gateway = Arc::new(GatewayServer::new("gw", capabilities).with_instructions("Use gh_ tools for GitHub"));

    let result = call(&gateway, "initialize", json!({ "protocolVersion": "2025-03-26" })).await.unwrap();
    assert_eq!(result["protocolVersion"], "2025-03-26");
    assert_eq!(result["serverInfo"]["name"], "gw");
    assert_eq!(result["instructions"], "Use gh_ tools for GitHub");
    assert!(result["capabilities"]["tools"].is_object());
    assert!(result["capabilities"].get("prompts").is_none());
    assert_eq!(result["capabilities"]["resources"]["subscribe"], true);

    let err = call(&gateway, "prompts/list", json!({})).await.unwrap_err();
    assert_eq!(err["code"], -32601);
}

#[tokio::test]
async fn test_subscriptions_require_the_capability() {
    let gateway = gateway_with(vec![FixtureServer::new("files").resources(&["file:///a"])]).await;
    let err = call(&gateway, "resources/subscribe", json!({ "uri": "file:///a" })).await.unwrap_err();
    assert_eq!(err["code"], -32601);

    let capabilities = CapabilitySet {
        resource_subscriptions: true,
        ..CapabilitySet::default()
    };
    let gateway = Arc::new(GatewayServer::new("gw", capabilities));
    gateway
        .add_target(target(FixtureServer::new("files").resources(&["file:///a"])), ConnectOptions::throwing())
        .await
        .unwrap();
    let result = call(&gateway, "resources/subscribe", json!({ "uri": "file:///a" })).await.unwrap();
    assert_eq!(result, json!({}));
}

#[tokio::test]
async fn test_missing_params_are_bad_requests() {
    let gateway = gateway_with(vec![FixtureServer::new("one").tools(&["a"])]).await;
    let err = call(&gateway, "tools/call", json!({})).await.unwrap_err();
    assert_eq!(err["code"], -32602);
    assert_eq!(err["data"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let gateway = gateway();
    let notification = McpRequest::notification("notifications/initialized", None);
    assert!(gateway.handle_request(notification).await.is_none());
}
