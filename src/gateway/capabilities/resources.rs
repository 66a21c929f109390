//! Resource aggregation and dispatch
//!
//! A URI not present in any listing is routed to the first target with a resource
//! template whose literal prefix the URI starts with.

use std::sync::Arc;

use serde_json::Value;

use super::resource_templates::literal_prefix;
use super::{collect, not_found, qualify_collisions, resolve_namespaced};
use crate::error::{ErrorCode, Result};
use crate::gateway::target::Target;
use crate::mcp::clients::RequestOptions;
use crate::mcp::types::{Resource, ResourceTemplate};

pub async fn list_resources(targets: &[Arc<Target>]) -> Vec<Resource> {
    let contributions = collect(targets, "resources", |target| async move { target.list_resources().await }).await;
    qualify_collisions(contributions, |resource: &mut Resource| &mut resource.uri)
}

/// Find the target owning a (possibly namespaced) resource URI
pub async fn resolve_resource(targets: &[Arc<Target>], uri: &str) -> Result<(Arc<Target>, String)> {
    let listed = resolve_namespaced(
        targets,
        "resource",
        uri,
        |target| async move { target.list_resources().await },
        |resource: &Resource| resource.uri.as_str(),
    )
    .await;

    match listed {
        Err(e) if e.code() == ErrorCode::NotFound && e.context().get("target").is_none() => {
            let contributions = collect(targets, "resource templates", |target| async move {
                target.list_resource_templates().await
            })
            .await;
            contributions
                .into_iter()
                .find(|contribution| {
                    contribution.items.iter().any(|template: &ResourceTemplate| {
                        let prefix = literal_prefix(&template.uri_template);
                        !prefix.is_empty() && uri.starts_with(prefix)
                    })
                })
                .map(|contribution| (contribution.target, uri.to_string()))
                .ok_or_else(|| not_found("resource", uri))
        }
        other => other,
    }
}

pub async fn read_resource(targets: &[Arc<Target>], uri: &str, options: &RequestOptions) -> Result<Value> {
    let (target, native) = resolve_resource(targets, uri).await?;
    target.read_resource(&native, options).await
}

pub async fn subscribe_resource(targets: &[Arc<Target>], uri: &str, options: &RequestOptions) -> Result<Value> {
    let (target, native) = resolve_resource(targets, uri).await?;
    target.subscribe_resource(&native, options).await
}

pub async fn unsubscribe_resource(targets: &[Arc<Target>], uri: &str, options: &RequestOptions) -> Result<Value> {
    let (target, native) = resolve_resource(targets, uri).await?;
    target.unsubscribe_resource(&native, options).await
}
