//! Tool aggregation and dispatch
//!
//! Tools are exposed as `<tool_prefix><name>`, minus each target's `disabled_tools`.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{collect, not_found};
use crate::error::Result;
use crate::gateway::naming;
use crate::gateway::target::Target;
use crate::mcp::clients::RequestOptions;
use crate::mcp::types::Tool;

/// Aggregated tool listing
pub async fn list_tools(targets: &[Arc<Target>]) -> Vec<Tool> {
    let contributions = collect(targets, "tools", |target| async move { target.list_tools().await }).await;

    let mut tools = Vec::new();
    for contribution in contributions {
        let prefix = contribution.attributes.tool_prefix.as_deref();
        for mut tool in contribution.items {
            if contribution.attributes.disabled_tools.contains(&tool.name) {
                continue;
            }
            tool.name = naming::prefixed_tool_name(prefix, &tool.name);
            tools.push(tool);
        }
    }
    tools
}

/// Find the target owning an exposed tool name and the tool's original name.
///
/// Candidates are enabled targets whose prefix the name carries, longest prefix
/// first. A sole candidate is routed to directly. Several candidates are told
/// apart by their listings, fetched under the caller's options; when none owns
/// the tool the first listing failure is returned. A tool in `disabled_tools`
/// is not found.
pub async fn resolve_tool(
    targets: &[Arc<Target>],
    exposed: &str,
    options: &RequestOptions,
) -> Result<(Arc<Target>, String)> {
    let mut candidates = Vec::new();
    for (index, target) in targets.iter().enumerate() {
        let attributes = target.attributes().await;
        if attributes.disabled {
            continue;
        }
        if let Some(original) = naming::strip_tool_prefix(attributes.tool_prefix.as_deref(), exposed) {
            let prefix_len = attributes.tool_prefix.as_ref().map(String::len).unwrap_or(0);
            candidates.push((prefix_len, index, Arc::clone(target), attributes, original.to_string()));
        }
    }
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    if candidates.len() == 1 {
        let (_, _, target, attributes, original) = candidates.remove(0);
        if attributes.disabled_tools.contains(&original) {
            return Err(not_found("tool", exposed).with_context("target", target.name()));
        }
        return Ok((target, original));
    }

    let mut first_failure = None;
    for (_, _, target, attributes, original) in candidates {
        let owned = match target.list_tools_with(options).await {
            Ok(tools) => tools.iter().any(|tool| tool.name == original),
            Err(e) => {
                debug!("Could not list tools of '{}' while resolving '{}': {}", target.name(), exposed, e);
                first_failure.get_or_insert(e);
                false
            }
        };
        if !owned {
            continue;
        }
        if attributes.disabled_tools.contains(&original) {
            return Err(not_found("tool", exposed).with_context("target", target.name()));
        }
        return Ok((target, original));
    }

    Err(first_failure.unwrap_or_else(|| not_found("tool", exposed)))
}

/// Invoke a tool by its exposed name; the target's result is returned unmodified
pub async fn call_tool(
    targets: &[Arc<Target>],
    exposed: &str,
    arguments: Option<Value>,
    options: &RequestOptions,
) -> Result<Value> {
    let (target, original) = resolve_tool(targets, exposed, options).await?;
    debug!("Routing tool '{}' to '{}' on target '{}'", exposed, original, target.name());
    target.call_tool(&original, arguments, options).await
}
