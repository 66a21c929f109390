//! Prompt aggregation and dispatch

use std::sync::Arc;

use serde_json::Value;

use super::{collect, qualify_collisions, resolve_namespaced};
use crate::error::Result;
use crate::gateway::target::Target;
use crate::mcp::clients::RequestOptions;
use crate::mcp::types::PromptTemplate;

pub async fn list_prompts(targets: &[Arc<Target>]) -> Vec<PromptTemplate> {
    let contributions = collect(targets, "prompts", |target| async move { target.list_prompts().await }).await;
    qualify_collisions(contributions, |prompt: &mut PromptTemplate| &mut prompt.name)
}

pub async fn get_prompt(
    targets: &[Arc<Target>],
    name: &str,
    arguments: Option<Value>,
    options: &RequestOptions,
) -> Result<Value> {
    let (target, native) = resolve_namespaced(
        targets,
        "prompt",
        name,
        |target| async move { target.list_prompts().await },
        |prompt: &PromptTemplate| prompt.name.as_str(),
    )
    .await?;
    target.get_prompt(&native, arguments, options).await
}
