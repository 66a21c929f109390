//! Resource template aggregation

use std::sync::Arc;

use super::{collect, qualify_collisions};
use crate::gateway::target::Target;
use crate::mcp::types::ResourceTemplate;

pub async fn list_resource_templates(targets: &[Arc<Target>]) -> Vec<ResourceTemplate> {
    let contributions = collect(targets, "resource templates", |target| async move {
        target.list_resource_templates().await
    })
    .await;
    qualify_collisions(contributions, |template: &mut ResourceTemplate| &mut template.uri_template)
}

/// Literal text of a URI template before its first expression
pub fn literal_prefix(uri_template: &str) -> &str {
    match uri_template.find('{') {
        Some(index) => &uri_template[..index],
        None => uri_template,
    }
}
