//! Capability aggregation and dispatch
//!
//! Each handler works on a snapshot of the registry's targets, in registration
//! order. Disabled or unconnected targets contribute nothing, and a target whose
//! listing fails contributes an empty list.

pub mod prompts;
pub mod resource_templates;
pub mod resources;
pub mod tools;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::gateway::naming;
use crate::gateway::target::{Target, TargetAttributes, TargetStatus};

/// One target's share of an aggregated listing
pub struct Contribution<T> {
    pub target: Arc<Target>,
    pub attributes: TargetAttributes,
    pub items: Vec<T>,
}

/// Fetch the native listing of every active target, keeping registration order
pub async fn collect<T, F, Fut>(targets: &[Arc<Target>], kind: &str, fetch: F) -> Vec<Contribution<T>>
where
    F: Fn(Arc<Target>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let fetches = targets.iter().map(|target| {
        let target = Arc::clone(target);
        let fetched = fetch(Arc::clone(&target));
        async move {
            let attributes = target.attributes().await;
            if attributes.disabled {
                debug!("Skipping disabled target '{}' for {}", target.name(), kind);
                return None;
            }
            if target.status().await != TargetStatus::Connected {
                debug!("Skipping unconnected target '{}' for {}", target.name(), kind);
                return None;
            }

            let items = match fetched.await {
                Ok(items) => items,
                Err(e) => {
                    warn!(
                        target_name = %target.name(),
                        error_code = %e.code(),
                        "Failed to list {}: {}",
                        kind,
                        e
                    );
                    Vec::new()
                }
            };
            Some(Contribution { target, attributes, items })
        }
    });

    join_all(fetches).await.into_iter().flatten().collect()
}

/// Flatten contributions, qualifying keys that occur in more than one entry as `<target>::<key>`
pub fn qualify_collisions<T, K>(contributions: Vec<Contribution<T>>, key: K) -> Vec<T>
where
    K: Fn(&mut T) -> &mut String,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut contributions = contributions;
    for contribution in contributions.iter_mut() {
        for item in contribution.items.iter_mut() {
            *counts.entry(key(item).clone()).or_default() += 1;
        }
    }

    let mut merged = Vec::new();
    for contribution in contributions {
        let target_name = contribution.target.name().to_string();
        for mut item in contribution.items {
            let slot = key(&mut item);
            if counts.get(slot.as_str()).copied().unwrap_or(0) > 1 {
                *slot = naming::qualify(&target_name, slot);
            }
            merged.push(item);
        }
    }
    merged
}

/// Resolve a possibly namespaced key to `(target, native key)`.
///
/// A `<target>::` qualifier naming a registered target wins. Otherwise the first
/// active target whose listing holds the key owns it.
pub async fn resolve_namespaced<T, F, Fut, K>(
    targets: &[Arc<Target>],
    kind: &str,
    requested: &str,
    fetch: F,
    key: K,
) -> Result<(Arc<Target>, String)>
where
    F: Fn(Arc<Target>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
    K: Fn(&T) -> &str,
{
    if let Some((target_name, native)) = naming::split_qualified(requested) {
        if let Some(target) = targets.iter().find(|t| t.is_named(target_name)) {
            if target.attributes().await.disabled {
                return Err(not_found(kind, requested).with_context("target", target.name()));
            }
            return Ok((Arc::clone(target), native.to_string()));
        }
    }

    for contribution in collect(targets, kind, fetch).await {
        if contribution.items.iter().any(|item| key(item) == requested) {
            return Ok((contribution.target, requested.to_string()));
        }
    }

    Err(not_found(kind, requested))
}

pub(crate) fn not_found(kind: &str, name: &str) -> GatewayError {
    GatewayError::not_found(format!("Unknown {} '{}'", kind, name)).with_context("name", name)
}
