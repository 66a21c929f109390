//! Mutable prompt table published as an in-process target
//!
//! An MCP server cannot gain prompts after it is connected, so every mutation
//! builds a fresh server over the new table and swaps it in for the old one.
//! Readers keep being served during the swap. The table mutex is held for the
//! whole cycle, which serializes mutations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use crate::config::McpClientConfig;
use crate::error::{GatewayError, Result};
use crate::gateway::target::{ConnectOptions, Target};
use crate::prompts::{Prompt, PromptServer, PromptUpdate};

/// Name of the prompt provider's target
pub const PROMPT_TARGET_NAME: &str = "__prompts__";

/// Publication state of the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderState {
    Ready,
    Rebuilding,
    /// The last rebuild could not reconnect; the table holds the attempted state
    Failed,
}

pub struct PromptManager {
    target: Arc<Target>,
    table: Mutex<Vec<Prompt>>,
    state: RwLock<ProviderState>,
}

impl PromptManager {
    /// Create a provider named [`PROMPT_TARGET_NAME`]
    pub fn new(prompts: Vec<Prompt>, client_config: McpClientConfig) -> Result<Self> {
        Self::with_name(PROMPT_TARGET_NAME, prompts, client_config)
    }

    pub fn with_name(name: &str, prompts: Vec<Prompt>, client_config: McpClientConfig) -> Result<Self> {
        let mut table: Vec<Prompt> = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let prompt = prompt.normalized()?;
            if table.iter().any(|existing| existing.name == prompt.name) {
                return Err(duplicate(&prompt.name));
            }
            table.push(prompt);
        }

        let server = Arc::new(PromptServer::new(name, table.clone()));
        Ok(Self {
            target: Arc::new(Target::in_process(name, server, client_config)),
            table: Mutex::new(table),
            state: RwLock::new(ProviderState::Ready),
        })
    }

    /// The provider's target, to be registered with a gateway
    pub fn target(&self) -> Arc<Target> {
        Arc::clone(&self.target)
    }

    pub async fn state(&self) -> ProviderState {
        *self.state.read().await
    }

    pub async fn prompts(&self) -> Vec<Prompt> {
        self.table.lock().await.clone()
    }

    pub async fn get_prompt_entry(&self, name: &str) -> Result<Prompt> {
        let table = self.table.lock().await;
        table
            .iter()
            .find(|prompt| prompt.name == name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    /// Add a prompt and republish
    pub async fn add_prompt_entry(&self, prompt: Prompt) -> Result<Prompt> {
        let prompt = prompt.normalized()?;
        let mut table = self.table.lock().await;
        if table.iter().any(|existing| existing.name == prompt.name) {
            return Err(duplicate(&prompt.name));
        }

        table.push(prompt.clone());
        info!("Added prompt '{}' to '{}'", prompt.name, self.target.name());
        self.republish(&table).await?;
        Ok(prompt)
    }

    /// Update title, description or body of a prompt and republish
    pub async fn update_prompt(&self, name: &str, update: PromptUpdate) -> Result<Prompt> {
        let mut table = self.table.lock().await;
        let slot = table
            .iter_mut()
            .find(|prompt| prompt.name == name)
            .ok_or_else(|| not_found(name))?;

        let updated = slot.updated(update)?;
        *slot = updated.clone();
        info!("Updated prompt '{}' in '{}'", name, self.target.name());
        self.republish(&table).await?;
        Ok(updated)
    }

    /// Remove a prompt and republish
    pub async fn remove_prompt_entry(&self, name: &str) -> Result<Prompt> {
        let mut table = self.table.lock().await;
        let index = table
            .iter()
            .position(|prompt| prompt.name == name)
            .ok_or_else(|| not_found(name))?;

        let removed = table.remove(index);
        info!("Removed prompt '{}' from '{}'", name, self.target.name());
        self.republish(&table).await?;
        Ok(removed)
    }

    /// Ready -> Rebuilding -> Ready (or Failed)
    async fn republish(&self, table: &[Prompt]) -> Result<()> {
        *self.state.write().await = ProviderState::Rebuilding;

        let server = Arc::new(PromptServer::new(self.target.name(), table.to_vec()));
        match self.target.rebuild(server, ConnectOptions::throwing()).await {
            Ok(()) => {
                *self.state.write().await = ProviderState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("Failed to republish prompts of '{}': {}", self.target.name(), e);
                *self.state.write().await = ProviderState::Failed;
                Err(e)
            }
        }
    }
}

fn not_found(name: &str) -> GatewayError {
    GatewayError::not_found(format!("Prompt '{}' not found", name)).with_context("name", name)
}

fn duplicate(name: &str) -> GatewayError {
    GatewayError::duplicate(format!("Prompt '{}' already exists", name)).with_context("name", name)
}
