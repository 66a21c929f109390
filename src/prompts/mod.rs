//! Built-in prompt provider
//!
//! Prompts managed at runtime are published to the gateway as an ordinary
//! in-process target.

mod manager;
mod prompt;
mod server;

pub use manager::{PromptManager, ProviderState, PROMPT_TARGET_NAME};
pub use prompt::{Prompt, PromptUpdate};
pub use server::PromptServer;
