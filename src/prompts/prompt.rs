use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// A prompt served by the built-in prompt provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Unique key within one provider
    pub name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Text returned as the single user message
    pub body: String,
}

/// Partial prompt update; `None` fields are left unchanged.
/// An empty `description` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl Prompt {
    pub fn new<N, T, B>(name: N, title: T, body: B) -> Self
    where
        N: Into<String>,
        T: Into<String>,
        B: Into<String>,
    {
        Self {
            name: name.into(),
            title: title.into(),
            description: None,
            body: body.into(),
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Trimmed copy, rejecting empty required fields
    pub fn normalized(&self) -> Result<Prompt> {
        let prompt = Prompt {
            name: required("name", &self.name)?,
            title: required("title", &self.title)?,
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            body: required("body", &self.body)?,
        };
        Ok(prompt)
    }

    /// Apply a partial update, returning the normalized result
    pub fn updated(&self, update: PromptUpdate) -> Result<Prompt> {
        let mut next = self.clone();
        if let Some(title) = update.title {
            next.title = title;
        }
        if let Some(description) = update.description {
            next.description = Some(description);
        }
        if let Some(body) = update.body {
            next.body = body;
        }
        next.normalized()
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::bad_request(format!("Prompt {} must not be empty", field))
            .with_context("field", field));
    }
    Ok(trimmed.to_string())
}
