//! The completion collaborator contract.
//!
//! Both title summarization and reply generation go through the same
//! `CompletionClient`; they differ only in the messages and options they send.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use petvet_core::config::CompletionOptionsConfig;
use petvet_core::types::{Message, Role};

/// One role-tagged entry of a completion request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

impl From<&Message> for PromptMessage {
    fn from(message: &Message) -> Self {
        Self::new(message.role, message.content.clone())
    }
}

/// Sampling options for a single request.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl CompletionOptions {
    pub fn from_config(model: &str, options: &CompletionOptionsConfig) -> Self {
        Self {
            model: model.to_string(),
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<PromptMessage>,
    pub options: CompletionOptions,
}

/// Failures of the completion endpoint.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CompletionError {
    #[error("completion endpoint is not configured")]
    NotConfigured,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited by completion endpoint")]
    RateLimited,
    #[error("completion API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("completion endpoint returned no content")]
    EmptyResponse,
}

/// A text-generation backend.
///
/// Implementations issue exactly one request per call. They never retry.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}
