//! Assistant reply generation.

use std::sync::Arc;

use tracing::debug;

use petvet_core::config::{CompletionConfig, PromptMode};

use crate::completion::{
    CompletionClient, CompletionError, CompletionOptions, CompletionRequest, PromptMessage,
};
use crate::prompt;

/// Substituted when the endpoint answers with blank text.
pub const FALLBACK_REPLY: &str = "I could not generate a response";

/// Generates the assistant's next turn from the full conversation history.
pub struct ResponseGenerator {
    client: Arc<dyn CompletionClient>,
    options: CompletionOptions,
    mode: PromptMode,
    system_prompt: String,
}

impl ResponseGenerator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        config: &CompletionConfig,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            client,
            options: CompletionOptions::from_config(&config.model, &config.reply),
            mode: config.prompt_mode,
            system_prompt: system_prompt.into(),
        }
    }

    /// Reply to `history` (oldest first). Endpoint failures propagate.
    pub async fn generate(&self, history: &[PromptMessage]) -> Result<String, CompletionError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(PromptMessage::system(self.system_prompt.as_str()));
        messages.extend_from_slice(history);

        let reply = self
            .client
            .complete(CompletionRequest {
                messages: prompt::shape(messages, self.mode),
                options: self.options.clone(),
            })
            .await?;

        let reply = reply.trim();
        if reply.is_empty() {
            debug!("Blank reply from completion endpoint, using fallback sentence");
            return Ok(FALLBACK_REPLY.to_string());
        }
        Ok(reply.to_string())
    }
}
