//! Title summarization for new conversations.
//!
//! A single completion call names the consultation after its first user
//! message. Any failure falls back to a prefix of that message, so
//! summarization never blocks a round.

use std::sync::Arc;

use tracing::{debug, warn};

use petvet_core::config::{CompletionConfig, PromptMode};

use crate::completion::{
    CompletionClient, CompletionError, CompletionOptions, CompletionRequest, PromptMessage,
};
use crate::prompt;

/// Instruction sent ahead of the user's message when asking for a title.
pub const TITLE_INSTRUCTION: &str = "You name veterinary consultations. \
Reply with a title of at most four words describing the consultation in the user's message. \
Reply with the title only.";

/// First `chars` characters of `message`, untrimmed.
pub fn fallback_title(message: &str, chars: usize) -> String {
    message.chars().take(chars).collect()
}

pub struct TitleSummarizer {
    client: Arc<dyn CompletionClient>,
    options: CompletionOptions,
    mode: PromptMode,
    fallback_chars: usize,
}

impl TitleSummarizer {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        config: &CompletionConfig,
        fallback_chars: usize,
    ) -> Self {
        Self {
            client,
            options: CompletionOptions::from_config(&config.model, &config.title),
            mode: config.prompt_mode,
            fallback_chars,
        }
    }

    /// Title for a conversation whose first user message is `first_user_message`.
    pub async fn summarize(&self, first_user_message: &str) -> String {
        match self.request_title(first_user_message).await {
            Ok(title) => {
                debug!(title_len = title.chars().count(), "Title summarized");
                title
            }
            Err(e) => {
                warn!(error = %e, "Title summarization failed, using message prefix");
                fallback_title(first_user_message, self.fallback_chars)
            }
        }
    }

    async fn request_title(&self, message: &str) -> Result<String, CompletionError> {
        let messages = prompt::shape(
            vec![
                PromptMessage::system(TITLE_INSTRUCTION),
                PromptMessage::user(message),
            ],
            self.mode,
        );
        let reply = self
            .client
            .complete(CompletionRequest {
                messages,
                options: self.options.clone(),
            })
            .await?;

        let title = reply.trim();
        if title.is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(title.to_string())
    }
}
