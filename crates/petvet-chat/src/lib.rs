//! Conversation flow for PetVet.
//!
//! Wires the message store and the completion endpoint into send and
//! auto-response rounds: persist the user's turn, name the conversation on its
//! first round, generate the assistant's reply and persist it.

pub mod completion;
pub mod error;
pub mod mock;
pub mod offline;
pub mod openai;
pub mod orchestrator;
pub mod prompt;
pub mod response;
pub mod round;
pub mod summarizer;
pub mod types;

pub use completion::{
    CompletionClient, CompletionError, CompletionOptions, CompletionRequest, PromptMessage,
};
pub use error::ChatError;
pub use mock::MockCompletionClient;
pub use offline::OfflineCompletionClient;
pub use openai::OpenAiCompletionClient;
pub use orchestrator::ConversationOrchestrator;
pub use response::{ResponseGenerator, FALLBACK_REPLY};
pub use round::RoundState;
pub use summarizer::{fallback_title, TitleSummarizer, TITLE_INSTRUCTION};
pub use types::{ConversationView, OpenOutcome, RoundOutcome};
