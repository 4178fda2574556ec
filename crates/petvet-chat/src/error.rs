//! Error types for the conversation flow.

use petvet_core::error::PetVetError;

use crate::completion::CompletionError;
use crate::round::RoundState;

/// Errors surfaced by a conversation round.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("conversation not found: {0}")]
    ConversationNotFound(uuid::Uuid),
    #[error("a round is already in flight for conversation {0}")]
    RoundInFlight(uuid::Uuid),
    #[error("invalid round transition: {from} -> {to}")]
    InvalidTransition { from: RoundState, to: RoundState },
    #[error("persist error: {0}")]
    Persist(String),
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),
}

impl ChatError {
    /// Rejected before any store or completion call was made.
    pub fn is_validation(&self) -> bool {
        matches!(self, ChatError::EmptyMessage | ChatError::MessageTooLong(_))
    }
}

impl From<PetVetError> for ChatError {
    fn from(err: PetVetError) -> Self {
        match err {
            PetVetError::ConversationNotFound(id) => ChatError::ConversationNotFound(id),
            other => ChatError::Persist(other.to_string()),
        }
    }
}
