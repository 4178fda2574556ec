use serde::Serialize;

use petvet_core::types::{Conversation, Message};

/// A conversation as loaded for display.
#[derive(Clone, Debug, Serialize)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    /// No round has been answered yet, so the next one names the conversation.
    pub is_first_turn: bool,
    /// Holds a single seeded user message that has not been auto-answered.
    pub needs_auto_reply: bool,
}

/// Result of one completed round.
#[derive(Clone, Debug, Serialize)]
pub struct RoundOutcome {
    /// State of the conversation after the round.
    pub conversation: Conversation,
    pub user_message: Message,
    pub assistant_message: Message,
    /// Title applied by this round, if it was the first.
    pub generated_title: Option<String>,
}

/// Result of opening a conversation.
#[derive(Clone, Debug, Serialize)]
pub struct OpenOutcome {
    pub view: ConversationView,
    pub auto_reply: Option<RoundOutcome>,
}
