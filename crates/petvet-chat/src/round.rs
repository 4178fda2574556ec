//! Round state machine with validated transitions.
//!
//! Idle -> PersistingUser -> (Summarizing) -> GeneratingReply -> PersistingAssistant -> Idle
//!
//! Auto-responses enter at Summarizing or GeneratingReply since their user
//! message is already stored. There is no cancelled state.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ChatError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Idle,
    PersistingUser,
    Summarizing,
    GeneratingReply,
    PersistingAssistant,
}

impl RoundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundState::Idle => "idle",
            RoundState::PersistingUser => "persisting_user",
            RoundState::Summarizing => "summarizing",
            RoundState::GeneratingReply => "generating_reply",
            RoundState::PersistingAssistant => "persisting_assistant",
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate that a round transition is allowed.
///
/// Valid transitions:
/// - Idle -> PersistingUser (user send)
/// - Idle -> Summarizing | GeneratingReply (auto-response)
/// - PersistingUser -> Summarizing | GeneratingReply
/// - Summarizing -> GeneratingReply
/// - GeneratingReply -> PersistingAssistant
/// - PersistingUser | GeneratingReply | PersistingAssistant -> Idle
///
/// Summarizing cannot fail, so it has no way back to Idle.
pub fn validate_transition(from: RoundState, to: RoundState) -> Result<(), ChatError> {
    use RoundState::*;

    let valid = matches!(
        (from, to),
        (Idle, PersistingUser)
            | (Idle, Summarizing)
            | (Idle, GeneratingReply)
            | (PersistingUser, Summarizing)
            | (PersistingUser, GeneratingReply)
            | (Summarizing, GeneratingReply)
            | (GeneratingReply, PersistingAssistant)
            | (PersistingUser, Idle)
            | (GeneratingReply, Idle)
            | (PersistingAssistant, Idle)
    );

    if valid {
        Ok(())
    } else {
        Err(ChatError::InvalidTransition { from, to })
    }
}

/// Tracks the state of one in-flight round.
#[derive(Debug)]
pub(crate) struct Round {
    conversation_id: Uuid,
    state: RoundState,
}

impl Round {
    pub(crate) fn start(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            state: RoundState::Idle,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> RoundState {
        self.state
    }

    pub(crate) fn advance(&mut self, to: RoundState) -> Result<(), ChatError> {
        validate_transition(self.state, to)?;
        debug!(
            conversation_id = %self.conversation_id,
            from = %self.state,
            to = %to,
            "Round transition"
        );
        self.state = to;
        Ok(())
    }

    /// Return to Idle after a terminal failure.
    pub(crate) fn abort(&mut self, err: &ChatError) {
        warn!(
            conversation_id = %self.conversation_id,
            state = %self.state,
            error = %err,
            "Round aborted"
        );
        self.state = RoundState::Idle;
    }
}
