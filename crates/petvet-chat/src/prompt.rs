//! Prompt shaping for the two completion modes.

use petvet_core::config::PromptMode;

use crate::completion::PromptMessage;

/// Render a history as `ROLE: content` turns separated by blank lines.
pub fn flatten(messages: &[PromptMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Adapt role-tagged messages to the configured prompt mode.
///
/// `Flattened` collapses everything into a single user message.
pub fn shape(messages: Vec<PromptMessage>, mode: PromptMode) -> Vec<PromptMessage> {
    match mode {
        PromptMode::Structured => messages,
        PromptMode::Flattened => vec![PromptMessage::user(flatten(&messages))],
    }
}
