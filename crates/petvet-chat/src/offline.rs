//! Canned `CompletionClient` used when no completion endpoint is wanted.
//!
//! Keeps no state: requests are inspected for their kind and dropped.

use async_trait::async_trait;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::summarizer::TITLE_INSTRUCTION;

pub const OFFLINE_TITLE: &str = "Offline consultation";
pub const OFFLINE_REPLY: &str = "PetVet is running offline, so no veterinary advice can be generated \
right now. If you are worried about your pet, please contact your vet.";

/// Answers title requests with [`OFFLINE_TITLE`] and everything else with
/// [`OFFLINE_REPLY`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineCompletionClient;

impl OfflineCompletionClient {
    pub fn new() -> Self {
        Self
    }
}

/// Title requests carry the title instruction in their first message, either
/// as the system turn or at the head of a flattened prompt.
fn is_title_request(request: &CompletionRequest) -> bool {
    request
        .messages
        .first()
        .is_some_and(|m| m.content.contains(TITLE_INSTRUCTION))
}

#[async_trait]
impl CompletionClient for OfflineCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let reply = if is_title_request(&request) {
            OFFLINE_TITLE
        } else {
            OFFLINE_REPLY
        };
        Ok(reply.to_string())
    }
}
