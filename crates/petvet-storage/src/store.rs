//! The storage collaborator contract.
//!
//! Every call is a direct round trip: no caching and no retries. Callers see
//! raw failures as `PetVetError`.

use async_trait::async_trait;
use uuid::Uuid;

use petvet_core::error::PetVetError;
use petvet_core::types::{Conversation, Message, Role};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a conversation owned by `user_id` with the given (placeholder) title.
    async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<Conversation, PetVetError>;

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, PetVetError>;

    /// Conversations owned by `user_id`, most recently updated first.
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, PetVetError>;

    /// Delete a conversation and its messages. Returns `false` if it did not exist.
    async fn delete_conversation(&self, id: Uuid) -> Result<bool, PetVetError>;

    /// Append a message with a store-assigned id and timestamp.
    ///
    /// Fails if the conversation does not exist or `role` is `System`.
    async fn append(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: &str,
    ) -> Result<Message, PetVetError>;

    /// All messages of a conversation in creation order.
    async fn list(&self, conversation_id: Uuid) -> Result<Vec<Message>, PetVetError>;

    /// Bump `updated_at` and, when given, replace the title (marking it generated).
    async fn touch_conversation(
        &self,
        conversation_id: Uuid,
        title: Option<&str>,
    ) -> Result<(), PetVetError>;

    /// Record that the automatic reply to a seeded message has been attempted.
    async fn mark_auto_reply_attempted(&self, conversation_id: Uuid) -> Result<(), PetVetError>;
}
