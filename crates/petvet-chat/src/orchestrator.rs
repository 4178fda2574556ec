//! Conversation orchestrator: drives send and auto-response rounds.
//!
//! A round persists the user's turn, names the conversation if it is the first
//! round, generates the assistant's reply and persists it. Every step awaits
//! the previous one, so storage order always equals call order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};
use uuid::Uuid;

use petvet_core::config::{ChatConfig, CompletionConfig};
use petvet_core::types::{Conversation, Message, Role};
use petvet_storage::ConversationStore;

use crate::completion::{CompletionClient, PromptMessage};
use crate::error::ChatError;
use crate::response::ResponseGenerator;
use crate::round::{Round, RoundState};
use crate::summarizer::TitleSummarizer;
use crate::types::{ConversationView, OpenOutcome, RoundOutcome};

/// Coordinates the message store, title summarizer and response generator.
pub struct ConversationOrchestrator {
    store: Arc<dyn ConversationStore>,
    summarizer: TitleSummarizer,
    generator: ResponseGenerator,
    config: ChatConfig,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// Marks a conversation as having a round in flight until dropped.
struct RoundGuard {
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    conversation_id: Uuid,
}

impl Drop for RoundGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.conversation_id);
    }
}

impl ConversationOrchestrator {
    /// The completion client is shared by the summarizer and the generator.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        client: Arc<dyn CompletionClient>,
        completion: &CompletionConfig,
        config: ChatConfig,
    ) -> Self {
        let summarizer =
            TitleSummarizer::new(client.clone(), completion, config.title_fallback_chars);
        let generator = ResponseGenerator::new(client, completion, config.system_prompt.as_str());

        Self {
            store,
            summarizer,
            generator,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create an empty conversation with the placeholder title.
    pub async fn create_conversation(&self, user_id: &str) -> Result<Conversation, ChatError> {
        let conversation = self
            .store
            .create_conversation(user_id, &self.config.placeholder_title)
            .await?;
        info!(conversation_id = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    /// Create a conversation holding one unanswered user message.
    ///
    /// The reply is produced by the first `open`.
    pub async fn create_seeded_conversation(
        &self,
        user_id: &str,
        initial_message: &str,
    ) -> Result<ConversationView, ChatError> {
        self.validate(initial_message)?;

        let conversation = self.create_conversation(user_id).await?;
        let message = self
            .store
            .append(conversation.id, Role::User, initial_message)
            .await?;
        debug!(
            conversation_id = %conversation.id,
            message_len = initial_message.chars().count(),
            "Seed message persisted"
        );
        Ok(build_view(conversation, vec![message]))
    }

    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, ChatError> {
        Ok(self.store.list_conversations(user_id).await?)
    }

    pub async fn delete_conversation(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<(), ChatError> {
        self.owned_conversation(user_id, conversation_id).await?;
        if !self.store.delete_conversation(conversation_id).await? {
            return Err(ChatError::ConversationNotFound(conversation_id));
        }
        info!(conversation_id = %conversation_id, "Conversation deleted");
        Ok(())
    }

    /// Load a conversation and its messages without triggering anything.
    pub async fn load(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<ConversationView, ChatError> {
        let conversation = self.owned_conversation(user_id, conversation_id).await?;
        let messages = self.store.list(conversation_id).await?;
        Ok(build_view(conversation, messages))
    }

    /// Run one user-initiated round.
    pub async fn send(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        text: &str,
    ) -> Result<RoundOutcome, ChatError> {
        self.validate(text)?;

        let _guard = self.begin_round(conversation_id)?;
        let view = self.load(user_id, conversation_id).await?;

        let mut round = Round::start(conversation_id);
        let result = self.run_send(&mut round, view, text).await;
        if let Err(e) = &result {
            round.abort(e);
        }
        result
    }

    /// Load a conversation, answering a seeded first message exactly once.
    ///
    /// The attempt is recorded before the reply is generated, so a failed
    /// auto-reply is reported once and never re-triggered by a later open.
    pub async fn open(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<OpenOutcome, ChatError> {
        let view = self.load(user_id, conversation_id).await?;
        if !view.needs_auto_reply {
            return Ok(OpenOutcome {
                view,
                auto_reply: None,
            });
        }

        let _guard = self.begin_round(conversation_id)?;

        // Another open may have answered between the first load and the guard.
        let view = self.load(user_id, conversation_id).await?;
        let seed = match view.messages.first().cloned() {
            Some(seed) if view.needs_auto_reply => seed,
            _ => {
                return Ok(OpenOutcome {
                    view,
                    auto_reply: None,
                })
            }
        };

        self.store.mark_auto_reply_attempted(conversation_id).await?;
        info!(conversation_id = %conversation_id, "Auto-responding to seeded message");

        let mut round = Round::start(conversation_id);
        let outcome = match self
            .answer(&mut round, conversation_id, view.is_first_turn, view.messages, seed)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                round.abort(&e);
                return Err(e);
            }
        };

        let view = self.load(user_id, conversation_id).await?;
        Ok(OpenOutcome {
            view,
            auto_reply: Some(outcome),
        })
    }

    // -- Private helpers --

    fn validate(&self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }
        Ok(())
    }

    fn begin_round(&self, conversation_id: Uuid) -> Result<RoundGuard, ChatError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(conversation_id) {
            debug!(conversation_id = %conversation_id, "Round already in flight");
            return Err(ChatError::RoundInFlight(conversation_id));
        }
        Ok(RoundGuard {
            in_flight: self.in_flight.clone(),
            conversation_id,
        })
    }

    /// Fetch a conversation, treating one owned by someone else as missing.
    async fn owned_conversation(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<Conversation, ChatError> {
        match self.store.get_conversation(conversation_id).await? {
            Some(conversation) if conversation.is_owned_by(user_id) => Ok(conversation),
            _ => Err(ChatError::ConversationNotFound(conversation_id)),
        }
    }

    async fn run_send(
        &self,
        round: &mut Round,
        view: ConversationView,
        text: &str,
    ) -> Result<RoundOutcome, ChatError> {
        let conversation_id = view.conversation.id;

        round.advance(RoundState::PersistingUser)?;
        let user_message = self.store.append(conversation_id, Role::User, text).await?;
        debug!(
            conversation_id = %conversation_id,
            message_len = text.chars().count(),
            "User message persisted"
        );

        let mut history = view.messages;
        history.push(user_message.clone());

        self.answer(round, conversation_id, view.is_first_turn, history, user_message)
            .await
    }

    /// Summarize (first round only), generate and persist the reply.
    ///
    /// `history` already ends with `user_message`.
    async fn answer(
        &self,
        round: &mut Round,
        conversation_id: Uuid,
        is_first_turn: bool,
        history: Vec<Message>,
        user_message: Message,
    ) -> Result<RoundOutcome, ChatError> {
        let title = if is_first_turn {
            round.advance(RoundState::Summarizing)?;
            match history.iter().find(|m| m.role == Role::User) {
                Some(first) => Some(self.summarizer.summarize(&first.content).await),
                None => None,
            }
        } else {
            None
        };

        round.advance(RoundState::GeneratingReply)?;
        let prompt: Vec<PromptMessage> = history.iter().map(PromptMessage::from).collect();
        let reply = self.generator.generate(&prompt).await?;

        round.advance(RoundState::PersistingAssistant)?;
        let assistant_message = self
            .store
            .append(conversation_id, Role::Assistant, &reply)
            .await?;
        self.store
            .touch_conversation(conversation_id, title.as_deref())
            .await?;
        round.advance(RoundState::Idle)?;

        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(ChatError::ConversationNotFound(conversation_id))?;

        info!(
            conversation_id = %conversation_id,
            history_len = history.len(),
            reply_len = reply.chars().count(),
            titled = title.is_some(),
            "Round completed"
        );

        Ok(RoundOutcome {
            conversation,
            user_message,
            assistant_message,
            generated_title: title,
        })
    }
}

fn build_view(conversation: Conversation, messages: Vec<Message>) -> ConversationView {
    let needs_auto_reply = !conversation.auto_reply_attempted
        && messages.len() == 1
        && messages[0].role == Role::User;

    ConversationView {
        is_first_turn: !conversation.title_generated,
        needs_auto_reply,
        conversation,
        messages,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, CompletionRequest};
    use crate::mock::MockCompletionClient;
    use crate::response::FALLBACK_REPLY;
    use crate::summarizer::TITLE_INSTRUCTION;
    use async_trait::async_trait;
    use petvet_core::error::PetVetError;
    use petvet_storage::{Database, SqliteConversationStore};

    const USER: &str = "owner-1";
    const DOG: &str = "My dog is vomiting, what should I do?";

    fn sqlite_store() -> Arc<SqliteConversationStore> {
        Arc::new(SqliteConversationStore::new(Arc::new(
            Database::in_memory().unwrap(),
        )))
    }

    fn orchestrator_with(
        store: Arc<dyn ConversationStore>,
        client: Arc<dyn CompletionClient>,
    ) -> ConversationOrchestrator {
        ConversationOrchestrator::new(
            store,
            client,
            &CompletionConfig::default(),
            ChatConfig::default(),
        )
    }

    fn setup(mock: MockCompletionClient) -> (ConversationOrchestrator, Arc<MockCompletionClient>) {
        let mock = Arc::new(mock);
        (orchestrator_with(sqlite_store(), mock.clone()), mock)
    }

    fn is_title_request(request: &CompletionRequest) -> bool {
        request.messages[0].content == TITLE_INSTRUCTION
    }

    // ---- Validation ----

    #[tokio::test]
    async fn test_empty_message_rejected_before_any_call() {
        let (orch, mock) = setup(MockCompletionClient::new());
        let conv = orch.create_conversation(USER).await.unwrap();

        for text in ["", "   ", "\n\t"] {
            let err = orch.send(USER, conv.id, text).await.unwrap_err();
            assert!(matches!(err, ChatError::EmptyMessage));
        }
        assert_eq!(mock.call_count(), 0);
        assert!(orch.load(USER, conv.id).await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_message_too_long_rejected() {
        let (orch, mock) = setup(MockCompletionClient::new());
        let conv = orch.create_conversation(USER).await.unwrap();

        let err = orch.send(USER, conv.id, &"a".repeat(2001)).await.unwrap_err();
        assert!(matches!(err, ChatError::MessageTooLong(2000)));
        assert_eq!(mock.call_count(), 0);

        assert!(orch.send(USER, conv.id, &"a".repeat(2000)).await.is_ok());
    }

    #[tokio::test]
    async fn test_validation_precedes_lookup() {
        let (orch, _) = setup(MockCompletionClient::new());
        let err = orch.send(USER, Uuid::new_v4(), "").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
    }

    // ---- Scenario 1: first send names the conversation ----

    #[tokio::test]
    async fn test_first_send_generates_title_and_reply() {
        let (orch, mock) = setup(
            MockCompletionClient::new()
                .reply("Dog Vomiting Advice")
                .reply("Withhold food for a few hours and offer small sips of water."),
        );
        let conv = orch.create_conversation(USER).await.unwrap();
        assert_eq!(conv.title, "New consultation");

        let outcome = orch.send(USER, conv.id, DOG).await.unwrap();
        assert_eq!(outcome.generated_title.as_deref(), Some("Dog Vomiting Advice"));
        assert_eq!(outcome.conversation.title, "Dog Vomiting Advice");
        assert!(outcome.conversation.title_generated);
        assert_eq!(outcome.user_message.content, DOG);
        assert_eq!(outcome.assistant_message.role, Role::Assistant);

        let view = orch.load(USER, conv.id).await.unwrap();
        assert_eq!(view.messages.len(), 2);
        assert_eq!(view.conversation.title, "Dog Vomiting Advice");
        assert!(!view.is_first_turn);

        // Title first, then reply, strictly sequential.
        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert!(is_title_request(&requests[0]));
        assert!(!is_title_request(&requests[1]));
    }

    #[tokio::test]
    async fn test_reply_request_contains_persona_and_history() {
        let (orch, mock) = setup(MockCompletionClient::new().reply("Title").reply("Answer"));
        let conv = orch.create_conversation(USER).await.unwrap();
        orch.send(USER, conv.id, DOG).await.unwrap();

        let reply_request = &mock.requests()[1];
        assert_eq!(reply_request.messages.len(), 2);
        assert_eq!(reply_request.messages[0].role, Role::System);
        assert_eq!(
            reply_request.messages[0].content,
            ChatConfig::default().system_prompt
        );
        assert_eq!(reply_request.messages[1], PromptMessage::user(DOG));
    }

    // ---- Scenario 2 / P3: title failure does not block the reply ----

    #[tokio::test]
    async fn test_title_failure_falls_back_and_reply_persists() {
        let (orch, _) = setup(
            MockCompletionClient::new()
                .fail(CompletionError::Api {
                    status: 500,
                    message: "boom".to_string(),
                })
                .reply("Please call your vet."),
        );
        let conv = orch.create_conversation(USER).await.unwrap();

        let outcome = orch.send(USER, conv.id, DOG).await.unwrap();
        let expected: String = DOG.chars().take(40).collect();
        assert_eq!(outcome.conversation.title, expected);
        assert_eq!(outcome.assistant_message.content, "Please call your vet.");
        assert_eq!(orch.load(USER, conv.id).await.unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_title_fallback_for_short_message() {
        let (orch, _) = setup(
            MockCompletionClient::new()
                .fail(CompletionError::RateLimited)
                .reply("ok"),
        );
        let conv = orch.create_conversation(USER).await.unwrap();
        let outcome = orch.send(USER, conv.id, "Cat sneezing").await.unwrap();
        assert_eq!(outcome.conversation.title, "Cat sneezing");
    }

    // ---- Scenario 3 / P4: reply failure persists only the user message ----

    #[tokio::test]
    async fn test_reply_failure_keeps_only_user_message() {
        let (orch, _) = setup(
            MockCompletionClient::new()
                .reply("Dog Vomiting Advice")
                .fail(CompletionError::Transport("connection reset".to_string())),
        );
        let conv = orch.create_conversation(USER).await.unwrap();

        let err = orch.send(USER, conv.id, DOG).await.unwrap_err();
        assert!(matches!(err, ChatError::Completion(CompletionError::Transport(_))));

        let view = orch.load(USER, conv.id).await.unwrap();
        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.messages[0].role, Role::User);
        assert_eq!(view.conversation.title, "New consultation");
        assert!(view.is_first_turn);
    }

    #[tokio::test]
    async fn test_resend_after_reply_failure_appends_new_message() {
        let (orch, _) = setup(
            MockCompletionClient::new()
                .reply("Ignored Title")
                .fail(CompletionError::RateLimited)
                .reply("Dog Vomiting Advice")
                .reply("Here is what to do."),
        );
        let conv = orch.create_conversation(USER).await.unwrap();
        assert!(orch.send(USER, conv.id, DOG).await.is_err());

        let outcome = orch.send(USER, conv.id, DOG).await.unwrap();
        assert_eq!(outcome.conversation.title, "Dog Vomiting Advice");

        let roles: Vec<Role> = orch
            .load(USER, conv.id)
            .await
            .unwrap()
            .messages
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_title_requested_again_after_failed_first_round() {
        let (orch, mock) = setup(
            MockCompletionClient::new()
                .reply("Ignored Title")
                .fail(CompletionError::RateLimited)
                .reply("Dog Vomiting Advice")
                .reply("Here is what to do.")
                .reply("Keep her hydrated."),
        );
        let conv = orch.create_conversation(USER).await.unwrap();
        assert!(orch.send(USER, conv.id, DOG).await.is_err());
        orch.send(USER, conv.id, "She also seems tired").await.unwrap();
        orch.send(USER, conv.id, "Thanks").await.unwrap();

        // The failed round's title is discarded, so the next round names the
        // conversation again from the same first message. After that, never.
        let title_requests: Vec<CompletionRequest> = mock
            .requests()
            .into_iter()
            .filter(is_title_request)
            .collect();
        assert_eq!(title_requests.len(), 2);
        for request in &title_requests {
            assert_eq!(request.messages[1].content, DOG);
        }
        assert_eq!(mock.call_count(), 5);

        let view = orch.load(USER, conv.id).await.unwrap();
        assert_eq!(view.conversation.title, "Dog Vomiting Advice");
        assert!(!view.is_first_turn);
    }

    // ---- Scenario 5 / P2: title is generated once ----

    #[tokio::test]
    async fn test_follow_up_send_keeps_title() {
        let (orch, mock) = setup(
            MockCompletionClient::new()
                .reply("Dog Vomiting Advice")
                .reply("First answer"),
        );
        let conv = orch.create_conversation(USER).await.unwrap();
        orch.send(USER, conv.id, DOG).await.unwrap();

        let outcome = orch
            .send(USER, conv.id, "She vomited again an hour later.")
            .await
            .unwrap();
        assert_eq!(outcome.generated_title, None);
        assert_eq!(outcome.conversation.title, "Dog Vomiting Advice");

        let title_requests = mock.requests().iter().filter(|r| is_title_request(r)).count();
        assert_eq!(title_requests, 1);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_follow_up_bumps_updated_at() {
        let (orch, _) = setup(MockCompletionClient::new());
        let conv = orch.create_conversation(USER).await.unwrap();
        let first = orch.send(USER, conv.id, DOG).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = orch.send(USER, conv.id, "Any update?").await.unwrap();
        assert!(second.conversation.updated_at > first.conversation.updated_at);
    }

    // ---- P1: ordering ----

    #[tokio::test]
    async fn test_rounds_alternate_in_call_order() {
        let (orch, _) = setup(MockCompletionClient::new());
        let conv = orch.create_conversation(USER).await.unwrap();

        let n = 4;
        for i in 0..n {
            orch.send(USER, conv.id, &format!("question {}", i)).await.unwrap();
        }

        let messages = orch.load(USER, conv.id).await.unwrap().messages;
        assert_eq!(messages.len(), 2 * n);
        for (i, pair) in messages.chunks(2).enumerate() {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[0].content, format!("question {}", i));
            assert_eq!(pair[1].role, Role::Assistant);
        }
    }

    #[tokio::test]
    async fn test_blank_reply_persists_fallback_sentence() {
        let (orch, _) = setup(MockCompletionClient::new().reply("Title").reply("   "));
        let conv = orch.create_conversation(USER).await.unwrap();
        let outcome = orch.send(USER, conv.id, DOG).await.unwrap();
        assert_eq!(outcome.assistant_message.content, FALLBACK_REPLY);
    }

    // ---- Scenario 4 / P5: auto-response exactly once ----

    #[tokio::test]
    async fn test_open_seeded_conversation_replies_once() {
        let (orch, mock) = setup(
            MockCompletionClient::new()
                .reply("Chocolate Toxicity In Cats")
                .reply("Yes, chocolate is toxic to cats."),
        );
        let seeded = orch
            .create_seeded_conversation(USER, "Is chocolate toxic to cats?")
            .await
            .unwrap();
        assert!(seeded.needs_auto_reply);
        assert_eq!(mock.call_count(), 0);

        let id = seeded.conversation.id;
        let opened = orch.open(USER, id).await.unwrap();
        let reply = opened.auto_reply.unwrap();
        assert_eq!(reply.conversation.title, "Chocolate Toxicity In Cats");
        assert_eq!(reply.user_message.content, "Is chocolate toxic to cats?");
        assert_eq!(opened.view.messages.len(), 2);
        assert!(!opened.view.needs_auto_reply);

        // Title summarized from the seeded message itself.
        assert_eq!(
            mock.requests()[0].messages[1].content,
            "Is chocolate toxic to cats?"
        );

        let reopened = orch.open(USER, id).await.unwrap();
        assert!(reopened.auto_reply.is_none());
        assert_eq!(reopened.view.messages.len(), 2);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_auto_reply_is_not_retriggered() {
        let (orch, mock) = setup(
            MockCompletionClient::new()
                .reply("Cat Chocolate")
                .fail(CompletionError::RateLimited),
        );
        let seeded = orch
            .create_seeded_conversation(USER, "Is chocolate toxic to cats?")
            .await
            .unwrap();
        let id = seeded.conversation.id;

        let err = orch.open(USER, id).await.unwrap_err();
        assert!(matches!(err, ChatError::Completion(CompletionError::RateLimited)));

        let reopened = orch.open(USER, id).await.unwrap();
        assert!(reopened.auto_reply.is_none());
        assert!(!reopened.view.needs_auto_reply);
        assert_eq!(reopened.view.messages.len(), 1);
        assert_eq!(mock.call_count(), 2);

        // The owner can still ask again by hand.
        orch.send(USER, id, "Is chocolate toxic to cats?").await.unwrap();
        assert_eq!(orch.load(USER, id).await.unwrap().messages.len(), 3);
    }

    #[tokio::test]
    async fn test_open_without_seed_does_nothing() {
        let (orch, mock) = setup(MockCompletionClient::new());
        let conv = orch.create_conversation(USER).await.unwrap();
        let opened = orch.open(USER, conv.id).await.unwrap();
        assert!(opened.auto_reply.is_none());
        assert!(opened.view.messages.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_seeded_conversation_validates_message() {
        let (orch, _) = setup(MockCompletionClient::new());
        let err = orch.create_seeded_conversation(USER, "  ").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert!(orch.list_conversations(USER).await.unwrap().is_empty());
    }

    // ---- Ownership ----

    #[tokio::test]
    async fn test_other_users_conversation_is_not_found() {
        let (orch, mock) = setup(MockCompletionClient::new());
        let conv = orch.create_conversation(USER).await.unwrap();

        assert!(matches!(
            orch.load("intruder", conv.id).await.unwrap_err(),
            ChatError::ConversationNotFound(_)
        ));
        assert!(matches!(
            orch.send("intruder", conv.id, "hello").await.unwrap_err(),
            ChatError::ConversationNotFound(_)
        ));
        assert!(matches!(
            orch.delete_conversation("intruder", conv.id).await.unwrap_err(),
            ChatError::ConversationNotFound(_)
        ));
        assert_eq!(mock.call_count(), 0);
        assert!(orch.list_conversations("intruder").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_conversation() {
        let (orch, _) = setup(MockCompletionClient::new());
        let conv = orch.create_conversation(USER).await.unwrap();
        orch.send(USER, conv.id, DOG).await.unwrap();

        orch.delete_conversation(USER, conv.id).await.unwrap();
        assert!(matches!(
            orch.load(USER, conv.id).await.unwrap_err(),
            ChatError::ConversationNotFound(_)
        ));
        assert!(orch.list_conversations(USER).await.unwrap().is_empty());
    }

    // ---- Persist failures ----

    /// Delegates to SQLite but refuses assistant messages.
    struct RejectAssistantStore {
        inner: Arc<SqliteConversationStore>,
    }

    #[async_trait]
    impl ConversationStore for RejectAssistantStore {
        async fn create_conversation(
            &self,
            user_id: &str,
            title: &str,
        ) -> Result<Conversation, PetVetError> {
            self.inner.create_conversation(user_id, title).await
        }

        async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, PetVetError> {
            self.inner.get_conversation(id).await
        }

        async fn list_conversations(
            &self,
            user_id: &str,
        ) -> Result<Vec<Conversation>, PetVetError> {
            self.inner.list_conversations(user_id).await
        }

        async fn delete_conversation(&self, id: Uuid) -> Result<bool, PetVetError> {
            self.inner.delete_conversation(id).await
        }

        async fn append(
            &self,
            conversation_id: Uuid,
            role: Role,
            content: &str,
        ) -> Result<Message, PetVetError> {
            if role == Role::Assistant {
                return Err(PetVetError::Storage("write rejected".to_string()));
            }
            self.inner.append(conversation_id, role, content).await
        }

        async fn list(&self, conversation_id: Uuid) -> Result<Vec<Message>, PetVetError> {
            self.inner.list(conversation_id).await
        }

        async fn touch_conversation(
            &self,
            conversation_id: Uuid,
            title: Option<&str>,
        ) -> Result<(), PetVetError> {
            self.inner.touch_conversation(conversation_id, title).await
        }

        async fn mark_auto_reply_attempted(
            &self,
            conversation_id: Uuid,
        ) -> Result<(), PetVetError> {
            self.inner.mark_auto_reply_attempted(conversation_id).await
        }
    }

    #[tokio::test]
    async fn test_assistant_persist_failure_keeps_user_message() {
        let inner = sqlite_store();
        let store = Arc::new(RejectAssistantStore {
            inner: inner.clone(),
        });
        let orch = orchestrator_with(store, Arc::new(MockCompletionClient::new()));
        let conv = orch.create_conversation(USER).await.unwrap();

        let err = orch.send(USER, conv.id, DOG).await.unwrap_err();
        assert!(matches!(err, ChatError::Persist(_)));

        let messages = inner.list(conv.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        let stored = inner.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "New consultation");
    }

    #[tokio::test]
    async fn test_send_to_missing_conversation() {
        let (orch, mock) = setup(MockCompletionClient::new());
        let missing = Uuid::new_v4();
        let err = orch.send(USER, missing, "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::ConversationNotFound(id) if id == missing));
        assert_eq!(mock.call_count(), 0);
    }

    // ---- Concurrency ----

    /// Blocks every completion until permits are released.
    struct GatedClient {
        entered: tokio::sync::Notify,
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl CompletionClient for GatedClient {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
            self.entered.notify_one();
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| CompletionError::Transport(e.to_string()))?;
            permit.forget();
            Ok("Gated answer".to_string())
        }
    }

    #[tokio::test]
    async fn test_second_round_on_same_conversation_is_rejected() {
        let client = Arc::new(GatedClient {
            entered: tokio::sync::Notify::new(),
            gate: tokio::sync::Semaphore::new(0),
        });
        let orch = Arc::new(orchestrator_with(sqlite_store(), client.clone()));
        let conv = orch.create_conversation(USER).await.unwrap();

        let id = conv.id;
        let running = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.send(USER, id, DOG).await })
        };
        client.entered.notified().await;

        let err = orch.send(USER, conv.id, "again").await.unwrap_err();
        assert!(matches!(err, ChatError::RoundInFlight(id) if id == conv.id));

        client.gate.add_permits(2);
        running.await.unwrap().unwrap();

        // Guard released once the round finished.
        client.gate.add_permits(1);
        orch.send(USER, conv.id, "again").await.unwrap();
        assert_eq!(orch.load(USER, conv.id).await.unwrap().messages.len(), 4);
    }

    #[tokio::test]
    async fn test_rounds_on_different_conversations_proceed() {
        let client = Arc::new(GatedClient {
            entered: tokio::sync::Notify::new(),
            gate: tokio::sync::Semaphore::new(8),
        });
        let orch = orchestrator_with(sqlite_store(), client);
        let a = orch.create_conversation(USER).await.unwrap();
        let b = orch.create_conversation(USER).await.unwrap();

        let (ra, rb) = tokio::join!(orch.send(USER, a.id, "cat"), orch.send(USER, b.id, "dog"));
        assert!(ra.is_ok());
        assert!(rb.is_ok());
    }

    #[tokio::test]
    async fn test_guard_released_after_failure() {
        let (orch, _) = setup(
            MockCompletionClient::new()
                .reply("Title")
                .fail(CompletionError::EmptyResponse),
        );
        let conv = orch.create_conversation(USER).await.unwrap();
        assert!(orch.send(USER, conv.id, DOG).await.is_err());
        assert!(orch.send(USER, conv.id, DOG).await.is_ok());
    }
}
