//! Route handler functions for all API endpoints.
//!
//! Each handler extracts the caller and path/body parameters, delegates to the
//! orchestrator and returns JSON.

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use petvet_chat::{ConversationView, OpenOutcome, RoundOutcome};
use petvet_core::types::Conversation;

use crate::auth::UserId;
use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateConversationRequest {
    /// Seeds the conversation with a first user message, answered on open.
    pub initial_message: Option<String>,
}

impl CreateConversationRequest {
    /// Parse a create body. An empty body is the same as `{}`.
    pub fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

// =============================================================================
// Handler functions
// =============================================================================

/// GET /health - liveness check, no auth.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /conversations - the caller's conversations, most recent first.
pub async fn list_conversations(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let conversations = state.orchestrator.list_conversations(&user_id).await?;
    Ok(Json(ConversationsResponse { conversations }))
}

/// POST /conversations - create an empty or seeded conversation.
///
/// The body is optional, so it is read raw rather than through `Json`.
pub async fn create_conversation(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<ConversationView>), ApiError> {
    let body = CreateConversationRequest::from_body(&body?)?;
    let view = match body.initial_message {
        Some(message) => {
            state
                .orchestrator
                .create_seeded_conversation(&user_id, &message)
                .await?
        }
        None => {
            let conversation = state.orchestrator.create_conversation(&user_id).await?;
            state.orchestrator.load(&user_id, conversation.id).await?
        }
    };
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /conversations/{id} - conversation and messages, no side effects.
pub async fn get_conversation(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ConversationView>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.orchestrator.load(&user_id, id).await?))
}

/// DELETE /conversations/{id}
pub async fn delete_conversation(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    state.orchestrator.delete_conversation(&user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /conversations/{id}/open - load, auto-replying to a seeded message once.
pub async fn open_conversation(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<OpenOutcome>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.orchestrator.open(&user_id, id).await?))
}

/// POST /conversations/{id}/messages - run one send round.
pub async fn send_message(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<RoundOutcome>, ApiError> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(
        state.orchestrator.send(&user_id, id, &body.content).await?,
    ))
}
