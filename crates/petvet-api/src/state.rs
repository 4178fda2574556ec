//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use petvet_chat::ConversationOrchestrator;
use petvet_core::config::PetVetConfig;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PetVetConfig>,
    pub orchestrator: Arc<ConversationOrchestrator>,
    /// Bearer token required on protected routes.
    pub api_token: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: PetVetConfig,
        orchestrator: ConversationOrchestrator,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            api_token: api_token.into(),
            start_time: Instant::now(),
        }
    }
}
