//! PetVet API crate - axum HTTP surface over the conversation orchestrator.
//!
//! Exposes conversation listing, creation, opening (with the one-time
//! auto-response) and send rounds behind bearer-token auth, plus a public
//! health check.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
