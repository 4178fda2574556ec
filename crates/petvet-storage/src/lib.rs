//! PetVet storage crate - the message store adapter.
//!
//! Defines the `ConversationStore` contract consumed by the orchestrator and a
//! WAL-mode SQLite implementation with versioned migrations.

pub mod db;
pub mod migrations;
pub mod repository;
pub mod store;

pub use db::Database;
pub use repository::SqliteConversationStore;
pub use store::ConversationStore;
