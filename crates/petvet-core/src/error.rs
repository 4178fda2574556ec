use thiserror::Error;

/// Top-level error type shared by the PetVet crates.
///
/// Subsystem crates define their own error types and implement
/// `From<PetVetError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PetVetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(uuid::Uuid),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for PetVetError {
    fn from(err: toml::de::Error) -> Self {
        PetVetError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PetVetError {
    fn from(err: toml::ser::Error) -> Self {
        PetVetError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PetVetError {
    fn from(err: serde_json::Error) -> Self {
        PetVetError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for PetVet operations.
pub type Result<T> = std::result::Result<T, PetVetError>;
