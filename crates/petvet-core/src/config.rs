use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PetVetError, Result};

/// Persona given to the completion model ahead of every conversation history.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are PetVet, an empathetic virtual veterinary assistant. \
Answer questions about the health, care, nutrition and behaviour of pets clearly and kindly. \
You are not a replacement for an in-person veterinarian: when symptoms sound serious or urgent, \
tell the owner to contact a vet or an emergency clinic. \
Politely decline any request that is not related to pet care.";

/// Top-level configuration for the PetVet service.
///
/// Loaded from `~/.petvet/config.toml` by default. Every section falls back to
/// its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PetVetConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl PetVetConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PetVetConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing or
    /// cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PetVetError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the SQLite database and the API token.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP API port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.petvet/data".to_string(),
            log_level: "info".to_string(),
            port: 3030,
        }
    }
}

/// How a conversation history is handed to the completion endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// Native role-tagged message list.
    #[default]
    Structured,
    /// A single text blob of `ROLE: content` turns separated by blank lines.
    Flattened,
}

/// Sampling options for one kind of completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptionsConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Completion collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible API, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Explicit API key. Takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    pub model: String,
    pub prompt_mode: PromptMode,
    /// Options for title summarization.
    pub title: CompletionOptionsConfig,
    /// Options for assistant replies.
    pub reply: CompletionOptionsConfig,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            prompt_mode: PromptMode::Structured,
            title: CompletionOptionsConfig {
                temperature: 0.3,
                max_output_tokens: 20,
            },
            reply: CompletionOptionsConfig {
                temperature: 0.7,
                max_output_tokens: 500,
            },
        }
    }
}

impl CompletionConfig {
    /// Resolve the API key: explicit value first, then the configured env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }
}

/// Conversation flow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Title given to a conversation until its first round is answered.
    pub placeholder_title: String,
    /// Characters of the first message kept when title summarization fails.
    pub title_fallback_chars: usize,
    /// Maximum user message length in characters.
    pub max_message_length: usize,
    /// Persona prepended to every reply request.
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            placeholder_title: "New consultation".to_string(),
            title_fallback_chars: 40,
            max_message_length: 2000,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Requests per minute allowed on routes that call the completion endpoint.
    pub completion_requests_per_minute: u64,
    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            completion_requests_per_minute: 30,
            max_body_bytes: 64 * 1024,
        }
    }
}
