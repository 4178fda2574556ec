//! PetVet application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite conversation store
//! 4. Build the completion client (OpenAI-compatible, or offline)
//! 5. Run the requested command: the API server or a one-shot conversation action

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use petvet_api::auth::load_or_generate_token;
use petvet_api::routes;
use petvet_api::state::AppState;
use petvet_chat::{
    CompletionClient, ConversationOrchestrator, ConversationView, OfflineCompletionClient,
    OpenAiCompletionClient, RoundOutcome,
};
use petvet_core::config::PetVetConfig;
use petvet_core::types::Conversation;
use petvet_storage::{ConversationStore, Database, SqliteConversationStore};

use crate::cli::{CliArgs, Command};

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn build_completion_client(config: &PetVetConfig, offline: bool) -> Arc<dyn CompletionClient> {
    if offline {
        tracing::info!("Offline mode: completion endpoint disabled");
        return Arc::new(OfflineCompletionClient::new());
    }

    let api_key = config.completion.resolve_api_key();
    if api_key.is_none() {
        tracing::warn!(
            env = %config.completion.api_key_env,
            "No completion API key configured; replies will fail until one is set"
        );
    }
    tracing::info!(
        base_url = %config.completion.base_url,
        model = %config.completion.model,
        "Completion client ready"
    );
    Arc::new(OpenAiCompletionClient::new(
        config.completion.base_url.clone(),
        api_key,
    ))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_conversation_line(conversation: &Conversation) {
    println!(
        "{}  {}  {}",
        conversation.id,
        conversation.updated_at.format("%Y-%m-%d %H:%M"),
        conversation.title
    );
}

fn print_view(view: &ConversationView) {
    println!("# {} ({})", view.conversation.title, view.conversation.id);
    for message in &view.messages {
        println!("\n{}: {}", message.role.label(), message.content);
    }
}

fn print_round(outcome: &RoundOutcome) {
    if let Some(ref title) = outcome.generated_title {
        println!("# {}", title);
    }
    println!("{}", outcome.assistant_message.content);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config (CLI overrides applied before tracing picks the level).
    let config_file = args.resolve_config_path();
    let mut config = PetVetConfig::load_or_default(&config_file);
    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }
    config.general.port = args.resolve_port(config.general.port);

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting PetVet v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("petvet.db");
    let db = Arc::new(Database::new(&db_path)?);
    let store: Arc<dyn ConversationStore> = Arc::new(SqliteConversationStore::new(db));
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    // Orchestrator.
    let client = build_completion_client(&config, args.offline);
    let orchestrator =
        ConversationOrchestrator::new(store, client, &config.completion, config.chat.clone());
    let user = args.resolve_user();

    match args.command {
        Command::Serve { .. } => {
            let token = load_or_generate_token(&data_dir.join("api_token"));
            let state = AppState::new(config.clone(), orchestrator, token);
            if let Err(e) = routes::start_server(&config, state).await {
                tracing::error!(port = config.general.port, error = %e, "API server stopped");
                tracing::error!("Try: PETVET_PORT={} petvet serve", config.general.port.saturating_add(1));
                return Err(e.into());
            }
        }
        Command::New { message } => {
            let view = match message {
                Some(message) => orchestrator.create_seeded_conversation(&user, &message).await?,
                None => {
                    let conversation = orchestrator.create_conversation(&user).await?;
                    orchestrator.load(&user, conversation.id).await?
                }
            };
            if args.json {
                print_json(&view)?;
            } else {
                println!("{}", view.conversation.id);
            }
        }
        Command::List => {
            let conversations = orchestrator.list_conversations(&user).await?;
            if args.json {
                print_json(&conversations)?;
            } else {
                conversations.iter().for_each(print_conversation_line);
            }
        }
        Command::Open { id } => {
            let outcome = orchestrator.open(&user, id).await?;
            if args.json {
                print_json(&outcome)?;
            } else {
                print_view(&outcome.view);
            }
        }
        Command::Send { id, text } => {
            let outcome = orchestrator.send(&user, id, &text).await?;
            if args.json {
                print_json(&outcome)?;
            } else {
                print_round(&outcome);
            }
        }
        Command::History { id } => {
            let view = orchestrator.load(&user, id).await?;
            if args.json {
                print_json(&view)?;
            } else {
                print_view(&view);
            }
        }
        Command::Delete { id } => {
            orchestrator.delete_conversation(&user, id).await?;
            if args.json {
                print_json(&serde_json::json!({ "deleted": id }))?;
            } else {
                println!("Deleted {}", id);
            }
        }
    }

    Ok(())
}
