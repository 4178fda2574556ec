//! CLI argument definitions for the PetVet application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// PetVet: a virtual veterinary assistant service.
#[derive(Parser, Debug)]
#[command(name = "petvet", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite database and API token.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Answer with a canned offline client instead of the completion endpoint.
    #[arg(long = "offline", global = true)]
    pub offline: bool,

    /// User on whose behalf local commands run.
    #[arg(short = 'u', long = "user", global = true)]
    pub user: Option<String>,

    /// Print command results as JSON.
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP API server.
    Serve {
        /// API server port.
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,
    },
    /// Create a conversation, optionally seeded with a first question.
    New {
        #[arg(long = "message")]
        message: Option<String>,
    },
    /// List conversations, most recent first.
    List,
    /// Open a conversation, answering a seeded question if needed.
    Open { id: Uuid },
    /// Send a message and wait for the reply.
    Send { id: Uuid, text: String },
    /// Print a conversation's messages without side effects.
    History { id: Uuid },
    /// Delete a conversation and its messages.
    Delete { id: Uuid },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PETVET_CONFIG env var > ~/.petvet/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PETVET_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > PETVET_PORT env var > config file value > 3030.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Command::Serve { port: Some(p) } = self.command {
            return p;
        }
        if let Ok(val) = std::env::var("PETVET_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        if config_port != 0 {
            return config_port;
        }
        3030
    }

    /// Resolve the data directory override (--data-dir flag), if any.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level override (--log-level flag), if any.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }

    /// Resolve the acting user.
    ///
    /// Priority: --user flag > PETVET_USER env var > "local".
    pub fn resolve_user(&self) -> String {
        if let Some(ref u) = self.user {
            return u.clone();
        }
        std::env::var("PETVET_USER")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "local".to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".petvet").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".petvet").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_serve_with_port() {
        let args = parse(&["petvet", "serve", "-p", "8088"]);
        assert_eq!(args.command, Command::Serve { port: Some(8088) });
        assert_eq!(args.resolve_port(3030), 8088);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["petvet", "list", "--offline", "-u", "alice", "-l", "debug"]);
        assert!(args.offline);
        assert_eq!(args.resolve_user(), "alice");
        assert_eq!(args.resolve_log_level().as_deref(), Some("debug"));
    }

    #[test]
    fn test_send_parses_uuid_and_text() {
        let id = Uuid::new_v4();
        let args = parse(&["petvet", "send", &id.to_string(), "My cat sneezes a lot"]);
        assert_eq!(
            args.command,
            Command::Send {
                id,
                text: "My cat sneezes a lot".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_uuid_rejected() {
        assert!(CliArgs::try_parse_from(["petvet", "open", "not-a-uuid"]).is_err());
    }

    #[test]
    fn test_new_with_seed_message() {
        let args = parse(&["petvet", "new", "--message", "Is chocolate toxic to cats?"]);
        assert_eq!(
            args.command,
            Command::New {
                message: Some("Is chocolate toxic to cats?".to_string())
            }
        );
    }

    #[test]
    fn test_config_and_data_dir_flags() {
        let args = parse(&["petvet", "-c", "/tmp/petvet.toml", "-d", "/srv/petvet", "list"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/petvet.toml"));
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/srv/petvet"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(CliArgs::try_parse_from(["petvet"]).is_err());
    }
}
