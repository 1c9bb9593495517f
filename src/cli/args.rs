//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use kore_config::UiMode;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum UiModeArg {
    Cli,
    Tui,
    Gui,
}

impl From<UiModeArg> for UiMode {
    fn from(value: UiModeArg) -> Self {
        match value {
            UiModeArg::Cli => UiMode::Cli,
            UiModeArg::Tui => UiMode::Tui,
            UiModeArg::Gui => UiMode::Gui,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "kore", version, about = "An AI coding-assistant runtime")]
pub struct Cli {
    /// Path to a project-level kore.jsonc config file. Overrides the
    /// defaults -> user-home -> project layering's project layer.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Raise the tracing filter to `debug`.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Interface to drive the agent loop through.
    #[arg(long, global = true, value_enum)]
    pub ui: Option<UiModeArg>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message through the agent loop and print the transcript.
    Chat {
        /// The message to send. Reads from stdin if omitted.
        msg: Option<String>,
    },
    /// Print version and resolved directory information.
    Version,
    /// Bind and run the session RPC server (unary session calls, the
    /// `SendMessage` WebSocket, and the command/event SSE streams).
    Serve,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_with_an_inline_message_parses() {
        let cli = Cli::parse_from(["kore", "chat", "do the thing"]);
        match cli.command {
            Some(Commands::Chat { msg }) => assert_eq!(msg.as_deref(), Some("do the thing")),
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn chat_without_a_message_parses_with_none() {
        let cli = Cli::parse_from(["kore", "chat"]);
        match cli.command {
            Some(Commands::Chat { msg }) => assert!(msg.is_none()),
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_parses_to_none() {
        let cli = Cli::parse_from(["kore"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn global_flags_parse_before_the_subcommand() {
        let cli = Cli::parse_from(["kore", "--verbose", "--ui", "tui", "serve"]);
        assert!(cli.verbose);
        assert!(matches!(cli.ui, Some(UiModeArg::Tui)));
        assert!(matches!(cli.command, Some(Commands::Serve)));
    }

    #[test]
    fn config_flag_accepts_a_path() {
        let cli = Cli::parse_from(["kore", "--config", "/tmp/kore.jsonc", "version"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/kore.jsonc")));
    }

    #[test]
    fn ui_mode_arg_maps_to_ui_mode() {
        assert_eq!(UiMode::from(UiModeArg::Cli), UiMode::Cli);
        assert_eq!(UiMode::from(UiModeArg::Tui), UiMode::Tui);
        assert_eq!(UiMode::from(UiModeArg::Gui), UiMode::Gui);
    }
}
