//! Argument parsing and terminal screens for the `startgate` binary.

mod commands;
mod terminal;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{ConfigCommand, LaunchCommand, ResetCommand, StatusCommand};
pub use terminal::TerminalScreens;

/// startgate - First-launch gate for the application shell
///
/// Shows onboarding on the first launch and the home screen on every launch
/// after onboarding was completed.
#[derive(Debug, Parser)]
#[command(name = "startgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the application shell in the terminal
    Launch(LaunchCommand),

    /// Show the first-run flag and the resolved start route
    Status(StatusCommand),

    /// Mark onboarding as completed without showing it
    Complete,

    /// Clear stored preferences so the next launch is a first run
    Reset(ResetCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Logging verbosity; `--quiet` wins over any number of `-v`.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        match (self.quiet, self.verbose) {
            (true, _) => Verbosity::Quiet,
            (false, 0) => Verbosity::Normal,
            (false, 1) => Verbosity::Verbose,
            (false, _) => Verbosity::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli_with(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "startgate");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(cli_with(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli_with(3, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli_with(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli_with(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli_with(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_launch() {
        let cli = Cli::try_parse_from(["startgate", "launch", "--yes"]).unwrap();
        assert!(matches!(cli.command, Command::Launch(LaunchCommand { yes: true })));
    }

    #[test]
    fn test_parse_status_json() {
        let cli = Cli::try_parse_from(["startgate", "status", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Status(StatusCommand { json: true })));
    }

    #[test]
    fn test_parse_complete() {
        let cli = Cli::try_parse_from(["startgate", "complete"]).unwrap();
        assert!(matches!(cli.command, Command::Complete));
    }

    #[test]
    fn test_parse_reset_requires_nothing() {
        let cli = Cli::try_parse_from(["startgate", "reset"]).unwrap();
        assert!(matches!(cli.command, Command::Reset(ResetCommand { yes: false })));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = Cli::try_parse_from(["startgate", "config", "validate", "/tmp/c.toml"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config_and_verbose() {
        let cli = Cli::try_parse_from(["startgate", "-c", "/custom/config.toml", "-vv", "status"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_unknown_command_fails() {
        assert!(Cli::try_parse_from(["startgate", "daemon"]).is_err());
    }
}
