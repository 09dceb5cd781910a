//! Subcommand arguments.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Launch command arguments.
#[derive(Debug, Args)]
pub struct LaunchCommand {
    /// Accept "Get Started" without prompting
    #[arg(short, long)]
    pub yes: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Reset command arguments.
#[derive(Debug, Args)]
pub struct ResetCommand {
    /// Confirm clearing all stored preferences
    #[arg(short, long)]
    pub yes: bool,
}

/// Configuration management commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        file: Option<PathBuf>,
    },
}
