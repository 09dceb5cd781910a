//! `startgate` - CLI for the first-launch gate
//!
//! This binary runs the application shell in the terminal and exposes the
//! persisted first-run state for inspection and maintenance.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;

use startgate::cli::{Cli, Command, ConfigCommand, TerminalScreens};
use startgate::store::FlagStore;
use startgate::{init_logging, Config, PreferencesStore, Route, Shell};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Launch(cmd) => handle_launch(&config, cmd.yes).await,
        Command::Status(cmd) => handle_status(&config, cmd.json).await,
        Command::Complete => handle_complete(&config).await,
        Command::Reset(cmd) => handle_reset(&config, cmd.yes).await,
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn handle_launch(config: &Config, yes: bool) -> anyhow::Result<()> {
    let shell = Shell::from_config(config);
    let mut screens = TerminalScreens::stdio(yes);
    let ended = shell.run(&mut screens).await.context("running the shell")?;
    tracing::debug!(%ended, "session ended");
    Ok(())
}

async fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = PreferencesStore::open(config.preferences_path());
    let is_first_run = store.get().await;
    let start = Route::from_first_run(is_first_run);
    let updated = store.last_updated().await.ok().flatten();

    if json {
        let status = serde_json::json!({
            "is_first_run": is_first_run,
            "start_destination": start,
            "preferences_path": config.preferences_path(),
            "updated_at": updated,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("startgate status");
        println!("----------------");
        println!("First run:     {is_first_run}");
        println!("Starts on:     {start}");
        println!("Preferences:   {}", config.preferences_path().display());
        match updated {
            Some(at) => println!("Last updated:  {}", at.to_rfc3339()),
            None => println!("Last updated:  never"),
        }
    }
    Ok(())
}

async fn handle_complete(config: &Config) -> anyhow::Result<()> {
    let store = PreferencesStore::open(config.preferences_path());
    store
        .set(false)
        .await
        .context("recording onboarding completion")?;
    println!("Onboarding marked as completed.");
    Ok(())
}

async fn handle_reset(config: &Config, yes: bool) -> anyhow::Result<()> {
    if !yes {
        println!("This will clear all stored preferences; the next launch shows onboarding.");
        println!("Use --yes to confirm.");
        return Ok(());
    }

    let store = PreferencesStore::open(config.preferences_path());
    let removed = store.clear().await.context("clearing preferences")?;
    println!("Cleared {removed} stored preference(s).");
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Preferences]");
                println!("  Store name:         {}", config.preferences.store_name);
                println!(
                    "  Preferences file:   {}",
                    config.preferences_path().display()
                );
                println!();
                println!("[Resolver]");
                println!(
                    "  Grace period (ms):  {}",
                    config.resolver.grace_period_ms
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
