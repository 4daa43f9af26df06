//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod run;
mod trigger;

pub use run::RunCommands;
pub use trigger::TriggerCommands;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Deliver trigger events
    Trigger {
        #[command(subcommand)]
        command: TriggerCommands,
    },
    /// Inspect and cancel runs
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Check that the orchestrator is reachable
    Health,
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Trigger { command } => trigger::handle_trigger_command(command, config).await,
        Commands::Run { command } => run::handle_run_command(command, config).await,
        Commands::Health => {
            config
                .client()
                .health_check()
                .await
                .with_context(|| format!("Orchestrator at {} is not healthy", config.orchestrator_url))?;
            println!("{} {}", "✓".green(), config.orchestrator_url);
            Ok(())
        }
    }
}
