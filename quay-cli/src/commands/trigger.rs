//! Trigger command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use quay_client::OrchestratorClient;
use quay_core::domain::run::RunStatus;
use quay_core::dto::event::TriggerResponse;
use std::time::Duration;

use crate::commands::run::print_run_details;
use crate::config::Config;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Trigger subcommands
#[derive(Subcommand)]
pub enum TriggerCommands {
    /// Report a push to a branch
    Push {
        /// Branch name, with or without the refs/heads/ prefix
        branch: String,

        /// Commit to build instead of the branch head
        #[arg(long)]
        commit: Option<String>,

        /// Wait for the run to finish
        #[arg(short, long)]
        wait: bool,
    },
    /// Start a run on the deployment branch
    Dispatch {
        /// Wait for the run to finish
        #[arg(short, long)]
        wait: bool,
    },
}

pub async fn handle_trigger_command(command: TriggerCommands, config: &Config) -> Result<()> {
    let client = config.client();

    let (response, wait) = match command {
        TriggerCommands::Push {
            branch,
            commit,
            wait,
        } => (client.push(&branch, commit.as_deref()).await?, wait),
        TriggerCommands::Dispatch { wait } => (client.dispatch().await?, wait),
    };

    report(&client, response, wait).await
}

async fn report(client: &OrchestratorClient, response: TriggerResponse, wait: bool) -> Result<()> {
    let Some(run_id) = response.run_id else {
        println!(
            "{} {}",
            "No run started:".yellow(),
            response.reason.unwrap_or_default()
        );
        return Ok(());
    };

    println!("{} Run {}", "✓".green(), run_id.to_string().cyan());
    if !wait {
        return Ok(());
    }

    let run = loop {
        let run = client.get_run(run_id).await?;
        if run.status.is_terminal() {
            break run;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    println!();
    print_run_details(&run);
    if run.status != RunStatus::Succeeded {
        anyhow::bail!("run {} finished {}", run_id, run.status);
    }
    Ok(())
}
