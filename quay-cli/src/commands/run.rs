//! Run command handlers
//!
//! Listing, details, logs and cancellation of runs.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use quay_core::domain::job::{JobRecord, JobStatus};
use quay_core::domain::log::{LogEntry, LogLevel};
use quay_core::domain::run::{Run, RunStatus};
use quay_core::dto::run::RunSummary;

use crate::config::Config;
use crate::id_resolver::resolve_run_id;
use crate::types::IdOrPrefix;

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// List all runs
    List,
    /// Get run details
    Get {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Get run logs
    Logs {
        /// Run ID or unambiguous prefix
        id: String,

        /// Only show entries from this job
        #[arg(long)]
        job: Option<String>,
    },
    /// Cancel a queued or running run
    Cancel {
        /// Run ID or unambiguous prefix
        id: String,
    },
}

pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        RunCommands::List => {
            let runs = client.list_runs().await?;
            if runs.is_empty() {
                println!("{}", "No runs found.".yellow());
            } else {
                println!("{}", format!("Found {} run(s):", runs.len()).bold());
                println!();
                for run in &runs {
                    print_run_summary(run);
                }
            }
        }
        RunCommands::Get { id } => {
            let uuid = resolve_run_id(&client, &IdOrPrefix::parse(&id)).await?;
            print_run_details(&client.get_run(uuid).await?);
        }
        RunCommands::Logs { id, job } => {
            let uuid = resolve_run_id(&client, &IdOrPrefix::parse(&id)).await?;
            let logs: Vec<LogEntry> = client
                .get_run_logs(uuid)
                .await?
                .into_iter()
                .filter(|l| job.as_deref().is_none_or(|j| l.source == j))
                .collect();

            if logs.is_empty() {
                println!("{}", "No logs found for this run.".yellow());
            } else {
                println!("{}", format!("Logs for run {}:", uuid).bold());
                println!("{}", "─".repeat(80).dimmed());
                for log in &logs {
                    print_log_entry(log);
                }
                println!("{}", "─".repeat(80).dimmed());
            }
        }
        RunCommands::Cancel { id } => {
            let uuid = resolve_run_id(&client, &IdOrPrefix::parse(&id)).await?;
            let run = client.cancel_run(uuid).await?;
            println!(
                "{} Cancellation requested for run {} (was {})",
                "✓".green(),
                run.id.to_string().cyan(),
                colorize_run_status(run.status)
            );
        }
    }

    Ok(())
}

fn print_run_summary(run: &RunSummary) {
    println!("  {} Run {}", "▸".cyan(), run.id.to_string().dimmed());
    println!("    Trigger:  {} ({})", run.trigger, run.git_ref);
    println!("    Status:   {}", colorize_run_status(run.status));
    println!(
        "    Created:  {}",
        run.requested_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(url) = &run.page_url {
        println!("    URL:      {}", url.green());
    }
    println!();
}

pub fn print_run_details(run: &Run) {
    println!("{}", "Run Details:".bold());
    println!("  ID:          {}", run.id.to_string().cyan());
    println!("  Pipeline:    {}", run.pipeline);
    println!("  Trigger:     {}", run.trigger);
    println!("  Ref:         {}", run.git_ref);
    if let Some(group) = &run.concurrency_group {
        println!("  Group:       {}", group.dimmed());
    }
    println!("  Status:      {}", colorize_run_status(run.status));
    println!(
        "  Requested:   {}",
        run.requested_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(started) = run.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(completed) = run.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = run.started_at {
            let seconds = completed.signed_duration_since(started).num_seconds();
            println!("  Duration:    {}s", seconds);
        }
    }
    if let Some(url) = &run.page_url {
        println!("  URL:         {}", url.green());
    }

    println!("\n{}", "Jobs:".bold());
    for job in &run.jobs {
        print_job(job);
    }

    if let Some(error) = &run.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

fn print_job(job: &JobRecord) {
    let needs = if job.needs.is_empty() {
        String::new()
    } else {
        format!(" (needs {})", job.needs.join(", "))
    };
    println!(
        "  {} {}{}  {}",
        "▸".cyan(),
        job.name,
        needs.dimmed(),
        colorize_job_status(job.status)
    );
    println!("      permissions: {}", job.permissions.to_string().dimmed());
    for (key, value) in &job.outputs {
        println!("      {} = {}", key.cyan(), value);
    }
    if let Some(error) = &job.error_message {
        println!("      {}", error.red());
    }
}

fn print_log_entry(log: &LogEntry) {
    let level_str = log.level.to_string();
    let level_colored = match log.level {
        LogLevel::Debug => level_str.dimmed(),
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    println!(
        "{} [{}] {} {}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        format!("{}:", log.source).bold(),
        log.message
    );
}

fn colorize_run_status(status: RunStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        RunStatus::Queued => status_str.yellow(),
        RunStatus::Running => status_str.cyan(),
        RunStatus::Succeeded => status_str.green(),
        RunStatus::Failed => status_str.red(),
        RunStatus::Cancelled => status_str.dimmed(),
    }
}

fn colorize_job_status(status: JobStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::Pending => status_str.yellow(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Succeeded => status_str.green(),
        JobStatus::Failed => status_str.red(),
        JobStatus::Skipped | JobStatus::Cancelled => status_str.dimmed(),
    }
}
