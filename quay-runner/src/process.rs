//! Step process execution
//!
//! Runs build steps as child processes inside the job workspace and forwards
//! their output to the job log. A step either exits zero or fails the job.

use quay_core::domain::log::LogLevel;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use crate::context::JobContext;
use crate::error::{Result, RunnerError};

/// Runs `command` through `sh -c` in `cwd`
pub async fn run_shell(step: &str, command: &str, cwd: &Path, ctx: &JobContext) -> Result<()> {
    ctx.log_info(format!("[{}] $ {}", step, command));
    run_command(step, "sh", &["-c", command], cwd, ctx).await
}

/// Runs `program` with `args` in `cwd`
///
/// The child is killed if the job is cancelled while the step is running.
pub async fn run_command(
    step: &str,
    program: &str,
    args: &[&str],
    cwd: &Path,
    ctx: &JobContext,
) -> Result<()> {
    debug!("Executing step '{}': {} {:?}", step, program, args);

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env("QUAY_RUN_ID", ctx.run_id.to_string())
        .env("QUAY_JOB", &ctx.job)
        .env("QUAY_GIT_REF", &ctx.git_ref)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| RunnerError::Spawn {
            step: step.to_string(),
            source,
        })?;

    forward_output(ctx, &output);

    if !output.status.success() {
        let status = match output.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "termination by signal".to_string(),
        };
        ctx.log_error(format!("[{}] failed with {}", step, status));
        return Err(RunnerError::StepFailed {
            step: step.to_string(),
            status,
        });
    }

    Ok(())
}

fn forward_output(ctx: &JobContext, output: &Output) {
    log_lines(ctx, &output.stdout, LogLevel::Info);
    log_lines(ctx, &output.stderr, LogLevel::Warning);
}

fn log_lines(ctx: &JobContext, bytes: &[u8], level: LogLevel) {
    let text = String::from_utf8_lossy(bytes);
    for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
        ctx.log(level, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactStore;
    use crate::service::InMemoryLogBuffer;
    use quay_core::domain::permissions::Permissions;
    use std::sync::Arc;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn context(dir: &Path, logs: &InMemoryLogBuffer) -> JobContext {
        JobContext::new(
            Uuid::new_v4(),
            "build",
            "main",
            dir.to_path_buf(),
            Permissions::read_contents(),
            Arc::new(ArtifactStore::new(dir.join("artifacts"))),
            Arc::new(logs.clone()),
        )
    }

    #[tokio::test]
    async fn test_successful_step_logs_output() {
        let dir = tempdir().unwrap();
        let logs = InMemoryLogBuffer::new();
        let ctx = context(dir.path(), &logs);

        run_shell("greet", "echo hello from step", dir.path(), &ctx)
            .await
            .unwrap();

        assert!(logs.contains("hello from step"));
    }

    #[tokio::test]
    async fn test_failing_step_reports_exit_code() {
        let dir = tempdir().unwrap();
        let logs = InMemoryLogBuffer::new();
        let ctx = context(dir.path(), &logs);

        let err = run_shell("install", "exit 3", dir.path(), &ctx)
            .await
            .unwrap_err();

        match err {
            RunnerError::StepFailed { step, status } => {
                assert_eq!(step, "install");
                assert_eq!(status, "exit code 3");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_step_sees_run_environment() {
        let dir = tempdir().unwrap();
        let logs = InMemoryLogBuffer::new();
        let ctx = context(dir.path(), &logs);

        run_shell("env", "echo ref=$QUAY_GIT_REF", dir.path(), &ctx)
            .await
            .unwrap();

        assert!(logs.contains("ref=main"));
    }
}
