//! Execution context for a single job
//!
//! Contains all state a job needs while it runs:
//! - Run and job identity, and the git ref being built
//! - An isolated workspace directory
//! - The job's effective permissions and identity token, if one was issued
//! - The run-scoped artifact store
//! - A log sink for user-visible output

use quay_core::domain::log::{LogEntry, LogLevel};
use quay_core::domain::permissions::Permissions;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::service::LogSink;
use crate::token::IdentityToken;

/// Execution context handed to a job handler
pub struct JobContext {
    pub run_id: Uuid,
    pub job: String,
    pub git_ref: String,
    /// Private to this job; nothing else reads or writes it
    pub workspace: PathBuf,
    pub permissions: Permissions,
    pub id_token: Option<IdentityToken>,
    pub artifacts: Arc<ArtifactStore>,
    log: Arc<dyn LogSink>,
}

impl JobContext {
    /// Creates a new job context
    pub fn new(
        run_id: Uuid,
        job: impl Into<String>,
        git_ref: impl Into<String>,
        workspace: PathBuf,
        permissions: Permissions,
        artifacts: Arc<ArtifactStore>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            run_id,
            job: job.into(),
            git_ref: git_ref.into(),
            workspace,
            permissions,
            id_token: None,
            artifacts,
            log,
        }
    }

    pub fn with_id_token(mut self, token: Option<IdentityToken>) -> Self {
        self.id_token = token;
        self
    }

    /// Adds a log entry attributed to this job
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log
            .add_entry(LogEntry::new(level, self.job.as_str(), message));
    }

    pub fn log_debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn log_info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn log_warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn log_error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}
