//! Run domain types
//!
//! A run is one end-to-end execution of a pipeline triggered by a single event.
//! Status changes go through the transition methods here so terminal runs stay
//! immutable regardless of which service touches them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::job::{JobRecord, JobStatus};
use crate::domain::trigger::TriggerEvent;

/// Run execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Waiting for its concurrency group
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("run {id} is already {status} and cannot change")]
    RunTerminal { id: Uuid, status: RunStatus },

    #[error("run cannot move from {from} to {to}")]
    InvalidRun { from: RunStatus, to: RunStatus },

    #[error("job '{job}' cannot move from {from} to {to}")]
    InvalidJob {
        job: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("run has no job named '{0}'")]
    UnknownJob(String),
}

/// Pipeline run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub pipeline: String,
    pub trigger: TriggerEvent,
    /// Branch or commit the run builds
    pub git_ref: String,
    pub concurrency_group: Option<String>,
    pub status: RunStatus,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub jobs: Vec<JobRecord>,
    /// Public URL reported by the deploy job
    pub page_url: Option<String>,
    pub error_message: Option<String>,
}

impl Run {
    pub fn new(
        pipeline: impl Into<String>,
        trigger: TriggerEvent,
        git_ref: impl Into<String>,
        concurrency_group: Option<String>,
        jobs: Vec<JobRecord>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            trigger,
            git_ref: git_ref.into(),
            concurrency_group,
            status: RunStatus::Queued,
            requested_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            jobs,
            page_url: None,
            error_message: None,
        }
    }

    pub fn job(&self, name: &str) -> Option<&JobRecord> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Current status of every job, keyed by name
    pub fn job_statuses(&self) -> HashMap<String, JobStatus> {
        self.jobs
            .iter()
            .map(|j| (j.name.clone(), j.status))
            .collect()
    }

    /// Queued -> Running, once the concurrency group slot is held
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.ensure_open()?;
        if self.status != RunStatus::Queued {
            return Err(TransitionError::InvalidRun {
                from: self.status,
                to: RunStatus::Running,
            });
        }
        self.status = RunStatus::Running;
        self.started_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// Moves the run to a terminal status. Jobs that never reached a terminal
    /// status are closed out as cancelled (if running) or skipped (if pending).
    pub fn finish(
        &mut self,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        if !status.is_terminal() {
            return Err(TransitionError::InvalidRun {
                from: self.status,
                to: status,
            });
        }

        let now = chrono::Utc::now();
        for job in self.jobs.iter_mut().filter(|j| !j.status.is_terminal()) {
            job.status = match job.status {
                JobStatus::Running => JobStatus::Cancelled,
                _ => JobStatus::Skipped,
            };
            job.completed_at = Some(now);
        }

        self.status = status;
        self.completed_at = Some(now);
        self.error_message = error_message;
        Ok(())
    }

    /// Pending -> Running for a single job
    pub fn start_job(&mut self, name: &str) -> Result<(), TransitionError> {
        self.ensure_open()?;
        let job = self.job_mut(name)?;
        if job.status != JobStatus::Pending {
            return Err(TransitionError::InvalidJob {
                job: name.to_string(),
                from: job.status,
                to: JobStatus::Running,
            });
        }
        job.status = JobStatus::Running;
        job.started_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// Running -> Succeeded/Failed/Cancelled for a single job
    pub fn complete_job(
        &mut self,
        name: &str,
        status: JobStatus,
        outputs: HashMap<String, String>,
        error_message: Option<String>,
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        let job = self.job_mut(name)?;
        let valid = job.status == JobStatus::Running
            && matches!(
                status,
                JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
            );
        if !valid {
            return Err(TransitionError::InvalidJob {
                job: name.to_string(),
                from: job.status,
                to: status,
            });
        }
        job.status = status;
        job.completed_at = Some(chrono::Utc::now());
        job.outputs = outputs;
        job.error_message = error_message;
        Ok(())
    }

    /// Pending -> Skipped for a job whose predecessors did not all succeed
    pub fn skip_job(&mut self, name: &str) -> Result<(), TransitionError> {
        self.ensure_open()?;
        let job = self.job_mut(name)?;
        if job.status != JobStatus::Pending {
            return Err(TransitionError::InvalidJob {
                job: name.to_string(),
                from: job.status,
                to: JobStatus::Skipped,
            });
        }
        job.status = JobStatus::Skipped;
        job.completed_at = Some(chrono::Utc::now());
        Ok(())
    }

    fn job_mut(&mut self, name: &str) -> Result<&mut JobRecord, TransitionError> {
        self.jobs
            .iter_mut()
            .find(|j| j.name == name)
            .ok_or_else(|| TransitionError::UnknownJob(name.to_string()))
    }

    fn ensure_open(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::RunTerminal {
                id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::permissions::Permissions;

    fn sample_run() -> Run {
        Run::new(
            "pages",
            TriggerEvent::push("main"),
            "main",
            Some("pages".to_string()),
            vec![
                JobRecord::new("build", vec![], Permissions::read_contents()),
                JobRecord::new(
                    "deploy",
                    vec!["build".to_string()],
                    Permissions::pages_deploy(),
                ),
            ],
        )
    }

    #[test]
    fn test_new_run_is_queued() {
        let run = sample_run();
        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.started_at.is_none());
        assert!(run.jobs.iter().all(|j| j.status == JobStatus::Pending));
    }

    #[test]
    fn test_terminal_run_is_immutable() {
        let mut run = sample_run();
        run.start().unwrap();
        run.finish(RunStatus::Succeeded, None).unwrap();

        let err = run.finish(RunStatus::Failed, None).unwrap_err();
        assert!(matches!(err, TransitionError::RunTerminal { .. }));
        assert!(run.start_job("deploy").is_err());
        assert_eq!(run.status, RunStatus::Succeeded);
    }

    #[test]
    fn test_cannot_start_twice() {
        let mut run = sample_run();
        run.start().unwrap();
        assert!(matches!(
            run.start(),
            Err(TransitionError::InvalidRun { .. })
        ));
    }

    #[test]
    fn test_job_lifecycle() {
        let mut run = sample_run();
        run.start().unwrap();
        run.start_job("build").unwrap();

        let mut outputs = HashMap::new();
        outputs.insert("artifact".to_string(), "github-pages".to_string());
        run.complete_job("build", JobStatus::Succeeded, outputs, None)
            .unwrap();

        let build = run.job("build").unwrap();
        assert_eq!(build.status, JobStatus::Succeeded);
        assert_eq!(build.outputs["artifact"], "github-pages");
        assert!(build.completed_at.is_some());
    }

    #[test]
    fn test_complete_requires_running_job() {
        let mut run = sample_run();
        run.start().unwrap();
        let err = run
            .complete_job("deploy", JobStatus::Succeeded, HashMap::new(), None)
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidJob { .. }));
    }

    #[test]
    fn test_finish_closes_open_jobs() {
        let mut run = sample_run();
        run.start().unwrap();
        run.start_job("build").unwrap();
        run.finish(RunStatus::Cancelled, Some("superseded".to_string()))
            .unwrap();

        assert_eq!(run.job("build").unwrap().status, JobStatus::Cancelled);
        assert_eq!(run.job("deploy").unwrap().status, JobStatus::Skipped);
        assert_eq!(run.error_message.as_deref(), Some("superseded"));
    }

    #[test]
    fn test_unknown_job() {
        let mut run = sample_run();
        run.start().unwrap();
        assert_eq!(
            run.start_job("lint"),
            Err(TransitionError::UnknownJob("lint".to_string()))
        );
    }
}
