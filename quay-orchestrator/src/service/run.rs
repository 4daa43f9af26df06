//! Run Service
//!
//! Turns trigger events into runs and carries each run through its lifecycle:
//! join the concurrency group, execute the job graph, record the outcome,
//! discard the run's artifacts, release the group.

use quay_core::domain::log::{LogEntry, LogLevel};
use quay_core::domain::pipeline::PipelineDefinition;
use quay_core::domain::run::{Run, RunStatus};
use quay_core::domain::trigger::{StartDecision, TriggerEvent, TriggerResolver};
use quay_core::dto::event::TriggerResponse;
use quay_core::{GraphError, JobGraph};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::concurrency::{ConcurrencyGroups, GroupError, Ticket};
use crate::repository::{LogRepository, RepositoryError, RunRepository};
use crate::scheduler::JobScheduler;
use crate::service::log::{RunLogWriter, get_run_logs};

/// Service error type
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct RunService {
    pipeline: PipelineDefinition,
    graph: JobGraph,
    resolver: TriggerResolver,
    groups: ConcurrencyGroups,
    scheduler: JobScheduler,
    runs: RunRepository,
    logs: LogRepository,
    cancels: Mutex<HashMap<Uuid, watch::Sender<bool>>>,
}

impl RunService {
    /// Validates the pipeline's job graph up front
    pub fn new(
        pipeline: PipelineDefinition,
        resolver: TriggerResolver,
        scheduler: JobScheduler,
        runs: RunRepository,
        logs: LogRepository,
    ) -> Result<Arc<Self>, GraphError> {
        let graph = JobGraph::new(pipeline.jobs.clone())?;
        info!(
            "Pipeline '{}' loaded: {} job(s) in order {:?}",
            pipeline.name,
            graph.len(),
            graph.topological_order()
        );

        Ok(Arc::new(Self {
            pipeline,
            graph,
            resolver,
            groups: ConcurrencyGroups::new(),
            scheduler,
            runs,
            logs,
            cancels: Mutex::new(HashMap::new()),
        }))
    }

    pub fn pipeline(&self) -> &PipelineDefinition {
        &self.pipeline
    }

    pub fn groups(&self) -> &ConcurrencyGroups {
        &self.groups
    }

    /// Resolves an event and, if it qualifies, starts a run in the background
    ///
    /// The run takes its place in the concurrency group before this returns,
    /// so runs queue in the order their events arrived.
    pub fn handle_event(self: &Arc<Self>, event: TriggerEvent) -> TriggerResponse {
        let git_ref = match self.resolver.resolve(&event) {
            StartDecision::Start { git_ref } => git_ref,
            StartDecision::Reject { reason } => {
                info!("Ignoring {}: {}", event, reason);
                return TriggerResponse::rejected(reason);
            }
        };

        let policy = self.pipeline.concurrency.clone();
        let run = Run::new(
            self.pipeline.name.clone(),
            event,
            git_ref,
            policy.as_ref().map(|p| p.group.clone()),
            self.pipeline.job_records(),
        );
        let run_id = run.id;
        info!("Run {} requested by {} at {}", run_id, run.trigger, run.git_ref);

        let log = RunLogWriter::new(run_id, self.logs.clone());
        log.run_event(
            LogLevel::Info,
            format!("Run requested by {} ({})", run.trigger, run.git_ref),
        );
        self.runs.insert(run);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.lock_cancels().insert(run_id, cancel_tx);

        let ticket = policy.map(|p| {
            let ticket = self.groups.enqueue(&p.group, run_id, p.cancel_in_progress);
            if !ticket.is_ready() {
                log.run_event(
                    LogLevel::Info,
                    format!("Waiting for concurrency group '{}'", p.group),
                );
            }
            ticket
        });

        tokio::spawn(Arc::clone(self).drive(run_id, ticket, cancel_rx));
        TriggerResponse::started(run_id)
    }

    async fn drive(self: Arc<Self>, run_id: Uuid, ticket: Option<Ticket>, mut cancel: watch::Receiver<bool>) {
        let log = RunLogWriter::new(run_id, self.logs.clone());

        let permit = match ticket {
            None => None,
            Some(ticket) => {
                let group = ticket.group().to_string();
                tokio::select! {
                    granted = ticket.wait() => match granted {
                        Ok(permit) => Some(permit),
                        Err(e) => {
                            let reason = match &e {
                                GroupError::Superseded { by, .. } => format!("superseded by run {}", by),
                                GroupError::Closed(_) => e.to_string(),
                            };
                            self.close(run_id, RunStatus::Cancelled, Some(reason), None, &log).await;
                            return;
                        }
                    },
                    _ = cancelled(&mut cancel) => {
                        self.close(
                            run_id,
                            RunStatus::Cancelled,
                            Some(format!("cancelled while waiting for group '{}'", group)),
                            None,
                            &log,
                        )
                        .await;
                        return;
                    }
                }
            }
        };

        if let Err(e) = self.runs.update(run_id, |r| r.start()) {
            error!("Run {} could not start: {}", run_id, e);
            self.close(run_id, RunStatus::Failed, Some(e.to_string()), None, &log).await;
            return;
        }
        let Some(run) = self.runs.find_by_id(run_id) else {
            return;
        };
        info!("Run {} started", run_id);
        log.run_event(LogLevel::Info, "Run started");

        let mut superseded = permit.as_ref().map(|p| p.cancellation());
        let stop = async {
            tokio::select! {
                _ = cancelled(&mut cancel) => "cancelled by request".to_string(),
                _ = superseded_signal(superseded.as_mut()) => {
                    "cancelled by a newer run in the same concurrency group".to_string()
                }
            }
        };

        let outcome = self
            .scheduler
            .execute(run_id, &run.git_ref, &self.pipeline, &self.graph, stop)
            .await;

        self.close(run_id, outcome.status, outcome.error_message, outcome.page_url, &log)
            .await;

        // Released only after the run is terminal, so the next run in the group
        // never overlaps this one.
        drop(permit);
    }

    /// Records the final status and drops everything the run owned
    async fn close(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
        page_url: Option<String>,
        log: &RunLogWriter,
    ) {
        let finished = self.runs.update(run_id, |r| {
            r.finish(status, error_message.clone())?;
            r.page_url = page_url.clone();
            Ok(())
        });
        if let Err(e) = finished {
            warn!("Run {} could not be finished: {}", run_id, e);
        }

        match &error_message {
            Some(message) => {
                info!("Run {} finished {}: {}", run_id, status, message);
                log.run_event(LogLevel::Info, format!("Run {}: {}", status, message));
            }
            None => {
                info!("Run {} finished {}", run_id, status);
                log.run_event(LogLevel::Info, format!("Run {}", status));
            }
        }
        if let Some(url) = &page_url {
            log.run_event(LogLevel::Info, format!("Published at {}", url));
        }

        self.scheduler.artifacts().discard_run(run_id).await;
        self.lock_cancels().remove(&run_id);
    }

    /// Get a run by ID
    pub fn get_run(&self, id: Uuid) -> Result<Run, RunError> {
        self.runs.find_by_id(id).ok_or(RunError::NotFound(id))
    }

    /// List all runs, newest first
    pub fn list_runs(&self) -> Vec<Run> {
        self.runs.list_all()
    }

    /// Requests cancellation of a queued or running run
    pub fn cancel_run(&self, id: Uuid) -> Result<Run, RunError> {
        let run = self.get_run(id)?;
        if run.status.is_terminal() {
            return Err(RunError::InvalidState(format!(
                "run {} is already {}",
                id, run.status
            )));
        }

        match self.lock_cancels().get(&id) {
            Some(cancel) => {
                cancel.send_replace(true);
                info!("Cancellation requested for run {}", id);
            }
            None => {
                return Err(RunError::InvalidState(format!(
                    "run {} is finishing and can no longer be cancelled",
                    id
                )));
            }
        }
        Ok(run)
    }

    /// Log entries for a run
    pub fn get_run_logs(&self, id: Uuid) -> Result<Vec<LogEntry>, RunError> {
        self.get_run(id)?;
        Ok(get_run_logs(&self.logs, id))
    }

    /// Waits until the run reaches a terminal status
    pub async fn wait_for_completion(&self, id: Uuid) -> Result<Run, RunError> {
        self.runs
            .wait_until(id, |r| r.status.is_terminal())
            .await
            .ok_or(RunError::NotFound(id))
    }

    fn lock_cancels(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, watch::Sender<bool>>> {
        self.cancels.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Resolves once the flag is raised; never if its sender is gone
async fn cancelled(flag: &mut watch::Receiver<bool>) {
    let closed = flag.wait_for(|raised| *raised).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

async fn superseded_signal(flag: Option<&mut watch::Receiver<bool>>) {
    match flag {
        Some(flag) => cancelled(flag).await,
        None => std::future::pending::<()>().await,
    }
}
