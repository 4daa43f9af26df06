//! Job dependency scheduler
//!
//! Drives the jobs of one run through its dependency graph. A job starts once
//! every predecessor has succeeded, so independent jobs run side by side. A
//! job with a failed, skipped or cancelled predecessor is skipped, and the
//! skip cascades to its own successors.
//!
//! Each job runs in its own task and workspace (`<base>/<run_id>/<job>`).
//! Completions come back over a channel; cancellation aborts whatever is
//! still in flight.

use quay_core::JobGraph;
use quay_core::domain::job::JobStatus;
use quay_core::domain::log::LogLevel;
use quay_core::domain::pipeline::{JobAction, JobSpec, PipelineDefinition};
use quay_core::domain::run::{Run, RunStatus, TransitionError};
use quay_runner::handler::OUTPUT_PAGE_URL;
use quay_runner::{ArtifactStore, JobContext, JobHandler, JobOutcome, RunnerError, TokenIssuer};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::repository::{LogRepository, RunRepository};
use crate::service::log::RunLogWriter;

/// Token audience for jobs that do not target an environment
const DEFAULT_AUDIENCE: &str = "quay";

type Completion = (String, Result<Result<JobOutcome, RunnerError>, JoinError>);

/// How a run's jobs ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub page_url: Option<String>,
}

pub struct JobScheduler {
    handler: Arc<dyn JobHandler>,
    artifacts: Arc<ArtifactStore>,
    tokens: TokenIssuer,
    workspace_base: PathBuf,
    runs: RunRepository,
    logs: LogRepository,
}

impl JobScheduler {
    pub fn new(
        handler: Arc<dyn JobHandler>,
        artifacts: Arc<ArtifactStore>,
        tokens: TokenIssuer,
        workspace_base: impl Into<PathBuf>,
        runs: RunRepository,
        logs: LogRepository,
    ) -> Self {
        Self {
            handler,
            artifacts,
            tokens,
            workspace_base: workspace_base.into(),
            runs,
            logs,
        }
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    /// Runs the jobs of `run_id` until all are terminal or `cancelled` resolves
    ///
    /// `cancelled` yields the reason recorded on the jobs it interrupts. Job
    /// transitions are written to the run repository as they happen; the run
    /// itself is left for the caller to finish.
    pub async fn execute<C>(
        &self,
        run_id: Uuid,
        git_ref: &str,
        pipeline: &PipelineDefinition,
        graph: &JobGraph,
        cancelled: C,
    ) -> RunOutcome
    where
        C: Future<Output = String>,
    {
        let log = RunLogWriter::new(run_id, self.logs.clone());
        let mut statuses: HashMap<String, JobStatus> = graph
            .jobs()
            .iter()
            .map(|j| (j.name.clone(), JobStatus::Pending))
            .collect();
        let mut in_flight: HashMap<String, AbortHandle> = HashMap::new();
        let mut failures: Vec<String> = Vec::new();
        let mut page_url = None;
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        tokio::pin!(cancelled);

        let cancel_reason = loop {
            self.skip_blocked(run_id, graph, &mut statuses, &log);

            let ready: Vec<String> = graph
                .ready(&statuses)
                .into_iter()
                .map(String::from)
                .collect();
            for name in ready {
                let Some(spec) = graph.get(&name) else {
                    continue;
                };
                statuses.insert(name.clone(), JobStatus::Running);
                self.record(run_id, |r| r.start_job(&name));
                log.run_event(LogLevel::Info, format!("Job '{}' started", name));
                debug!("Run {}: starting job '{}'", run_id, name);

                let handle = self.spawn_job(run_id, git_ref, pipeline, spec, &log, done_tx.clone());
                in_flight.insert(name, handle);
            }

            if in_flight.is_empty() {
                break None;
            }

            tokio::select! {
                Some((name, joined)) = done_rx.recv() => {
                    in_flight.remove(&name);
                    let (status, outputs, error) = match joined {
                        Ok(Ok(outcome)) => (JobStatus::Succeeded, outcome.outputs, None),
                        Ok(Err(e)) => (JobStatus::Failed, HashMap::new(), Some(e.to_string())),
                        Err(e) => (
                            JobStatus::Failed,
                            HashMap::new(),
                            Some(format!("job task ended abnormally: {}", e)),
                        ),
                    };

                    match &error {
                        None => {
                            info!("Run {}: job '{}' succeeded", run_id, name);
                            log.run_event(LogLevel::Info, format!("Job '{}' succeeded", name));
                        }
                        Some(message) => {
                            warn!("Run {}: job '{}' failed: {}", run_id, name, message);
                            log.run_event(
                                LogLevel::Error,
                                format!("Job '{}' failed: {}", name, message),
                            );
                            failures.push(format!("job '{}' failed: {}", name, message));
                        }
                    }
                    if let Some(url) = outputs.get(OUTPUT_PAGE_URL) {
                        page_url = Some(url.clone());
                    }

                    statuses.insert(name.clone(), status);
                    self.record(run_id, |r| r.complete_job(&name, status, outputs, error));
                }
                reason = &mut cancelled => break Some(reason),
            }
        };

        if let Some(reason) = &cancel_reason {
            for (name, handle) in in_flight.drain() {
                handle.abort();
                info!("Run {}: cancelled job '{}'", run_id, name);
                log.run_event(LogLevel::Warning, format!("Job '{}' cancelled: {}", name, reason));
                self.record(run_id, |r| {
                    r.complete_job(&name, JobStatus::Cancelled, HashMap::new(), Some(reason.clone()))
                });
            }
        }

        let run_dir = self.workspace_base.join(run_id.to_string());
        if let Err(e) = tokio::fs::remove_dir_all(&run_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove workspaces of run {}: {}", run_id, e);
            }
        }

        match cancel_reason {
            Some(reason) => RunOutcome {
                status: RunStatus::Cancelled,
                error_message: Some(reason),
                page_url,
            },
            None if failures.is_empty() => RunOutcome {
                status: RunStatus::Succeeded,
                error_message: None,
                page_url,
            },
            None => RunOutcome {
                status: RunStatus::Failed,
                error_message: Some(failures.join("; ")),
                page_url,
            },
        }
    }

    /// Skips blocked jobs until no pending job has an unsuccessful predecessor
    fn skip_blocked(
        &self,
        run_id: Uuid,
        graph: &JobGraph,
        statuses: &mut HashMap<String, JobStatus>,
        log: &RunLogWriter,
    ) {
        loop {
            let blocked: Vec<String> = graph
                .blocked(statuses)
                .into_iter()
                .map(String::from)
                .collect();
            if blocked.is_empty() {
                return;
            }
            for name in blocked {
                statuses.insert(name.clone(), JobStatus::Skipped);
                self.record(run_id, |r| r.skip_job(&name));
                info!("Run {}: skipping job '{}'", run_id, name);
                log.run_event(
                    LogLevel::Warning,
                    format!("Job '{}' skipped: a dependency did not succeed", name),
                );
            }
        }
    }

    fn spawn_job(
        &self,
        run_id: Uuid,
        git_ref: &str,
        pipeline: &PipelineDefinition,
        spec: &JobSpec,
        log: &RunLogWriter,
        done: mpsc::UnboundedSender<Completion>,
    ) -> AbortHandle {
        let permissions = pipeline.permissions_for(spec);
        let audience = match &spec.action {
            JobAction::Deploy(deploy) => deploy.environment.as_str(),
            JobAction::Build(_) => DEFAULT_AUDIENCE,
        };
        let token = self.tokens.issue(run_id, &spec.name, audience, &permissions);

        let ctx = JobContext::new(
            run_id,
            spec.name.clone(),
            git_ref,
            self.workspace_base
                .join(run_id.to_string())
                .join(&spec.name),
            permissions,
            Arc::clone(&self.artifacts),
            Arc::new(log.clone()),
        )
        .with_id_token(token);

        let task = tokio::spawn(run_job(
            Arc::clone(&self.handler),
            spec.action.clone(),
            ctx,
        ));
        let abort = task.abort_handle();

        let name = spec.name.clone();
        tokio::spawn(async move {
            let _ = done.send((name, task.await));
        });
        abort
    }

    fn record<T>(&self, run_id: Uuid, change: impl FnOnce(&mut Run) -> Result<T, TransitionError>) {
        if let Err(e) = self.runs.update(run_id, change) {
            warn!("Run {}: job transition not recorded: {}", run_id, e);
        }
    }
}

async fn run_job(
    handler: Arc<dyn JobHandler>,
    action: JobAction,
    ctx: JobContext,
) -> Result<JobOutcome, RunnerError> {
    tokio::fs::create_dir_all(&ctx.workspace).await?;
    if let Some(token) = &ctx.id_token {
        ctx.log_debug(format!(
            "Identity token issued for '{}' (expires {})",
            token.audience, token.expires_at
        ));
    }

    let result = handler.execute(&action, &ctx).await;

    if let Err(e) = tokio::fs::remove_dir_all(&ctx.workspace).await {
        debug!("Workspace {:?} not removed: {}", ctx.workspace, e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quay_core::domain::permissions::Permissions;
    use quay_core::domain::pipeline::{BuildSpec, DeploySpec};
    use quay_core::domain::trigger::TriggerEvent;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::sync::Barrier;

    #[derive(Clone)]
    enum Behaviour {
        Succeed,
        Fail,
        Hang,
        Rendezvous(Arc<Barrier>),
    }

    #[derive(Default)]
    struct ScriptedHandler {
        script: HashMap<String, Behaviour>,
        started: Mutex<Vec<String>>,
        tokens: Mutex<HashMap<String, bool>>,
    }

    impl ScriptedHandler {
        fn with(mut self, job: &str, behaviour: Behaviour) -> Self {
            self.script.insert(job.to_string(), behaviour);
            self
        }

        fn started(&self) -> Vec<String> {
            self.started.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn execute(&self, _action: &JobAction, ctx: &JobContext) -> quay_runner::Result<JobOutcome> {
            self.started.lock().unwrap().push(ctx.job.clone());
            self.tokens
                .lock()
                .unwrap()
                .insert(ctx.job.clone(), ctx.id_token.is_some());
            assert!(ctx.workspace.is_dir());

            match self.script.get(&ctx.job).cloned().unwrap_or(Behaviour::Succeed) {
                Behaviour::Succeed => {}
                Behaviour::Fail => {
                    return Err(RunnerError::StepFailed {
                        step: "build".to_string(),
                        status: "exit code 1".to_string(),
                    });
                }
                Behaviour::Hang => std::future::pending::<()>().await,
                Behaviour::Rendezvous(barrier) => {
                    barrier.wait().await;
                }
            }

            let outcome = JobOutcome::default();
            Ok(if ctx.job == "deploy" {
                outcome.with_output(OUTPUT_PAGE_URL, "https://docs.example.org/")
            } else {
                outcome
            })
        }
    }

    fn build(name: &str) -> JobSpec {
        JobSpec::new(
            name,
            JobAction::Build(BuildSpec {
                artifact: format!("{}-out", name),
                ..BuildSpec::default()
            }),
        )
    }

    fn diamond() -> PipelineDefinition {
        PipelineDefinition {
            name: "diamond".to_string(),
            permissions: Permissions::read_contents(),
            concurrency: None,
            jobs: vec![
                build("a"),
                build("b").needs("a"),
                build("c").needs("a"),
                build("d").needs("b").needs("c"),
            ],
        }
    }

    struct Harness {
        scheduler: JobScheduler,
        runs: RunRepository,
        workspaces: PathBuf,
        _dir: tempfile::TempDir,
    }

    fn harness(handler: Arc<ScriptedHandler>) -> Harness {
        let dir = tempdir().unwrap();
        let runs = RunRepository::new();
        let workspaces = dir.path().join("workspaces");
        let scheduler = JobScheduler::new(
            handler,
            Arc::new(ArtifactStore::new(dir.path().join("artifacts"))),
            TokenIssuer::default(),
            &workspaces,
            runs.clone(),
            LogRepository::new(),
        );
        Harness {
            scheduler,
            runs,
            workspaces,
            _dir: dir,
        }
    }

    async fn execute(
        h: &Harness,
        pipeline: &PipelineDefinition,
        cancelled: impl Future<Output = String>,
    ) -> (RunOutcome, Run) {
        let graph = JobGraph::new(pipeline.jobs.clone()).unwrap();
        let mut run = Run::new(
            pipeline.name.clone(),
            TriggerEvent::Manual,
            "main",
            None,
            pipeline.job_records(),
        );
        run.start().unwrap();
        let id = run.id;
        h.runs.insert(run);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            h.scheduler.execute(id, "main", pipeline, &graph, cancelled),
        )
        .await
        .unwrap();
        (outcome, h.runs.find_by_id(id).unwrap())
    }

    #[tokio::test]
    async fn test_independent_jobs_run_in_parallel() {
        let barrier = Arc::new(Barrier::new(2));
        let handler = Arc::new(
            ScriptedHandler::default()
                .with("b", Behaviour::Rendezvous(barrier.clone()))
                .with("c", Behaviour::Rendezvous(barrier)),
        );
        let h = harness(handler.clone());

        let (outcome, run) = execute(&h, &diamond(), std::future::pending()).await;

        assert_eq!(outcome.status, RunStatus::Succeeded);
        let started = handler.started();
        assert_eq!(started.first().map(String::as_str), Some("a"));
        assert_eq!(started.last().map(String::as_str), Some("d"));
        assert!(run.jobs.iter().all(|j| j.status == JobStatus::Succeeded));
        assert!(!h.workspaces.join(run.id.to_string()).exists());
    }

    #[tokio::test]
    async fn test_failure_skips_descendants() {
        let handler = Arc::new(ScriptedHandler::default().with("a", Behaviour::Fail));
        let h = harness(handler.clone());

        let (outcome, run) = execute(&h, &diamond(), std::future::pending()).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.error_message.unwrap().contains("job 'a' failed"));
        assert_eq!(handler.started(), vec!["a".to_string()]);
        assert_eq!(run.job("a").unwrap().status, JobStatus::Failed);
        for name in ["b", "c", "d"] {
            assert_eq!(run.job(name).unwrap().status, JobStatus::Skipped);
        }
    }

    #[tokio::test]
    async fn test_failure_in_one_branch_still_runs_the_other() {
        let handler = Arc::new(ScriptedHandler::default().with("b", Behaviour::Fail));
        let h = harness(handler.clone());

        let (outcome, run) = execute(&h, &diamond(), std::future::pending()).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(run.job("c").unwrap().status, JobStatus::Succeeded);
        assert_eq!(run.job("d").unwrap().status, JobStatus::Skipped);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_running_jobs() {
        let handler = Arc::new(ScriptedHandler::default().with("a", Behaviour::Hang));
        let h = harness(handler);

        let cancelled = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            "cancelled by request".to_string()
        };
        let (outcome, run) = execute(&h, &diamond(), cancelled).await;

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.error_message.as_deref(), Some("cancelled by request"));
        assert_eq!(run.job("a").unwrap().status, JobStatus::Cancelled);
        assert_eq!(run.job("b").unwrap().status, JobStatus::Pending);
        assert!(!h.workspaces.join(run.id.to_string()).exists());
    }

    #[tokio::test]
    async fn test_tokens_follow_job_grants() {
        let handler = Arc::new(ScriptedHandler::default());
        let h = harness(handler.clone());
        let pipeline = PipelineDefinition::pages("pages", BuildSpec::default(), None);
        assert!(matches!(pipeline.jobs[1].action, JobAction::Deploy(DeploySpec { .. })));

        let (outcome, _) = execute(&h, &pipeline, std::future::pending()).await;

        assert_eq!(outcome.status, RunStatus::Succeeded);
        assert_eq!(outcome.page_url.as_deref(), Some("https://docs.example.org/"));
        let tokens = handler.tokens.lock().unwrap();
        assert_eq!(tokens.get("build"), Some(&false));
        assert_eq!(tokens.get("deploy"), Some(&true));
    }
}
