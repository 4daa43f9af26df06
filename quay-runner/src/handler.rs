//! Job handlers
//!
//! The seam between the orchestrator's scheduler and job execution. The
//! scheduler hands a job's action and context to a `JobHandler` and records
//! whatever outcome or error comes back.

use async_trait::async_trait;
use quay_core::domain::pipeline::{BuildSpec, DeploySpec, JobAction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::build::BuildExecutor;
use crate::context::JobContext;
use crate::error::Result;
use crate::publish::{PublishRequest, Publisher};

/// Output key for the uploaded artifact name
pub const OUTPUT_ARTIFACT: &str = "artifact";
/// Output key for the uploaded artifact digest
pub const OUTPUT_ARTIFACT_DIGEST: &str = "artifact_digest";
/// Output key for the published URL
pub const OUTPUT_PAGE_URL: &str = "page_url";

/// Outputs of a successful job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutcome {
    pub outputs: HashMap<String, String>,
}

impl JobOutcome {
    pub fn with_output(mut self, key: &str, value: impl Into<String>) -> Self {
        self.outputs.insert(key.to_string(), value.into());
        self
    }
}

/// Executes one job action
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, action: &JobAction, ctx: &JobContext) -> Result<JobOutcome>;
}

/// Runs builds with a `BuildExecutor` and deploys with a `Publisher`
pub struct StandardJobHandler {
    builder: BuildExecutor,
    publisher: Arc<dyn Publisher>,
}

impl StandardJobHandler {
    pub fn new(builder: BuildExecutor, publisher: Arc<dyn Publisher>) -> Self {
        Self { builder, publisher }
    }

    async fn build(&self, spec: &BuildSpec, ctx: &JobContext) -> Result<JobOutcome> {
        let artifact = self.builder.execute(spec, ctx).await?;
        Ok(JobOutcome::default()
            .with_output(OUTPUT_ARTIFACT, artifact.name)
            .with_output(OUTPUT_ARTIFACT_DIGEST, artifact.digest))
    }

    async fn deploy(&self, spec: &DeploySpec, ctx: &JobContext) -> Result<JobOutcome> {
        let site_dir = ctx.workspace.join(&spec.artifact);
        let artifact = ctx
            .artifacts
            .download(ctx.run_id, &spec.artifact, &site_dir)
            .await?;
        ctx.log_info(format!(
            "Downloaded artifact '{}' ({} files)",
            artifact.name, artifact.file_count
        ));

        let deployment = self
            .publisher
            .publish(PublishRequest {
                artifact: &artifact,
                site_dir: &site_dir,
                environment: &spec.environment,
                permissions: ctx.permissions,
                token: ctx.id_token.as_ref(),
            })
            .await?;

        ctx.log_info(format!("Deployed to {}", deployment.page_url));
        info!(
            "Run {}: deployed '{}' to {}",
            ctx.run_id, spec.environment, deployment.page_url
        );
        Ok(JobOutcome::default().with_output(OUTPUT_PAGE_URL, deployment.page_url))
    }
}

#[async_trait]
impl JobHandler for StandardJobHandler {
    async fn execute(&self, action: &JobAction, ctx: &JobContext) -> Result<JobOutcome> {
        match action {
            JobAction::Build(spec) => self.build(spec, ctx).await,
            JobAction::Deploy(spec) => self.deploy(spec, ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactError, ArtifactStore};
    use crate::error::RunnerError;
    use crate::publish::DirectoryPublisher;
    use crate::service::InMemoryLogBuffer;
    use crate::source::LocalSource;
    use crate::token::TokenIssuer;
    use quay_core::domain::permissions::Permissions;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn handler(dir: &Path) -> StandardJobHandler {
        let repo = dir.join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("index.md"), "# Docs").unwrap();

        StandardJobHandler::new(
            BuildExecutor::new(Arc::new(LocalSource::new(repo))),
            Arc::new(DirectoryPublisher::new(
                dir.join("pages"),
                "https://docs.example.org",
            )),
        )
    }

    fn context(
        dir: &Path,
        run_id: Uuid,
        job: &str,
        permissions: Permissions,
        store: &Arc<ArtifactStore>,
    ) -> JobContext {
        let token = TokenIssuer::default().issue(run_id, job, "github-pages", &permissions);
        JobContext::new(
            run_id,
            job,
            "main",
            dir.join("workspaces").join(job),
            permissions,
            store.clone(),
            Arc::new(InMemoryLogBuffer::new()),
        )
        .with_id_token(token)
    }

    #[tokio::test]
    async fn test_build_then_deploy() {
        let dir = tempdir().unwrap();
        let handler = handler(dir.path());
        let store = Arc::new(ArtifactStore::new(dir.path().join("store")));
        let run_id = Uuid::new_v4();

        let build = JobAction::Build(BuildSpec {
            install_command: None,
            build_command: "mkdir -p site && cp index.md site/index.html".to_string(),
            output_dir: "site".to_string(),
            artifact: "github-pages".to_string(),
        });
        let deploy = JobAction::Deploy(DeploySpec {
            artifact: "github-pages".to_string(),
            environment: "github-pages".to_string(),
        });

        let built = handler
            .execute(
                &build,
                &context(dir.path(), run_id, "build", Permissions::read_contents(), &store),
            )
            .await
            .unwrap();
        assert_eq!(built.outputs[OUTPUT_ARTIFACT], "github-pages");

        let deployed = handler
            .execute(
                &deploy,
                &context(dir.path(), run_id, "deploy", Permissions::pages_deploy(), &store),
            )
            .await
            .unwrap();
        assert_eq!(deployed.outputs[OUTPUT_PAGE_URL], "https://docs.example.org/");
        assert!(dir.path().join("pages/live/index.html").is_file());
    }

    #[tokio::test]
    async fn test_deploy_without_artifact_fails() {
        let dir = tempdir().unwrap();
        let handler = handler(dir.path());
        let store = Arc::new(ArtifactStore::new(dir.path().join("store")));

        let deploy = JobAction::Deploy(DeploySpec {
            artifact: "github-pages".to_string(),
            environment: "github-pages".to_string(),
        });
        let err = handler
            .execute(
                &deploy,
                &context(
                    dir.path(),
                    Uuid::new_v4(),
                    "deploy",
                    Permissions::pages_deploy(),
                    &store,
                ),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunnerError::Artifact(ArtifactError::NotFound { .. })
        ));
        assert!(!dir.path().join("pages/live").exists());
    }
}
