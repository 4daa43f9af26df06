//! Build executor
//!
//! Runs the static-site generator against a clean checkout and uploads the
//! output directory as the run's artifact. Fail-fast: the first failing step
//! ends the job, and nothing is uploaded unless the output directory exists.

use quay_core::domain::artifact::Artifact;
use quay_core::domain::pipeline::BuildSpec;
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::JobContext;
use crate::error::{Result, RunnerError};
use crate::process::run_shell;
use crate::source::SourceProvider;

const CHECKOUT_DIR: &str = "source";

pub struct BuildExecutor {
    source: Arc<dyn SourceProvider>,
}

impl BuildExecutor {
    pub fn new(source: Arc<dyn SourceProvider>) -> Self {
        Self { source }
    }

    pub async fn execute(&self, spec: &BuildSpec, ctx: &JobContext) -> Result<Artifact> {
        let checkout = ctx.workspace.join(CHECKOUT_DIR);
        self.source.checkout(&checkout, ctx).await?;

        if let Some(install) = &spec.install_command {
            run_shell("install", install, &checkout, ctx).await?;
        }
        run_shell("build", &spec.build_command, &checkout, ctx).await?;

        let output = checkout.join(&spec.output_dir);
        let produced = tokio::fs::metadata(&output)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !produced {
            warn!(
                "Run {}: build produced no '{}' directory",
                ctx.run_id, spec.output_dir
            );
            ctx.log_error(format!(
                "Output directory '{}' does not exist after build",
                spec.output_dir
            ));
            return Err(RunnerError::MissingOutput(spec.output_dir.clone()));
        }

        let artifact = ctx
            .artifacts
            .upload(ctx.run_id, &spec.artifact, &ctx.job, &output)
            .await?;

        ctx.log_info(format!(
            "Uploaded artifact '{}' ({} files, sha256 {})",
            artifact.name, artifact.file_count, artifact.digest
        ));
        info!(
            "Run {}: built '{}' from {}",
            ctx.run_id, artifact.name, ctx.git_ref
        );
        Ok(artifact)
    }
}
