//! Pipeline domain types
//!
//! A pipeline definition describes the jobs of a run, how they depend on each
//! other, what they are allowed to do and which concurrency group they share.

use serde::{Deserialize, Serialize};

use crate::domain::job::JobRecord;
use crate::domain::permissions::Permissions;

/// Pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    /// Default grant for jobs that do not declare their own
    pub permissions: Permissions,
    pub concurrency: Option<ConcurrencyPolicy>,
    pub jobs: Vec<JobSpec>,
}

/// Serialization domain shared by runs of the same pipeline target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyPolicy {
    pub group: String,
    /// Supersede the in-flight run instead of queueing behind it
    pub cancel_in_progress: bool,
}

/// A named unit of work within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    /// Jobs that must succeed before this one starts
    #[serde(default)]
    pub needs: Vec<String>,
    /// Overrides the pipeline-level grant
    #[serde(default)]
    pub permissions: Option<Permissions>,
    pub action: JobAction,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, action: JobAction) -> Self {
        Self {
            name: name.into(),
            needs: Vec::new(),
            permissions: None,
            action,
        }
    }

    pub fn needs(mut self, job: impl Into<String>) -> Self {
        self.needs.push(job.into());
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = Some(permissions);
        self
    }
}

/// What a job does when it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobAction {
    Build(BuildSpec),
    Deploy(DeploySpec),
}

impl JobAction {
    /// Artifact uploaded by this action, if any
    pub fn produces(&self) -> Option<&str> {
        match self {
            JobAction::Build(spec) => Some(&spec.artifact),
            JobAction::Deploy(_) => None,
        }
    }

    /// Artifact downloaded by this action, if any
    pub fn consumes(&self) -> Option<&str> {
        match self {
            JobAction::Build(_) => None,
            JobAction::Deploy(spec) => Some(&spec.artifact),
        }
    }
}

/// Site generation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Toolchain/dependency installation, run once before the build
    pub install_command: Option<String>,
    pub build_command: String,
    /// Directory the generator writes, relative to the checkout
    pub output_dir: String,
    /// Name the output is uploaded under
    pub artifact: String,
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self {
            install_command: Some("pip install mkdocs mkdocs-material".to_string()),
            build_command: "mkdocs build".to_string(),
            output_dir: "site".to_string(),
            artifact: "github-pages".to_string(),
        }
    }
}

/// Publish settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySpec {
    pub artifact: String,
    /// Hosting environment name
    pub environment: String,
}

impl PipelineDefinition {
    /// The two-job pages pipeline: `build` uploads the site, `deploy` publishes it
    pub fn pages(
        name: impl Into<String>,
        build: BuildSpec,
        concurrency: Option<ConcurrencyPolicy>,
    ) -> Self {
        let deploy = DeploySpec {
            artifact: build.artifact.clone(),
            environment: "github-pages".to_string(),
        };

        Self {
            name: name.into(),
            permissions: Permissions::pages_deploy(),
            concurrency,
            jobs: vec![
                JobSpec::new("build", JobAction::Build(build))
                    .with_permissions(Permissions::read_contents()),
                JobSpec::new("deploy", JobAction::Deploy(deploy))
                    .needs("build")
                    .with_permissions(Permissions::pages_deploy()),
            ],
        }
    }

    /// Effective grant for a job
    pub fn permissions_for(&self, job: &JobSpec) -> Permissions {
        job.permissions.unwrap_or(self.permissions)
    }

    /// Fresh pending records for a new run, in declaration order
    pub fn job_records(&self) -> Vec<JobRecord> {
        self.jobs
            .iter()
            .map(|j| JobRecord::new(j.name.clone(), j.needs.clone(), self.permissions_for(j)))
            .collect()
    }
}
