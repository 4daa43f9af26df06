//! Orchestrator configuration
//!
//! Defines the pipeline being served, where its source comes from, and where
//! workspaces, artifacts and the published site live on disk.

use quay_core::domain::pipeline::{BuildSpec, ConcurrencyPolicy, PipelineDefinition};
use std::path::{Component, Path, PathBuf};

/// Where builds get their source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    /// Local directory copied as-is into each build workspace
    Local(PathBuf),
    /// Repository cloned per build, then checked out at the run's ref
    Git(String),
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API listens on (e.g., "0.0.0.0:8080")
    pub bind_addr: String,

    pub pipeline_name: String,

    /// Only pushes to this branch start a run
    pub deploy_branch: String,

    /// Concurrency group shared by all runs; `None` lets runs overlap
    pub concurrency_group: Option<String>,

    /// Whether a new run cancels the one holding the group
    pub cancel_in_progress: bool,

    pub source: SourceConfig,

    /// Dependency installation, run once before the build
    pub install_command: Option<String>,

    /// Static-site generator invocation
    pub build_command: String,

    /// Directory the generator writes, relative to the checkout
    pub output_dir: String,

    pub artifact_name: String,

    pub workspace_base: PathBuf,
    pub artifact_root: PathBuf,
    pub publish_root: PathBuf,

    /// Public URL of the published site
    pub pages_base_url: String,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(source: SourceConfig) -> Self {
        let build = BuildSpec::default();
        let state = std::env::temp_dir().join("quay");
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            pipeline_name: "pages".to_string(),
            deploy_branch: "main".to_string(),
            concurrency_group: Some("pages".to_string()),
            cancel_in_progress: false,
            source,
            install_command: build.install_command,
            build_command: build.build_command,
            output_dir: build.output_dir,
            artifact_name: build.artifact,
            workspace_base: state.join("workspaces"),
            artifact_root: state.join("artifacts"),
            publish_root: state.join("pages"),
            pages_base_url: "http://localhost:8080/pages".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - QUAY_BIND_ADDR (default: 0.0.0.0:8080)
    /// - QUAY_PIPELINE_NAME (default: pages)
    /// - QUAY_DEPLOY_BRANCH (default: main)
    /// - QUAY_CONCURRENCY_GROUP (default: pages, empty disables)
    /// - QUAY_CANCEL_IN_PROGRESS (default: false)
    /// - QUAY_REPOSITORY_URL, or QUAY_SOURCE_DIR (default: current directory)
    /// - QUAY_INSTALL_COMMAND (empty disables the install step)
    /// - QUAY_BUILD_COMMAND (default: mkdocs build)
    /// - QUAY_OUTPUT_DIR (default: site)
    /// - QUAY_ARTIFACT_NAME (default: github-pages)
    /// - QUAY_WORKSPACE_BASE, QUAY_ARTIFACT_ROOT, QUAY_PUBLISH_ROOT
    /// - QUAY_PAGES_BASE_URL
    pub fn from_env() -> anyhow::Result<Self> {
        let source = match (var("QUAY_REPOSITORY_URL"), var("QUAY_SOURCE_DIR")) {
            (Some(url), _) => SourceConfig::Git(url),
            (None, Some(dir)) => SourceConfig::Local(PathBuf::from(dir)),
            (None, None) => SourceConfig::Local(std::env::current_dir()?),
        };
        let mut config = Self::new(source);

        if let Some(addr) = var("QUAY_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(name) = var("QUAY_PIPELINE_NAME") {
            config.pipeline_name = name;
        }
        if let Some(branch) = var("QUAY_DEPLOY_BRANCH") {
            config.deploy_branch = branch;
        }
        if let Ok(group) = std::env::var("QUAY_CONCURRENCY_GROUP") {
            config.concurrency_group = Some(group).filter(|g| !g.trim().is_empty());
        }
        if let Some(flag) = var("QUAY_CANCEL_IN_PROGRESS") {
            config.cancel_in_progress = parse_bool(&flag).ok_or_else(|| {
                anyhow::anyhow!("QUAY_CANCEL_IN_PROGRESS must be true or false, got '{}'", flag)
            })?;
        }
        if let Ok(install) = std::env::var("QUAY_INSTALL_COMMAND") {
            config.install_command = Some(install).filter(|c| !c.trim().is_empty());
        }
        if let Some(build) = var("QUAY_BUILD_COMMAND") {
            config.build_command = build;
        }
        if let Some(dir) = var("QUAY_OUTPUT_DIR") {
            config.output_dir = dir;
        }
        if let Some(name) = var("QUAY_ARTIFACT_NAME") {
            config.artifact_name = name;
        }
        if let Some(dir) = var("QUAY_WORKSPACE_BASE") {
            config.workspace_base = PathBuf::from(dir);
        }
        if let Some(dir) = var("QUAY_ARTIFACT_ROOT") {
            config.artifact_root = PathBuf::from(dir);
        }
        if let Some(dir) = var("QUAY_PUBLISH_ROOT") {
            config.publish_root = PathBuf::from(dir);
        }
        if let Some(url) = var("QUAY_PAGES_BASE_URL") {
            config.pages_base_url = url;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pipeline_name.is_empty() {
            anyhow::bail!("pipeline_name cannot be empty");
        }

        if self.deploy_branch.is_empty() {
            anyhow::bail!("deploy_branch cannot be empty");
        }

        if self.build_command.trim().is_empty() {
            anyhow::bail!("build_command cannot be empty");
        }

        let output_dir = Path::new(&self.output_dir);
        let escapes = output_dir
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if self.output_dir.is_empty() || escapes {
            anyhow::bail!("output_dir must be a relative path inside the checkout");
        }

        if self.artifact_name.is_empty() {
            anyhow::bail!("artifact_name cannot be empty");
        }

        if self.cancel_in_progress && self.concurrency_group.is_none() {
            anyhow::bail!("cancel_in_progress requires a concurrency group");
        }

        if !self.pages_base_url.starts_with("http://") && !self.pages_base_url.starts_with("https://")
        {
            anyhow::bail!("pages_base_url must start with http:// or https://");
        }

        match &self.source {
            SourceConfig::Git(url) if url.is_empty() => {
                anyhow::bail!("repository url cannot be empty")
            }
            SourceConfig::Local(dir) if !dir.is_dir() => {
                anyhow::bail!("source directory {:?} does not exist", dir)
            }
            _ => {}
        }

        Ok(())
    }

    /// The pages pipeline this configuration describes
    pub fn pipeline(&self) -> PipelineDefinition {
        let build = BuildSpec {
            install_command: self.install_command.clone(),
            build_command: self.build_command.clone(),
            output_dir: self.output_dir.clone(),
            artifact: self.artifact_name.clone(),
        };
        let concurrency = self.concurrency_group.clone().map(|group| ConcurrencyPolicy {
            group,
            cancel_in_progress: self.cancel_in_progress,
        });
        PipelineDefinition::pages(self.pipeline_name.clone(), build, concurrency)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(SourceConfig::Local(PathBuf::from(".")))
    }
}

/// Set and non-empty
fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
