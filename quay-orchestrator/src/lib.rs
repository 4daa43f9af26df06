//! Quay Orchestrator
//!
//! Receives trigger events, runs the pages pipeline and serves its state over
//! HTTP.
//!
//! Layers:
//! - api: axum handlers and error mapping
//! - service: run lifecycle (trigger, queue, execute, finish)
//! - scheduler: job dependency graph execution within one run
//! - concurrency: keyed lock shared by runs of the same group
//! - repository: in-memory runs and logs

pub mod api;
pub mod concurrency;
pub mod config;
pub mod repository;
pub mod scheduler;
pub mod service;

use anyhow::Context;
use quay_core::domain::trigger::TriggerResolver;
use quay_runner::{
    ArtifactStore, BuildExecutor, DirectoryPublisher, GitSource, LocalSource, SourceProvider,
    StandardJobHandler, TokenIssuer,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, SourceConfig};
use crate::repository::{LogRepository, RunRepository};
use crate::scheduler::JobScheduler;
use crate::service::RunService;

/// A fully wired orchestrator
pub struct Orchestrator {
    pub service: Arc<RunService>,
    /// Directory holding the currently published site
    pub live_dir: PathBuf,
}

impl Orchestrator {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let source: Arc<dyn SourceProvider> = match &config.source {
            SourceConfig::Local(dir) => Arc::new(LocalSource::new(dir)),
            SourceConfig::Git(url) => Arc::new(GitSource::new(url)),
        };
        let publisher = DirectoryPublisher::new(&config.publish_root, &config.pages_base_url);
        let live_dir = publisher.live_dir();
        let handler = StandardJobHandler::new(BuildExecutor::new(source), Arc::new(publisher));

        let runs = RunRepository::new();
        let logs = LogRepository::new();
        let scheduler = JobScheduler::new(
            Arc::new(handler),
            Arc::new(ArtifactStore::new(&config.artifact_root)),
            TokenIssuer::default(),
            &config.workspace_base,
            runs.clone(),
            logs.clone(),
        );

        let service = RunService::new(
            config.pipeline(),
            TriggerResolver::new(&config.deploy_branch),
            scheduler,
            runs,
            logs,
        )
        .context("invalid pipeline definition")?;

        Ok(Self { service, live_dir })
    }

    pub fn router(&self) -> axum::Router {
        api::create_router(Arc::clone(&self.service), &self.live_dir)
    }
}
