//! Quay Runner
//!
//! Executes the individual jobs of a pipeline run.
//!
//! Architecture:
//! - Context: per-job state (workspace, permissions, identity token, logs)
//! - Source: clean checkout of the ref a run builds
//! - Build: install + generate + validate, then upload the site as an artifact
//! - Artifacts: run-scoped, immutable, consume-once handoff between jobs
//! - Publish: atomic replacement of the hosted site
//!
//! The orchestrator owns scheduling; this crate only knows how to run one job.

pub mod artifact;
pub mod build;
pub mod context;
pub mod error;
pub mod handler;
pub mod process;
pub mod publish;
pub mod service;
pub mod source;
pub mod token;

pub use artifact::{ArtifactError, ArtifactStore};
pub use build::BuildExecutor;
pub use context::JobContext;
pub use error::{Result, RunnerError};
pub use handler::{JobHandler, JobOutcome, StandardJobHandler};
pub use publish::{Deployment, DirectoryPublisher, PublishError, PublishRequest, Publisher};
pub use service::{InMemoryLogBuffer, LogSink};
pub use source::{GitSource, LocalSource, SourceProvider};
pub use token::{IdentityToken, TokenIssuer};
