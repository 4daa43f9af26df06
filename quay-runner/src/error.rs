//! Error types for job execution

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::publish::PublishError;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Reasons a job fails
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The step's process could not be spawned
    #[error("failed to start step '{step}': {source}")]
    Spawn {
        step: String,
        #[source]
        source: std::io::Error,
    },

    /// The step ran and exited unsuccessfully
    #[error("step '{step}' failed with {status}")]
    StepFailed { step: String, status: String },

    /// The generator finished without producing its output directory
    #[error("expected output directory '{0}' does not exist after build")]
    MissingOutput(String),

    /// Source could not be checked out
    #[error("source checkout failed: {0}")]
    Source(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
