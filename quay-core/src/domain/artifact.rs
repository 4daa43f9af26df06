//! Artifact domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable bundle of build output handed from one job to another
///
/// Artifacts are scoped to the run that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub run_id: Uuid,
    /// Name of the job that uploaded the artifact
    pub producer: String,
    pub file_count: usize,
    pub size_bytes: u64,
    /// SHA-256 over the sorted relative paths and file contents
    pub digest: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
