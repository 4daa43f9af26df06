//! Job domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::permissions::Permissions;

/// Execution record of a job within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub needs: Vec<String>,
    pub status: JobStatus,
    pub permissions: Permissions,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Named outputs exposed to the run (e.g. `page_url`)
    pub outputs: HashMap<String, String>,
    pub error_message: Option<String>,
}

impl JobRecord {
    pub fn new(name: impl Into<String>, needs: Vec<String>, permissions: Permissions) -> Self {
        Self {
            name: name.into(),
            needs,
            status: JobStatus::Pending,
            permissions,
            started_at: None,
            completed_at: None,
            outputs: HashMap::new(),
            error_message: None,
        }
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// A predecessor did not succeed; the job never started
    Skipped,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Skipped | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
