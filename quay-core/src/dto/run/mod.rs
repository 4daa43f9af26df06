//! Run DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::{Run, RunStatus};

/// Run summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub pipeline: String,
    pub trigger: String,
    pub git_ref: String,
    pub status: RunStatus,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub page_url: Option<String>,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id,
            pipeline: run.pipeline.clone(),
            trigger: run.trigger.to_string(),
            git_ref: run.git_ref.clone(),
            status: run.status,
            requested_at: run.requested_at,
            completed_at: run.completed_at,
            page_url: run.page_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trigger::TriggerEvent;

    #[test]
    fn test_run_summary_conversion() {
        let run = Run::new("pages", TriggerEvent::Manual, "main", None, vec![]);
        let summary = RunSummary::from(&run);

        assert_eq!(summary.id, run.id);
        assert_eq!(summary.trigger, "manual dispatch");
        assert_eq!(summary.status, RunStatus::Queued);
    }
}
