//! Trigger DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response to a delivered trigger event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub started: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// Why the event did not start a run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TriggerResponse {
    pub fn started(run_id: Uuid) -> Self {
        Self {
            started: true,
            run_id: Some(run_id),
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            started: false,
            run_id: None,
            reason: Some(reason.into()),
        }
    }
}
