//! Trigger endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use quay_core::domain::trigger::TriggerEvent;
use quay_core::dto::event::TriggerResponse;

impl OrchestratorClient {
    /// Deliver a trigger event
    ///
    /// A rejected event is not an error: the response has `started == false`
    /// and carries the reason.
    pub async fn send_event(&self, event: &TriggerEvent) -> Result<TriggerResponse> {
        let url = format!("{}/events", self.base_url);
        tracing::debug!("Sending {} to {}", event, url);
        let response = self.client.post(&url).json(event).send().await?;

        self.handle_response(response).await
    }

    /// Report a push to `branch`, optionally pinned to a commit
    pub async fn push(&self, branch: &str, commit: Option<&str>) -> Result<TriggerResponse> {
        self.send_event(&TriggerEvent::Push {
            branch: branch.to_string(),
            commit: commit.map(str::to_string),
        })
        .await
    }

    /// Request a manual dispatch
    pub async fn dispatch(&self) -> Result<TriggerResponse> {
        self.send_event(&TriggerEvent::Manual).await
    }
}
