//! Run endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use quay_core::domain::log::LogEntry;
use quay_core::domain::run::Run;
use quay_core::dto::run::RunSummary;
use uuid::Uuid;

impl OrchestratorClient {
    /// List all runs, newest first
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let url = format!("{}/runs", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get a run with all of its jobs
    pub async fn get_run(&self, run_id: Uuid) -> Result<Run> {
        let url = format!("{}/runs/{}", self.base_url, run_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Request cancellation of a queued or running run
    ///
    /// Returns the run as it was when the request was accepted; it reaches
    /// `Cancelled` shortly after.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<Run> {
        let url = format!("{}/runs/{}/cancel", self.base_url, run_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get all log entries of a run
    pub async fn get_run_logs(&self, run_id: Uuid) -> Result<Vec<LogEntry>> {
        let url = format!("{}/runs/{}/logs", self.base_url, run_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
