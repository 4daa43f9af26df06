//! Run Repository
//!
//! Holds every run record. All status changes go through `update`, which
//! applies one of the `Run` transition methods under the write lock and wakes
//! anyone waiting on the run.

use quay_core::domain::run::{Run, TransitionError};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("run {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Clone, Default)]
pub struct RunRepository {
    runs: Arc<RwLock<HashMap<Uuid, Run>>>,
    changed: Arc<Notify>,
}

impl RunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, run: Run) {
        self.write().insert(run.id, run);
        self.changed.notify_waiters();
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<Run> {
        self.read().get(&id).cloned()
    }

    /// Every run, newest first
    pub fn list_all(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.read().values().cloned().collect();
        runs.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        runs
    }

    /// Applies `change` to the stored run
    pub fn update<T>(
        &self,
        id: Uuid,
        change: impl FnOnce(&mut Run) -> Result<T, TransitionError>,
    ) -> Result<T, RepositoryError> {
        let result = {
            let mut runs = self.write();
            let run = runs.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
            change(run)?
        };
        self.changed.notify_waiters();
        Ok(result)
    }

    /// Resolves once the run satisfies `done`; `None` if it does not exist
    pub async fn wait_until(&self, id: Uuid, done: impl Fn(&Run) -> bool) -> Option<Run> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let run = self.find_by_id(id)?;
            if done(&run) {
                return Some(run);
            }
            notified.await;
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Run>> {
        self.runs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Run>> {
        self.runs.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_core::domain::job::JobRecord;
    use quay_core::domain::permissions::Permissions;
    use quay_core::domain::run::RunStatus;
    use quay_core::domain::trigger::TriggerEvent;
    use std::time::Duration;

    fn run() -> Run {
        Run::new(
            "pages",
            TriggerEvent::Manual,
            "main",
            None,
            vec![JobRecord::new("build", Vec::new(), Permissions::read_contents())],
        )
    }

    #[test]
    fn test_update_applies_transition() {
        let repo = RunRepository::new();
        let run = run();
        let id = run.id;
        repo.insert(run);

        repo.update(id, |r| r.start()).unwrap();
        assert_eq!(repo.find_by_id(id).unwrap().status, RunStatus::Running);

        repo.update(id, |r| r.finish(RunStatus::Succeeded, None))
            .unwrap();
        let err = repo.update(id, |r| r.start()).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Transition(TransitionError::RunTerminal { .. })
        ));
    }

    #[test]
    fn test_update_unknown_run() {
        let repo = RunRepository::new();
        let err = repo.update(Uuid::new_v4(), |r| r.start()).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_wait_until_sees_later_update() {
        let repo = RunRepository::new();
        let run = run();
        let id = run.id;
        repo.insert(run);

        let waiter = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.wait_until(id, |r| r.status.is_terminal()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        repo.update(id, |r| r.finish(RunStatus::Cancelled, None))
            .unwrap();

        let finished = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(finished.status, RunStatus::Cancelled);
    }
}
