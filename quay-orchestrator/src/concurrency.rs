//! Concurrency groups
//!
//! A keyed lock service: each group key has at most one active holder and a
//! FIFO queue of waiting runs. Runs in different groups never wait on each
//! other.
//!
//! Joining a group is split in two so callers can fix their queue position
//! synchronously (`enqueue`) and wait for their turn later (`Ticket::wait`).
//! With `cancel_in_progress` the newcomer signals the active holder to stop
//! and supersedes every queued waiter; otherwise it simply queues.
//!
//! The slot is released when the `GroupPermit` is dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error("run {run_id} was superseded by run {by} in concurrency group '{group}'")]
    Superseded { group: String, run_id: Uuid, by: Uuid },

    #[error("concurrency group '{0}' dropped its queue")]
    Closed(String),
}

type Groups = Arc<Mutex<HashMap<String, GroupState>>>;

#[derive(Default)]
struct GroupState {
    active: Option<Holder>,
    waiting: VecDeque<Waiter>,
}

struct Holder {
    run_id: Uuid,
    cancel: watch::Sender<bool>,
}

struct Waiter {
    run_id: Uuid,
    grant: oneshot::Sender<Grant>,
}

enum Grant {
    Acquired(GroupPermit),
    Superseded(Uuid),
}

/// Keyed lock service for concurrency groups
#[derive(Clone, Default)]
pub struct ConcurrencyGroups {
    groups: Groups,
}

impl ConcurrencyGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a place in `group` for `run_id`
    pub fn enqueue(&self, group: &str, run_id: Uuid, cancel_in_progress: bool) -> Ticket {
        let mut groups = lock(&self.groups);
        let state = groups.entry(group.to_string()).or_default();

        if cancel_in_progress {
            if let Some(holder) = &state.active {
                info!(
                    "Run {} cancels in-progress run {} in group '{}'",
                    run_id, holder.run_id, group
                );
                holder.cancel.send_replace(true);
            }
            for waiter in state.waiting.drain(..) {
                debug!("Run {} supersedes queued run {}", run_id, waiter.run_id);
                let _ = waiter.grant.send(Grant::Superseded(run_id));
            }
        }

        if state.active.is_none() {
            let permit = activate(&self.groups, group, state, run_id);
            return Ticket {
                group: group.to_string(),
                run_id,
                state: TicketState::Ready(permit),
            };
        }

        let (grant, rx) = oneshot::channel();
        state.waiting.push_back(Waiter { run_id, grant });
        debug!(
            "Run {} queued in group '{}' at position {}",
            run_id,
            group,
            state.waiting.len()
        );

        Ticket {
            group: group.to_string(),
            run_id,
            state: TicketState::Waiting(rx),
        }
    }

    /// Run currently holding `group`
    pub fn active(&self, group: &str) -> Option<Uuid> {
        lock(&self.groups)
            .get(group)
            .and_then(|s| s.active.as_ref().map(|h| h.run_id))
    }

    /// Runs waiting for `group`, oldest first
    pub fn queued(&self, group: &str) -> Vec<Uuid> {
        lock(&self.groups)
            .get(group)
            .map(|s| {
                s.waiting
                    .iter()
                    .filter(|w| !w.grant.is_closed())
                    .map(|w| w.run_id)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A place in a group's queue
///
/// Dropping a waiting ticket gives up the place; dropping a ready one releases
/// the slot.
pub struct Ticket {
    group: String,
    run_id: Uuid,
    state: TicketState,
}

enum TicketState {
    Ready(GroupPermit),
    Waiting(oneshot::Receiver<Grant>),
}

impl Ticket {
    pub fn is_ready(&self) -> bool {
        matches!(self.state, TicketState::Ready(_))
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Waits until the run holds the group
    pub async fn wait(self) -> Result<GroupPermit, GroupError> {
        match self.state {
            TicketState::Ready(permit) => Ok(permit),
            TicketState::Waiting(rx) => match rx.await {
                Ok(Grant::Acquired(permit)) => Ok(permit),
                Ok(Grant::Superseded(by)) => Err(GroupError::Superseded {
                    group: self.group,
                    run_id: self.run_id,
                    by,
                }),
                Err(_) => Err(GroupError::Closed(self.group)),
            },
        }
    }
}

/// Exclusive hold on a concurrency group
pub struct GroupPermit {
    groups: Groups,
    group: String,
    run_id: Uuid,
    cancel: watch::Receiver<bool>,
    armed: bool,
}

impl GroupPermit {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Flips to `true` when a newer run supersedes this one
    pub fn cancellation(&self) -> watch::Receiver<bool> {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

impl Drop for GroupPermit {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut groups = lock(&self.groups);
        let Some(state) = groups.get_mut(&self.group) else {
            return;
        };
        if state.active.as_ref().map(|h| h.run_id) != Some(self.run_id) {
            return;
        }

        debug!("Run {} released group '{}'", self.run_id, self.group);
        state.active = None;
        grant_next(&self.groups, &self.group, state);

        if state.active.is_none() && state.waiting.is_empty() {
            groups.remove(&self.group);
        }
    }
}

fn activate(groups: &Groups, group: &str, state: &mut GroupState, run_id: Uuid) -> GroupPermit {
    let (cancel, cancel_rx) = watch::channel(false);
    state.active = Some(Holder { run_id, cancel });
    GroupPermit {
        groups: Arc::clone(groups),
        group: group.to_string(),
        run_id,
        cancel: cancel_rx,
        armed: true,
    }
}

/// Hands the slot to the oldest waiter still listening
///
/// Called with the group lock held, so a permit that cannot be delivered is
/// disarmed before it drops.
fn grant_next(groups: &Groups, group: &str, state: &mut GroupState) {
    while let Some(waiter) = state.waiting.pop_front() {
        let permit = activate(groups, group, state, waiter.run_id);
        match waiter.grant.send(Grant::Acquired(permit)) {
            Ok(()) => {
                debug!("Run {} acquired group '{}'", waiter.run_id, group);
                return;
            }
            Err(undelivered) => {
                if let Grant::Acquired(mut permit) = undelivered {
                    permit.armed = false;
                }
                state.active = None;
                debug!("Skipping abandoned waiter {} in '{}'", waiter.run_id, group);
            }
        }
    }
}

fn lock(groups: &Groups) -> MutexGuard<'_, HashMap<String, GroupState>> {
    groups.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_uncontended_acquire_is_immediate() {
        let groups = ConcurrencyGroups::new();
        let run = Uuid::new_v4();

        let ticket = groups.enqueue("pages", run, false);
        assert!(ticket.is_ready());
        let permit = ticket.wait().await.unwrap();

        assert_eq!(permit.run_id(), run);
        assert_eq!(groups.active("pages"), Some(run));
    }

    #[tokio::test]
    async fn test_second_run_waits_for_release() {
        let groups = ConcurrencyGroups::new();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        let held = groups.enqueue("pages", first, false).wait().await.unwrap();
        let ticket = groups.enqueue("pages", second, false);
        assert!(!ticket.is_ready());
        assert_eq!(groups.queued("pages"), vec![second]);

        let waiting = tokio::spawn(ticket.wait());
        tokio::time::sleep(SHORT).await;
        assert!(!waiting.is_finished());
        assert!(!held.is_cancelled());

        drop(held);
        let permit = timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(permit.run_id(), second);
        assert_eq!(groups.active("pages"), Some(second));
    }

    #[tokio::test]
    async fn test_waiters_are_granted_in_order() {
        let groups = ConcurrencyGroups::new();
        let runs: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        let first = groups.enqueue("pages", runs[0], false).wait().await.unwrap();
        let second = groups.enqueue("pages", runs[1], false);
        let third = groups.enqueue("pages", runs[2], false);
        assert_eq!(groups.queued("pages"), vec![runs[1], runs[2]]);

        drop(first);
        let second = second.wait().await.unwrap();
        assert_eq!(groups.active("pages"), Some(runs[1]));
        assert_eq!(groups.queued("pages"), vec![runs[2]]);

        drop(second);
        let third = third.wait().await.unwrap();
        assert_eq!(third.run_id(), runs[2]);

        drop(third);
        assert_eq!(groups.active("pages"), None);
    }

    #[tokio::test]
    async fn test_groups_are_independent() {
        let groups = ConcurrencyGroups::new();
        let _docs = groups.enqueue("docs", Uuid::new_v4(), false).wait().await.unwrap();

        let other = groups.enqueue("api-docs", Uuid::new_v4(), false);
        assert!(other.is_ready());
    }

    #[tokio::test]
    async fn test_cancel_in_progress_supersedes() {
        let groups = ConcurrencyGroups::new();
        let (first, queued, newest) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let held = groups.enqueue("pages", first, false).wait().await.unwrap();
        let mut cancellation = held.cancellation();
        let queued_ticket = groups.enqueue("pages", queued, false);

        let newest_ticket = groups.enqueue("pages", newest, true);
        assert!(held.is_cancelled());
        timeout(SHORT, cancellation.wait_for(|c| *c))
            .await
            .unwrap()
            .unwrap();

        let superseded = queued_ticket.wait().await;
        assert_eq!(
            superseded.err(),
            Some(GroupError::Superseded {
                group: "pages".to_string(),
                run_id: queued,
                by: newest,
            })
        );

        // The cancelled holder still owns the slot until it finishes.
        assert!(!newest_ticket.is_ready());
        drop(held);
        let permit = newest_ticket.wait().await.unwrap();
        assert_eq!(permit.run_id(), newest);
        assert!(!permit.is_cancelled());
    }

    #[tokio::test]
    async fn test_abandoned_waiter_is_skipped() {
        let groups = ConcurrencyGroups::new();
        let (first, gone, last) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let held = groups.enqueue("pages", first, false).wait().await.unwrap();
        let abandoned = groups.enqueue("pages", gone, false);
        let last_ticket = groups.enqueue("pages", last, false);

        drop(abandoned);
        assert_eq!(groups.queued("pages"), vec![last]);

        drop(held);
        let permit = last_ticket.wait().await.unwrap();
        assert_eq!(permit.run_id(), last);
    }
}
