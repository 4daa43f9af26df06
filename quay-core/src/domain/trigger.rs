//! Trigger events and the resolver that turns them into start decisions

use serde::{Deserialize, Serialize};

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// An event delivered by the host event system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// A push to a branch
    Push {
        branch: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        commit: Option<String>,
    },
    /// Manual dispatch, carries no payload
    Manual,
}

impl TriggerEvent {
    pub fn push(branch: impl Into<String>) -> Self {
        TriggerEvent::Push {
            branch: branch.into(),
            commit: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TriggerEvent::Push { .. } => "push",
            TriggerEvent::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerEvent::Push {
                branch,
                commit: Some(commit),
            } => write!(f, "push to {} ({})", branch, commit),
            TriggerEvent::Push { branch, .. } => write!(f, "push to {}", branch),
            TriggerEvent::Manual => write!(f, "manual dispatch"),
        }
    }
}

/// Outcome of resolving a trigger event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartDecision {
    /// Start a run building `git_ref`
    Start { git_ref: String },
    /// The event does not start a run
    Reject { reason: String },
}

impl StartDecision {
    pub fn git_ref(&self) -> Option<&str> {
        match self {
            StartDecision::Start { git_ref } => Some(git_ref),
            StartDecision::Reject { .. } => None,
        }
    }
}

/// Decides whether an incoming event starts a run
#[derive(Debug, Clone)]
pub struct TriggerResolver {
    deploy_branch: String,
}

impl TriggerResolver {
    pub fn new(deploy_branch: impl Into<String>) -> Self {
        Self {
            deploy_branch: normalize_branch(&deploy_branch.into()).to_string(),
        }
    }

    pub fn deploy_branch(&self) -> &str {
        &self.deploy_branch
    }

    /// Manual dispatch always starts a run on the deployment branch. A push
    /// starts one only when it targets the deployment branch, and builds the
    /// pushed commit when the event carries one.
    pub fn resolve(&self, event: &TriggerEvent) -> StartDecision {
        match event {
            TriggerEvent::Manual => StartDecision::Start {
                git_ref: self.deploy_branch.clone(),
            },
            TriggerEvent::Push { branch, commit } => {
                let branch = normalize_branch(branch);
                if branch != self.deploy_branch {
                    return StartDecision::Reject {
                        reason: format!(
                            "push to '{}' does not target deployment branch '{}'",
                            branch, self.deploy_branch
                        ),
                    };
                }

                let git_ref = match commit.as_deref().map(str::trim) {
                    Some(commit) if !commit.is_empty() => {
                        if !is_valid_commit(commit) {
                            return StartDecision::Reject {
                                reason: format!("commit '{}' is not a valid revision", commit),
                            };
                        }
                        commit
                    }
                    _ => branch,
                };

                StartDecision::Start {
                    git_ref: git_ref.to_string(),
                }
            }
        }
    }
}

/// Revisions are handed to git as arguments, so they may not look like options
fn is_valid_commit(commit: &str) -> bool {
    !commit.starts_with('-') && !commit.chars().any(char::is_whitespace)
}

fn normalize_branch(branch: &str) -> &str {
    let branch = branch.trim();
    branch.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(branch)
}
