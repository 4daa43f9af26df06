//! Deploy publisher
//!
//! Pushes a site tree to its hosting environment and reports the public URL.
//! A publish either replaces the live site completely or leaves it untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quay_core::domain::artifact::Artifact;
use quay_core::domain::permissions::{Access, Permissions};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::copy_tree;
use crate::token::IdentityToken;

const LIVE_DIR: &str = "live";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publishing to '{environment}' requires {scope}: write (granted: {granted})")]
    PermissionDenied {
        environment: String,
        scope: &'static str,
        granted: Permissions,
    },

    #[error("no identity token was issued for environment '{0}'")]
    MissingToken(String),

    #[error("identity token is not valid for run {run_id} and environment '{environment}'")]
    InvalidToken { run_id: Uuid, environment: String },

    #[error("hosting environment rejected the deployment: {0}")]
    Rejected(String),

    #[error("publish I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// What to publish and under which authority
pub struct PublishRequest<'a> {
    pub artifact: &'a Artifact,
    /// Directory holding the downloaded artifact
    pub site_dir: &'a Path,
    pub environment: &'a str,
    pub permissions: Permissions,
    pub token: Option<&'a IdentityToken>,
}

/// A completed deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub page_url: String,
    pub digest: String,
    pub deployed_at: DateTime<Utc>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, request: PublishRequest<'_>) -> Result<Deployment, PublishError>;
}

/// Checks the grant and token every publisher requires
pub fn authorize(request: &PublishRequest<'_>) -> Result<(), PublishError> {
    let denied = |scope: &'static str| PublishError::PermissionDenied {
        environment: request.environment.to_string(),
        scope,
        granted: request.permissions,
    };
    if !request.permissions.pages.allows(Access::Write) {
        return Err(denied("pages"));
    }
    if !request.permissions.can_issue_id_token() {
        return Err(denied("id-token"));
    }

    let token = request
        .token
        .ok_or_else(|| PublishError::MissingToken(request.environment.to_string()))?;
    if !token.is_valid_for(request.artifact.run_id, request.environment) {
        return Err(PublishError::InvalidToken {
            run_id: request.artifact.run_id,
            environment: request.environment.to_string(),
        });
    }
    Ok(())
}

/// Publishes into `<root>/live`, served at `base_url`
///
/// The new tree is staged next to the live one and swapped in by rename.
pub struct DirectoryPublisher {
    root: PathBuf,
    base_url: String,
}

impl DirectoryPublisher {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn live_dir(&self) -> PathBuf {
        self.root.join(LIVE_DIR)
    }
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    async fn publish(&self, request: PublishRequest<'_>) -> Result<Deployment, PublishError> {
        authorize(&request)?;

        let root = self.root.clone();
        let site = request.site_dir.to_path_buf();
        tokio::task::spawn_blocking(move || swap_in(&root, &site))
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))??;

        let deployment = Deployment {
            page_url: format!("{}/", self.base_url),
            digest: request.artifact.digest.clone(),
            deployed_at: Utc::now(),
        };
        info!(
            "Published run {} to '{}' at {}",
            request.artifact.run_id, request.environment, deployment.page_url
        );
        Ok(deployment)
    }
}

fn swap_in(root: &Path, site: &Path) -> io::Result<()> {
    std::fs::create_dir_all(root)?;
    let stamp = Uuid::new_v4().simple().to_string();
    let staging = root.join(format!(".staging-{}", stamp));
    let previous = root.join(format!(".previous-{}", stamp));
    let live = root.join(LIVE_DIR);

    if let Err(e) = copy_tree(site, &staging) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    let had_live = live.exists();
    if had_live {
        std::fs::rename(&live, &previous)?;
    }
    if let Err(e) = std::fs::rename(&staging, &live) {
        if had_live {
            std::fs::rename(&previous, &live)?;
        }
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }
    if had_live {
        if let Err(e) = std::fs::remove_dir_all(&previous) {
            warn!("Failed to remove previous site {:?}: {}", previous, e);
        }
    }
    Ok(())
}
