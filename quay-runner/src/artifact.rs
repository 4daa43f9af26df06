//! Artifact store
//!
//! Holds the build output handed from the producing job to its consumer.
//! Artifacts are keyed by (run, name), so one run can never see another run's
//! output. Each artifact is written once and may be downloaded once.

use quay_core::domain::artifact::Artifact;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Artifact handoff failures
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact '{name}' was not found for run {run_id}")]
    NotFound { run_id: Uuid, name: String },

    #[error("artifact '{name}' already exists for run {run_id}")]
    AlreadyExists { run_id: Uuid, name: String },

    #[error("artifact '{name}' for run {run_id} was already consumed")]
    AlreadyConsumed { run_id: Uuid, name: String },

    #[error("artifact source '{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("artifact I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("artifact task failed: {0}")]
    Task(String),
}

struct StoredArtifact {
    artifact: Artifact,
    path: PathBuf,
    consumed: bool,
}

/// Run-scoped artifact storage rooted at a directory
pub struct ArtifactStore {
    root: PathBuf,
    entries: Mutex<HashMap<(Uuid, String), StoredArtifact>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies `source` into the store as artifact `name` of `run_id`
    pub async fn upload(
        &self,
        run_id: Uuid,
        name: &str,
        producer: &str,
        source: &Path,
    ) -> Result<Artifact, ArtifactError> {
        let key = (run_id, name.to_string());
        if self.lock().contains_key(&key) {
            return Err(ArtifactError::AlreadyExists {
                run_id,
                name: name.to_string(),
            });
        }
        if !source.is_dir() {
            return Err(ArtifactError::NotADirectory(source.to_path_buf()));
        }

        let dest = self.root.join(run_id.to_string()).join(name);
        let (src, dst) = (source.to_path_buf(), dest.clone());
        let (file_count, size_bytes, digest) = tokio::task::spawn_blocking(move || {
            if dst.exists() {
                fs::remove_dir_all(&dst)?;
            }
            copy_tree(&src, &dst)?;
            digest_tree(&dst)
        })
        .await
        .map_err(|e| ArtifactError::Task(e.to_string()))??;

        let artifact = Artifact {
            name: name.to_string(),
            run_id,
            producer: producer.to_string(),
            file_count,
            size_bytes,
            digest,
            created_at: chrono::Utc::now(),
        };

        let mut entries = self.lock();
        if entries.contains_key(&key) {
            return Err(ArtifactError::AlreadyExists {
                run_id,
                name: name.to_string(),
            });
        }
        entries.insert(
            key,
            StoredArtifact {
                artifact: artifact.clone(),
                path: dest,
                consumed: false,
            },
        );

        info!(
            "Uploaded artifact '{}' for run {} ({} files, {} bytes)",
            name, run_id, file_count, size_bytes
        );
        Ok(artifact)
    }

    /// Copies artifact `name` of `run_id` into `dest` and marks it consumed
    pub async fn download(
        &self,
        run_id: Uuid,
        name: &str,
        dest: &Path,
    ) -> Result<Artifact, ArtifactError> {
        let (artifact, path) = {
            let mut entries = self.lock();
            let stored = entries
                .get_mut(&(run_id, name.to_string()))
                .ok_or_else(|| ArtifactError::NotFound {
                    run_id,
                    name: name.to_string(),
                })?;
            if stored.consumed {
                return Err(ArtifactError::AlreadyConsumed {
                    run_id,
                    name: name.to_string(),
                });
            }
            stored.consumed = true;
            (stored.artifact.clone(), stored.path.clone())
        };

        let dst = dest.to_path_buf();
        tokio::task::spawn_blocking(move || copy_tree(&path, &dst))
            .await
            .map_err(|e| ArtifactError::Task(e.to_string()))??;

        debug!("Downloaded artifact '{}' for run {}", name, run_id);
        Ok(artifact)
    }

    /// Metadata for an artifact, consumed or not
    pub fn get(&self, run_id: Uuid, name: &str) -> Option<Artifact> {
        self.lock()
            .get(&(run_id, name.to_string()))
            .map(|s| s.artifact.clone())
    }

    /// Drops every artifact of `run_id`
    pub async fn discard_run(&self, run_id: Uuid) {
        let removed = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|(id, _), _| *id != run_id);
            before - entries.len()
        };

        let dir = self.root.join(run_id.to_string());
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Discarded {} artifact(s) for run {}", removed, run_id),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove artifacts of run {}: {}", run_id, e),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(Uuid, String), StoredArtifact>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Recursively copies regular files and directories; symlinks are not followed
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// (file count, total bytes, hex SHA-256) of a directory tree
///
/// Paths are visited in sorted order, so equal trees digest equally.
pub fn digest_tree(root: &Path) -> io::Result<(usize, u64, String)> {
    let mut hasher = Sha256::new();
    let mut files = 0;
    let mut bytes = 0u64;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).map_err(io::Error::other)?;
        let contents = fs::read(entry.path())?;

        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update([0u8]);
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);

        files += 1;
        bytes += contents.len() as u64;
    }

    Ok((files, bytes, format!("{:x}", hasher.finalize())))
}
