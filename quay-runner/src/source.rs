//! Source acquisition
//!
//! Every build starts from a clean checkout in the job's own workspace.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::artifact::copy_tree;
use crate::context::JobContext;
use crate::error::{Result, RunnerError};
use crate::process::run_command;

/// Produces a clean source tree for a git ref
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Materializes `ctx.git_ref` into `dest`, which must not exist yet
    async fn checkout(&self, dest: &Path, ctx: &JobContext) -> Result<()>;
}

/// Clones a git repository and checks out the requested ref
pub struct GitSource {
    repository_url: String,
}

impl GitSource {
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
        }
    }
}

#[async_trait]
impl SourceProvider for GitSource {
    async fn checkout(&self, dest: &Path, ctx: &JobContext) -> Result<()> {
        let parent = dest
            .parent()
            .ok_or_else(|| RunnerError::Source(format!("invalid checkout path {:?}", dest)))?;
        tokio::fs::create_dir_all(parent).await?;

        let dest_str = dest.to_string_lossy();
        ctx.log_info(format!(
            "Cloning {} at {}",
            self.repository_url, ctx.git_ref
        ));
        run_command(
            "checkout",
            "git",
            &["clone", "--quiet", "--", self.repository_url.as_str(), &*dest_str],
            parent,
            ctx,
        )
        .await?;
        run_command(
            "checkout",
            "git",
            &[
                "-c",
                "advice.detachedHead=false",
                "checkout",
                "--quiet",
                "--detach",
                "--end-of-options",
                ctx.git_ref.as_str(),
                "--",
            ],
            dest,
            ctx,
        )
        .await?;

        info!("Checked out {} for run {}", ctx.git_ref, ctx.run_id);
        Ok(())
    }
}

/// Copies a local directory tree, leaving out version-control metadata
///
/// The tree is taken as-is; the requested ref is only recorded in the log.
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SourceProvider for LocalSource {
    async fn checkout(&self, dest: &Path, ctx: &JobContext) -> Result<()> {
        if !self.root.is_dir() {
            return Err(RunnerError::Source(format!(
                "source directory {:?} does not exist",
                self.root
            )));
        }

        ctx.log_info(format!(
            "Copying source tree {} ({})",
            self.root.display(),
            ctx.git_ref
        ));

        let (src, dst) = (self.root.clone(), dest.to_path_buf());
        tokio::task::spawn_blocking(move || {
            copy_tree(&src, &dst)?;
            let git_dir = dst.join(".git");
            if git_dir.exists() {
                std::fs::remove_dir_all(git_dir)?;
            }
            Ok::<_, std::io::Error>(())
        })
        .await
        .map_err(|e| RunnerError::Source(e.to_string()))??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactStore;
    use crate::service::InMemoryLogBuffer;
    use quay_core::domain::permissions::Permissions;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn context(dir: &Path) -> JobContext {
        context_at(dir, "main")
    }

    fn context_at(dir: &Path, git_ref: &str) -> JobContext {
        JobContext::new(
            Uuid::new_v4(),
            "build",
            git_ref,
            dir.to_path_buf(),
            Permissions::read_contents(),
            Arc::new(ArtifactStore::new(dir.join("artifacts"))),
            Arc::new(InMemoryLogBuffer::new()),
        )
    }

    #[tokio::test]
    async fn test_local_source_copies_tree_without_git_dir() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(repo.join("docs")).unwrap();
        fs::create_dir_all(repo.join(".git")).unwrap();
        fs::write(repo.join("docs/index.md"), "# Home").unwrap();
        fs::write(repo.join(".git/HEAD"), "ref: refs/heads/main").unwrap();

        let dest = dir.path().join("checkout");
        LocalSource::new(&repo)
            .checkout(&dest, &context(dir.path()))
            .await
            .unwrap();

        assert!(dest.join("docs/index.md").is_file());
        assert!(!dest.join(".git").exists());
    }

    #[tokio::test]
    async fn test_local_source_missing_root() {
        let dir = tempdir().unwrap();
        let result = LocalSource::new(dir.path().join("missing"))
            .checkout(&dir.path().join("checkout"), &context(dir.path()))
            .await;
        assert!(matches!(result, Err(RunnerError::Source(_))));
    }

    fn git(repo: &Path, args: &[&str]) -> String {
        let output = std::process::Command::new("git")
            .args(["-c", "user.name=quay", "-c", "user.email=quay@example.org"])
            .args(args)
            .current_dir(repo)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {:?} failed", args);
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    /// Repository with two commits to docs/index.md; returns the first SHA
    fn two_commit_repo(repo: &Path) -> String {
        fs::create_dir_all(repo.join("docs")).unwrap();
        git(repo, &["init", "--quiet"]);
        fs::write(repo.join("docs/index.md"), "one").unwrap();
        git(repo, &["add", "."]);
        git(repo, &["commit", "--quiet", "-m", "first"]);
        let first = git(repo, &["rev-parse", "HEAD"]);
        fs::write(repo.join("docs/index.md"), "two").unwrap();
        git(repo, &["commit", "--quiet", "-am", "second"]);
        first
    }

    #[tokio::test]
    async fn test_git_source_checks_out_requested_commit() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        let first = two_commit_repo(&repo);

        let dest = dir.path().join("checkout");
        GitSource::new(repo.to_string_lossy())
            .checkout(&dest, &context_at(dir.path(), &first))
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(dest.join("docs/index.md")).unwrap(), "one");
        assert_eq!(git(&dest, &["rev-parse", "HEAD"]), first);
    }

    #[tokio::test]
    async fn test_git_source_does_not_take_ref_as_option() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        two_commit_repo(&repo);

        let dest = dir.path().join("checkout");
        let result = GitSource::new(repo.to_string_lossy())
            .checkout(&dest, &context_at(dir.path(), "--orphan=evil"))
            .await;

        assert!(matches!(
            result,
            Err(RunnerError::StepFailed { ref step, .. }) if step == "checkout"
        ));
        assert_ne!(
            git(&dest, &["symbolic-ref", "--quiet", "--short", "HEAD"]),
            "evil"
        );
    }

    #[tokio::test]
    async fn test_git_source_clone_failure() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("no-such-repo");

        let result = GitSource::new(missing.to_string_lossy())
            .checkout(&dir.path().join("checkout"), &context(dir.path()))
            .await;

        assert!(matches!(
            result,
            Err(RunnerError::StepFailed { ref step, .. }) if step == "checkout"
        ));
    }
}
