//! Git adapter for agent worktrees and winner publication.
//!
//! Each agent gets its own worktree on its own branch, so we keep a small,
//! explicit wrapper around `git` subprocess calls plus a gateway trait the
//! orchestration layer talks to.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::core::naming::{looks_like_remote, remote_slug};

/// Repository or worktree preparation failures.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("repository not found: {}", .0.display())]
    RepositoryMissing(PathBuf),
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),
    #[error("git executable not found on PATH")]
    GitUnavailable,
    #[error("failed to create worktree for branch '{branch}': {detail}")]
    Worktree { branch: String, detail: String },
    #[error("failed to clone '{remote}': {detail}")]
    Clone { remote: String, detail: String },
    #[error(
        "'{0}' is neither an existing directory nor a git URL (e.g. https://github.com/org/repo.git)"
    )]
    InvalidRepository(String),
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub async fn is_work_tree(&self) -> Result<bool> {
        let out = self.run(&["rev-parse", "--is-inside-work-tree"]).await?;
        Ok(out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
    }

    /// Stage all changes (respects .gitignore).
    pub async fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"]).await?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub async fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"]).await?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub async fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes().await? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message]).await?;
        Ok(true)
    }

    pub async fn push_branch(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_checked(&["push", "-u", remote, branch]).await?;
        Ok(())
    }

    async fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        match Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .await
        {
            Ok(output) => Ok(output),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(SetupError::GitUnavailable.into()),
            Err(err) => Err(err).with_context(|| format!("spawn git {}", args.join(" "))),
        }
    }
}

/// Pull request to open for a pushed branch.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub branch: String,
    pub base: String,
    pub title: String,
    pub body_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestOutcome {
    Created { url: String },
    /// No PR tool available; the branch is pushed and a human finishes the job.
    Manual { instructions: String },
}

/// Version-control operations the tournament needs. Worktree mutations are
/// serialized by the implementation.
#[async_trait]
pub trait VersionControlGateway: Send + Sync {
    /// Create `path` as a worktree of `source` on a new `branch`.
    async fn create_worktree(&self, source: &Path, branch: &str, path: &Path) -> Result<PathBuf>;

    /// Stage and commit everything; returns false when there was nothing to commit.
    async fn commit_if_dirty(&self, worktree: &Path, message: &str) -> Result<bool>;

    async fn push(&self, worktree: &Path, branch: &str) -> Result<()>;

    async fn open_pull_request(
        &self,
        worktree: &Path,
        request: &PullRequest,
    ) -> Result<PullRequestOutcome>;
}

/// Gateway backed by the `git` and `gh` executables.
#[derive(Debug)]
pub struct GitGateway {
    remote: String,
    worktree_lock: Mutex<()>,
}

impl Default for GitGateway {
    fn default() -> Self {
        Self::new("origin")
    }
}

impl GitGateway {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            worktree_lock: Mutex::new(()),
        }
    }

    async fn add_worktree(&self, git: &Git, branch: &str, path: &Path) -> Result<Output> {
        let path_arg = path.to_string_lossy();
        git.run(&["worktree", "add", "-b", branch, path_arg.as_ref()])
            .await
    }

    /// Best-effort cleanup of a stale worktree and branch left by an earlier run.
    async fn clear_stale(&self, git: &Git, branch: &str, path: &Path) {
        let path_arg = path.to_string_lossy();
        for args in [
            vec!["worktree", "remove", "--force", path_arg.as_ref()],
            vec!["worktree", "prune"],
            vec!["branch", "-D", branch],
        ] {
            if let Err(err) = git.run(&args).await {
                debug!(err = %err, "stale worktree cleanup step failed");
            }
        }
        if path.exists()
            && let Err(err) = tokio::fs::remove_dir_all(path).await
        {
            debug!(err = %err, path = %path.display(), "remove stale worktree dir");
        }
    }
}

#[async_trait]
impl VersionControlGateway for GitGateway {
    #[instrument(skip_all, fields(branch))]
    async fn create_worktree(&self, source: &Path, branch: &str, path: &Path) -> Result<PathBuf> {
        if !source.is_dir() {
            return Err(SetupError::RepositoryMissing(source.to_path_buf()).into());
        }
        let git = Git::new(source);
        if !git.is_work_tree().await? {
            return Err(SetupError::NotARepository(source.to_path_buf()).into());
        }
        // git runs inside `source`, so a relative path would land in the source repo.
        let path = &std::path::absolute(path)
            .with_context(|| format!("resolve {}", path.display()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create directory {}", parent.display()))?;
        }

        let _guard = self.worktree_lock.lock().await;
        let first = self.add_worktree(&git, branch, path).await?;
        if first.status.success() {
            info!(branch, path = %path.display(), "worktree created");
            return Ok(path.to_path_buf());
        }

        let stderr = String::from_utf8_lossy(&first.stderr).to_string();
        if !stderr.contains("already exists") {
            return Err(SetupError::Worktree {
                branch: branch.to_string(),
                detail: stderr.trim().to_string(),
            }
            .into());
        }
        warn!(branch, "worktree or branch already exists, clearing and retrying");
        self.clear_stale(&git, branch, path).await;

        let retry = self.add_worktree(&git, branch, path).await?;
        if !retry.status.success() {
            return Err(SetupError::Worktree {
                branch: branch.to_string(),
                detail: String::from_utf8_lossy(&retry.stderr).trim().to_string(),
            }
            .into());
        }
        info!(branch, path = %path.display(), "worktree created after retry");
        Ok(path.to_path_buf())
    }

    async fn commit_if_dirty(&self, worktree: &Path, message: &str) -> Result<bool> {
        let git = Git::new(worktree);
        git.add_all().await?;
        git.commit_staged(message).await
    }

    #[instrument(skip_all, fields(branch))]
    async fn push(&self, worktree: &Path, branch: &str) -> Result<()> {
        Git::new(worktree).push_branch(&self.remote, branch).await?;
        info!(branch, remote = %self.remote, "branch pushed");
        Ok(())
    }

    #[instrument(skip_all, fields(branch = %request.branch))]
    async fn open_pull_request(
        &self,
        worktree: &Path,
        request: &PullRequest,
    ) -> Result<PullRequestOutcome> {
        let output = Command::new("gh")
            .args(["pr", "create", "--head", &request.branch, "--base", &request.base])
            .arg("--title")
            .arg(&request.title)
            .arg("--body-file")
            .arg(&request.body_path)
            .current_dir(worktree)
            .output()
            .await;
        let output = match output {
            Ok(output) => output,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("gh not found, pull request must be opened manually");
                return Ok(PullRequestOutcome::Manual {
                    instructions: format!(
                        "Branch '{}' is pushed. Open a pull request against '{}' using the body in {}.",
                        request.branch,
                        request.base,
                        request.body_path.display()
                    ),
                });
            }
            Err(err) => return Err(err).context("spawn gh pr create"),
        };
        if !output.status.success() {
            return Err(anyhow!(
                "gh pr create failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(url = %url, "pull request created");
        Ok(PullRequestOutcome::Created { url })
    }
}

/// Resolve a repository argument to a local git work tree.
///
/// Existing directories must already be work trees. Remotes are cloned once
/// into `<work_base>/repos/<slug>` and reused afterwards.
#[instrument(skip_all, fields(repo = %repo))]
pub async fn resolve_repo(repo: &str, work_base: &Path) -> Result<PathBuf> {
    let candidate = PathBuf::from(repo);
    if candidate.is_dir() {
        let path = candidate
            .canonicalize()
            .with_context(|| format!("resolve {}", candidate.display()))?;
        if !Git::new(&path).is_work_tree().await? {
            return Err(SetupError::NotARepository(path).into());
        }
        return Ok(path);
    }
    if !looks_like_remote(repo) {
        return Err(SetupError::InvalidRepository(repo.to_string()).into());
    }

    let repos_dir = work_base.join("repos");
    let dest = repos_dir.join(remote_slug(repo));
    if dest.join(".git").exists() {
        debug!(dest = %dest.display(), "reusing existing clone");
        return Ok(dest);
    }
    tokio::fs::create_dir_all(&repos_dir)
        .await
        .with_context(|| format!("create directory {}", repos_dir.display()))?;

    info!(dest = %dest.display(), "cloning repository");
    let dest_arg = dest.to_string_lossy();
    let output = Git::new(&repos_dir)
        .run(&["clone", repo, dest_arg.as_ref()])
        .await?;
    if !output.status.success() {
        if dest.exists()
            && let Err(err) = tokio::fs::remove_dir_all(&dest).await
        {
            warn!(err = %err, "remove partial clone");
        }
        return Err(SetupError::Clone {
            remote: repo.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[tokio::test]
    async fn commit_if_dirty_reports_whether_anything_changed() {
        let repo = TestRepo::new().expect("repo");
        let gateway = GitGateway::default();
        assert!(
            !gateway
                .commit_if_dirty(repo.path(), "noop")
                .await
                .expect("commit")
        );
        std::fs::write(repo.path().join("new.txt"), "hi").expect("write");
        assert!(
            gateway
                .commit_if_dirty(repo.path(), "add file")
                .await
                .expect("commit")
        );
    }

    #[tokio::test]
    async fn resolve_repo_accepts_work_tree_and_rejects_plain_words() {
        let repo = TestRepo::new().expect("repo");
        let work = tempfile::tempdir().expect("tempdir");
        let resolved = resolve_repo(&repo.path().to_string_lossy(), work.path())
            .await
            .expect("resolve");
        assert!(resolved.is_absolute());

        let err = resolve_repo("not-a-repo-anywhere", work.path())
            .await
            .expect_err("invalid");
        assert!(matches!(
            err.downcast_ref::<SetupError>(),
            Some(SetupError::InvalidRepository(_))
        ));
    }

    #[tokio::test]
    async fn resolve_repo_rejects_plain_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plain = dir.path().join("plain");
        std::fs::create_dir_all(&plain).expect("mkdir");
        let err = resolve_repo(&plain.to_string_lossy(), dir.path())
            .await
            .expect_err("not a repo");
        assert!(matches!(
            err.downcast_ref::<SetupError>(),
            Some(SetupError::NotARepository(_))
        ));
    }
}
