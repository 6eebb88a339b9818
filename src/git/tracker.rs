//! Bare-mirror management and incremental change enumeration
//!
//! One bare mirror per configured repository lives under the working
//! directory at `{name}.git`. Fetches are serialized per repository; change
//! enumeration diffs the branch's indexed commit (or the empty tree) against
//! the head it snapshots at call time.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use dashmap::DashMap;
use globset::GlobSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{EngineConfig, RepositoryConfig};
use crate::error::EngineError;
use crate::git::types::{CommitDetails, RemoteBranch};
use crate::types::{ChangeKind, FileChange};

const MIRROR_REFSPEC: &str = "+refs/heads/*:refs/heads/*";

/// Maintains local bare mirrors and answers "what changed since the cursor"
pub struct GitTracker {
    config: Arc<EngineConfig>,
    exclusions: GlobSet,
    /// Per-repository fetch locks; enumerations snapshot the head they see
    /// and may run concurrently with a fetch
    fetch_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Clone/fetch failures recorded here and surfaced at query time
    init_errors: DashMap<String, String>,
}

impl GitTracker {
    pub fn new(config: Arc<EngineConfig>) -> Result<Self> {
        let exclusions = config.exclusion_globs()?;
        Ok(Self {
            config,
            exclusions,
            fetch_locks: DashMap::new(),
            init_errors: DashMap::new(),
        })
    }

    /// Last recorded clone/fetch error for a repository, if any
    pub fn init_error(&self, repository: &str) -> Option<String> {
        self.init_errors.get(repository).map(|e| e.clone())
    }

    fn fetch_lock(&self, repository: &str) -> Arc<Mutex<()>> {
        self.fetch_locks
            .entry(repository.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ensure a bare mirror exists for every configured repository.
    /// A mirror that already exists is fetched instead of cloned. Errors are
    /// recorded per repository and do not abort initialization of the rest.
    #[instrument(skip(self, cancel))]
    pub async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        for repo in self.config.repositories.clone() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled.into());
            }
            match self.ensure_mirror(&repo, cancel).await {
                Ok(()) => {
                    self.init_errors.remove(&repo.name);
                    info!(repository = %repo.name, "mirror ready");
                }
                Err(e) => {
                    warn!(repository = %repo.name, error = %e, "mirror initialization failed");
                    self.init_errors.insert(repo.name.clone(), e.to_string());
                }
            }
        }
        Ok(())
    }

    /// Clone the mirror if absent, otherwise fetch it
    pub async fn ensure_mirror(
        &self,
        repo: &RepositoryConfig,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = self.config.mirror_path(&repo.name);
        if path.exists() {
            return self.fetch(&repo.name, cancel).await;
        }

        let lock = self.fetch_lock(&repo.name);
        let _guard = lock.lock().await;

        let url = repo.remote_url.clone();
        let name = repo.name.clone();
        let timeout = Duration::from_secs(self.config.git_fetch_timeout_seconds);
        let cancel = cancel.clone();

        let clone_task = tokio::task::spawn_blocking(move || -> Result<()> {
            debug!(repository = %name, "creating bare mirror at {:?}", path);
            std::fs::create_dir_all(path.parent().unwrap_or(&path))?;
            let mirror = git2::Repository::init_bare(&path)
                .with_context(|| format!("failed to init bare mirror at {path:?}"))?;
            let mut remote = mirror
                .remote_with_fetch("origin", &url, MIRROR_REFSPEC)
                .context("failed to configure origin remote")?;
            let mut options = fetch_options(&cancel);
            remote
                .fetch(&[MIRROR_REFSPEC], Some(&mut options), None)
                .map_err(|e| anyhow::Error::from(classify_git_error(e)))
                .context("initial mirror fetch failed")?;
            Ok(())
        });

        run_git_op(clone_task, timeout, "clone").await
    }

    /// Fetch the mirror's heads from origin. Serialized per repository.
    #[instrument(skip(self, cancel))]
    pub async fn fetch(&self, repository: &str, cancel: &CancellationToken) -> Result<()> {
        let lock = self.fetch_lock(repository);
        let _guard = lock.lock().await;

        let path = self.config.mirror_path(repository);
        let timeout = Duration::from_secs(self.config.git_fetch_timeout_seconds);
        let cancel = cancel.clone();

        let fetch_task = tokio::task::spawn_blocking(move || -> Result<()> {
            let mirror = open_mirror(&path)?;
            let mut remote = mirror
                .find_remote("origin")
                .context("mirror has no origin remote")?;
            let mut options = fetch_options(&cancel);
            options.prune(git2::FetchPrune::On);
            remote
                .fetch(&[MIRROR_REFSPEC], Some(&mut options), None)
                .map_err(|e| anyhow::Error::from(classify_git_error(e)))?;
            Ok(())
        });

        run_git_op(fetch_task, timeout, "fetch").await
    }

    /// List branch heads known to the mirror
    pub async fn list_remote_branches(&self, repository: &str) -> Result<Vec<RemoteBranch>> {
        let path = self.config.mirror_path(repository);
        tokio::task::spawn_blocking(move || -> Result<Vec<RemoteBranch>> {
            let mirror = open_mirror(&path)?;
            let mut branches = Vec::new();
            for entry in mirror.branches(Some(git2::BranchType::Local))? {
                let (branch, _) = entry?;
                let Some(name) = branch.name()? else { continue };
                if let Some(target) = branch.get().target() {
                    branches.push(RemoteBranch {
                        name: name.to_string(),
                        head: target.to_string(),
                    });
                }
            }
            branches.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(branches)
        })
        .await?
    }

    /// Resolve the tip commit of one branch, or None if the branch is unknown
    pub async fn branch_tip(&self, repository: &str, branch: &str) -> Result<Option<String>> {
        let path = self.config.mirror_path(repository);
        let branch = branch.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let mirror = open_mirror(&path)?;
            let result = match mirror.find_branch(&branch, git2::BranchType::Local) {
                Ok(b) => Ok(b.get().target().map(|oid| oid.to_string())),
                Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
                Err(e) => Err(classify_git_error(e).into()),
            };
            result
        })
        .await?
    }

    /// Commit metadata for the given SHA, recorded when a head is indexed
    pub async fn commit_details(
        &self,
        repository: &str,
        sha: &str,
        branch: &str,
    ) -> Result<CommitDetails> {
        let path = self.config.mirror_path(repository);
        let sha = sha.to_string();
        let branch = branch.to_string();
        tokio::task::spawn_blocking(move || -> Result<CommitDetails> {
            let mirror = open_mirror(&path)?;
            let oid = git2::Oid::from_str(&sha)?;
            let commit = mirror.find_commit(oid)?;
            let author = commit.author();
            let committed_at = Utc
                .timestamp_opt(commit.time().seconds(), 0)
                .single()
                .unwrap_or_else(Utc::now);
            Ok(CommitDetails {
                sha,
                branch,
                author: author.name().unwrap_or("unknown").to_string(),
                message: commit.summary().unwrap_or("").to_string(),
                committed_at,
            })
        })
        .await?
    }

    /// Enumerate files changed between `indexed_commit` (or the empty tree
    /// when None) and `head`. Binary files, excluded paths, and files over
    /// the size threshold are absent from the result.
    #[instrument(skip(self, indexed_commit), fields(repository = %repository, branch = %branch))]
    pub async fn get_file_changes(
        &self,
        repository: &str,
        branch: &str,
        indexed_commit: Option<&str>,
        head: &str,
    ) -> Result<Vec<FileChange>> {
        let path = self.config.mirror_path(repository);
        let config = self.config.clone();
        let exclusions = self.exclusions.clone();
        let old_sha = indexed_commit.map(|s| s.to_string());
        let new_sha = head.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<FileChange>> {
            let mirror = open_mirror(&path)?;
            collect_changes(&mirror, &config, &exclusions, old_sha.as_deref(), &new_sha)
        })
        .await?
    }
}

fn open_mirror(path: &PathBuf) -> Result<git2::Repository> {
    git2::Repository::open_bare(path)
        .or_else(|_| git2::Repository::open(path))
        .map_err(|e| anyhow::Error::from(classify_git_error(e)))
        .with_context(|| format!("failed to open mirror at {path:?}"))
}

fn fetch_options(cancel: &CancellationToken) -> git2::FetchOptions<'static> {
    let cancel = cancel.clone();
    let mut callbacks = git2::RemoteCallbacks::new();
    // Returning false aborts the transfer before the next round-trip
    callbacks.transfer_progress(move |_| !cancel.is_cancelled());
    let mut options = git2::FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

/// Await a blocking git task under the configured overall timeout.
/// A timeout is transient; it never advances any indexing cursor.
async fn run_git_op(
    task: tokio::task::JoinHandle<Result<()>>,
    timeout: Duration,
    op: &'static str,
) -> Result<()> {
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined?,
        Err(_) => {
            return Err(
                EngineError::transient("git_timeout", format!("git {op} timed out")).into(),
            )
        }
    }
}

/// Map libgit2 failures onto the transient/permanent taxonomy.
/// Network and auth problems may succeed on retry; bad refs will not.
fn classify_git_error(e: git2::Error) -> EngineError {
    use git2::ErrorClass;
    if e.code() == git2::ErrorCode::User {
        // Our own transfer-progress callback aborted the operation
        return EngineError::Cancelled;
    }
    match e.class() {
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Ssh
        | ErrorClass::Callback => {
            EngineError::transient("git_network", e.message().to_string())
        }
        _ => EngineError::permanent("git", e.message().to_string()),
    }
}

fn collect_changes(
    mirror: &git2::Repository,
    config: &EngineConfig,
    exclusions: &GlobSet,
    old_sha: Option<&str>,
    new_sha: &str,
) -> Result<Vec<FileChange>> {
    let new_commit = mirror
        .find_commit(git2::Oid::from_str(new_sha)?)
        .map_err(|e| anyhow::Error::from(classify_git_error(e)))?;
    let new_tree = new_commit.tree()?;

    let old_tree = match old_sha {
        Some(sha) => Some(
            mirror
                .find_commit(git2::Oid::from_str(sha)?)
                .map_err(|e| anyhow::Error::from(classify_git_error(e)))?
                .tree()?,
        ),
        None => None,
    };

    let diff = mirror.diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), None)?;

    let mut changes = Vec::new();
    for delta in diff.deltas() {
        let (kind, path) = match delta.status() {
            git2::Delta::Added | git2::Delta::Copied => (
                ChangeKind::Added,
                delta.new_file().path().map(|p| p.to_path_buf()),
            ),
            git2::Delta::Modified | git2::Delta::Renamed | git2::Delta::Typechange => (
                ChangeKind::Modified,
                delta.new_file().path().map(|p| p.to_path_buf()),
            ),
            git2::Delta::Deleted => (
                ChangeKind::Deleted,
                delta.old_file().path().map(|p| p.to_path_buf()),
            ),
            _ => continue,
        };
        let Some(path) = path else { continue };
        let path = path.to_string_lossy().replace('\\', "/");

        if !config.is_path_included(&path, exclusions) {
            debug!(path = %path, "excluded by glob filters");
            continue;
        }

        if kind == ChangeKind::Deleted {
            changes.push(FileChange {
                path,
                kind,
                content: None,
            });
            continue;
        }

        let blob_id = delta.new_file().id();
        let Ok(blob) = mirror.find_blob(blob_id) else {
            continue;
        };
        if blob.is_binary() {
            debug!(path = %path, "skipping binary file");
            continue;
        }
        if blob.size() as u64 > config.max_file_bytes {
            debug!(path = %path, size = blob.size(), "skipping oversize file");
            continue;
        }
        let Ok(content) = std::str::from_utf8(blob.content()) else {
            continue;
        };

        changes.push(FileChange {
            path,
            kind,
            content: Some(content.to_string()),
        });
    }

    Ok(changes)
}
