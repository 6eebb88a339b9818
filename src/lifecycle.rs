//! Branch lifecycle: the in-memory repository registry and the background
//! staleness sweep
//!
//! The registry is read-mostly shared state; writers are tracker
//! initialization and on-demand branch tracking. Every branch carries its
//! own writer lock so at most one indexing run per (repository, branch) is
//! in flight, while readers proceed against the indexed-commit snapshot.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::Store;
use crate::types::{BranchStatus, IndexState};

/// A tracked branch: its status snapshot plus the single-writer lock
pub struct BranchEntry {
    status: RwLock<BranchStatus>,
    /// Held for the duration of one indexing run; concurrent requests for
    /// the same branch await it
    pub writer: tokio::sync::Mutex<()>,
}

impl BranchEntry {
    fn new(status: BranchStatus) -> Self {
        Self {
            status: RwLock::new(status),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn status(&self) -> BranchStatus {
        self.status.read().expect("branch status lock poisoned").clone()
    }

    pub fn set_state(&self, state: IndexState) {
        let mut status = self.status.write().expect("branch status lock poisoned");
        status.state = state;
    }

    pub fn set_head(&self, head: String) {
        let mut status = self.status.write().expect("branch status lock poisoned");
        status.head_commit = head;
    }

    pub fn mark_indexed(&self, commit: String, at: DateTime<Utc>) {
        let mut status = self.status.write().expect("branch status lock poisoned");
        status.head_commit = commit.clone();
        status.indexed_commit = Some(commit);
        status.state = IndexState::Completed;
        status.last_indexed_at = Some(at);
    }

    pub fn touch(&self, at: DateTime<Utc>) {
        let mut status = self.status.write().expect("branch status lock poisoned");
        status.last_accessed_at = at;
    }
}

/// One configured repository's in-memory state
pub struct RepositoryState {
    pub id: Uuid,
    pub name: String,
    pub default_branch: String,
    branches: DashMap<String, Arc<BranchEntry>>,
}

impl RepositoryState {
    pub fn branch(&self, name: &str) -> Option<Arc<BranchEntry>> {
        self.branches.get(name).map(|entry| entry.clone())
    }

    pub fn branch_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.branches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Insert a branch if absent, returning the (possibly existing) entry
    pub fn track_branch(&self, status: BranchStatus) -> Arc<BranchEntry> {
        self.branches
            .entry(status.name.clone())
            .or_insert_with(|| Arc::new(BranchEntry::new(status)))
            .clone()
    }
}

/// Name-keyed registry of repository state
#[derive(Default)]
pub struct Registry {
    repositories: DashMap<String, Arc<RepositoryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_repository(
        &self,
        id: Uuid,
        name: &str,
        default_branch: &str,
    ) -> Arc<RepositoryState> {
        self.repositories
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(RepositoryState {
                    id,
                    name: name.to_string(),
                    default_branch: default_branch.to_string(),
                    branches: DashMap::new(),
                })
            })
            .clone()
    }

    pub fn repository(&self, name: &str) -> Option<Arc<RepositoryState>> {
        self.repositories.get(name).map(|entry| entry.clone())
    }

    pub fn repository_by_id(&self, id: Uuid) -> Option<Arc<RepositoryState>> {
        self.repositories
            .iter()
            .find(|entry| entry.value().id == id)
            .map(|entry| entry.value().clone())
    }

    pub fn repository_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.repositories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Background loop that reclaims idle branches
pub struct StalenessSweeper {
    store: Store,
    registry: Arc<Registry>,
    interval: Duration,
    max_idle: ChronoDuration,
}

impl StalenessSweeper {
    pub fn new(
        store: Store,
        registry: Arc<Registry>,
        interval: Duration,
        max_idle_days: i64,
    ) -> Self {
        Self {
            store,
            registry,
            interval,
            max_idle: ChronoDuration::days(max_idle_days),
        }
    }

    /// Run the sweep at a fixed interval until the token is cancelled.
    /// The stop signal interrupts the idle wait directly; the task exits
    /// promptly without finishing the current sleep.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so startup does
            // not race initialization
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("staleness sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.sweep_once(Utc::now()).await {
                            Ok(0) => debug!("staleness sweep found nothing to reclaim"),
                            Ok(count) => info!(count, "staleness sweep marked branches stale"),
                            Err(e) => warn!(error = %e, "staleness sweep failed"),
                        }
                    }
                }
            }
        })
    }

    /// Mark Completed branches idle beyond the threshold as Stale. Derived
    /// rows are deleted by the next re-index, not here.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let cutoff = now - self.max_idle;
        let swept = self.store.sweep_stale_branches(cutoff).await?;
        for (repository_id, branch_name) in &swept {
            if let Some(repository) = self.registry.repository_by_id(*repository_id) {
                if let Some(branch) = repository.branch(branch_name) {
                    branch.set_state(IndexState::Stale);
                }
            }
        }
        Ok(swept.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(name: &str) -> BranchStatus {
        BranchStatus {
            name: name.to_string(),
            head_commit: "abc123".to_string(),
            indexed_commit: None,
            state: IndexState::Pending,
            last_indexed_at: None,
            last_accessed_at: Utc::now(),
        }
    }

    #[test]
    fn tracking_a_branch_twice_reuses_the_entry() {
        let registry = Registry::new();
        let repo = registry.register_repository(Uuid::new_v4(), "demo", "main");
        let first = repo.track_branch(status("main"));
        let second = repo.track_branch(status("main"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(repo.branch_names(), vec!["main".to_string()]);
    }

    #[test]
    fn mark_indexed_aligns_cursor_and_state() {
        let registry = Registry::new();
        let repo = registry.register_repository(Uuid::new_v4(), "demo", "main");
        let branch = repo.track_branch(status("main"));
        branch.mark_indexed("def456".to_string(), Utc::now());
        let snapshot = branch.status();
        assert_eq!(snapshot.state, IndexState::Completed);
        assert_eq!(snapshot.indexed_commit.as_deref(), Some("def456"));
        assert_eq!(snapshot.head_commit, "def456");
    }

    #[tokio::test]
    async fn writer_lock_serializes_per_branch() {
        let registry = Registry::new();
        let repo = registry.register_repository(Uuid::new_v4(), "demo", "main");
        let branch = repo.track_branch(status("main"));
        let guard = branch.writer.lock().await;
        assert!(branch.writer.try_lock().is_err());
        drop(guard);
        assert!(branch.writer.try_lock().is_ok());
    }
}
