//! Engine composition root
//!
//! Owns the configuration, the git tracker, the store, the embedding
//! client, the in-memory registry, the indexer, and the query orchestrator.
//! The transport façade calls `query` (or `query_json`) and nothing else;
//! indexing is triggered lazily per branch on first use and re-triggered
//! when a branch goes stale.

use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::embeddings::EmbeddingClient;
use crate::error::EngineError;
use crate::git::GitTracker;
use crate::indexer::{IndexReport, Indexer};
use crate::lifecycle::{BranchEntry, Registry, RepositoryState, StalenessSweeper};
use crate::query::{QueryOrchestrator, QueryResponse, RetrievalProfile};
use crate::store::Store;
use crate::types::{BranchStatus, IndexState};

/// One inbound query call, as the transport hands it over
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub repository: String,
    pub text: String,
    pub branch: Option<String>,
    pub max_results: Option<usize>,
    pub profile: Option<String>,
}

pub struct Engine {
    config: Arc<EngineConfig>,
    store: Store,
    tracker: Arc<GitTracker>,
    registry: Arc<Registry>,
    indexer: Indexer,
    orchestrator: QueryOrchestrator,
    shutdown: CancellationToken,
    sweeper: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Validate configuration (fatal on error), connect the store, and wire
    /// the components. Call `initialize` before serving queries.
    pub async fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let config = Arc::new(config);

        let store = Store::connect(&config.database, config.embedding_dimensions)
            .await
            .map_err(|e| EngineError::transient("database_unavailable", e.to_string()))?;
        store
            .ensure_schema()
            .await
            .map_err(|e| EngineError::permanent("schema", e.to_string()))?;

        let tracker = Arc::new(
            GitTracker::new(config.clone())
                .map_err(|e| EngineError::Config(e.to_string()))?,
        );
        let embedder = Arc::new(EmbeddingClient::from_config(&config));
        let registry = Arc::new(Registry::new());
        let indexer = Indexer::new(
            config.clone(),
            tracker.clone(),
            store.clone(),
            embedder.clone(),
        );
        let orchestrator = QueryOrchestrator::new(config.clone(), store.clone(), embedder);

        Ok(Self {
            config,
            store,
            tracker,
            registry,
            indexer,
            orchestrator,
            shutdown: CancellationToken::new(),
            sweeper: tokio::sync::Mutex::new(None),
        })
    }

    /// Mirror every configured repository, probe its branches, and start the
    /// staleness sweeper. Mirror failures are recorded and surfaced at query
    /// time rather than failing startup.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        self.tracker.initialize(&self.shutdown).await?;

        for repo_config in &self.config.repositories {
            let row = self
                .store
                .upsert_repository(
                    &repo_config.name,
                    &repo_config.remote_url,
                    &repo_config.default_branch,
                )
                .await?;
            let state =
                self.registry
                    .register_repository(row.id, &row.name, &row.default_branch);

            // First remote-branches probe creates Pending branch rows
            match self.tracker.list_remote_branches(&repo_config.name).await {
                Ok(branches) => {
                    for remote in branches {
                        let branch_row = self
                            .store
                            .upsert_branch(row.id, &remote.name, &remote.head)
                            .await?;
                        state.track_branch(BranchStatus {
                            name: branch_row.name.clone(),
                            head_commit: branch_row.head_commit.clone(),
                            indexed_commit: branch_row.indexed_commit.clone(),
                            state: branch_row.state,
                            last_indexed_at: branch_row.last_indexed_at,
                            last_accessed_at: branch_row.last_accessed_at,
                        });
                    }
                }
                Err(e) => warn!(repository = %repo_config.name, error = %e, "branch probe failed"),
            }
        }

        let sweeper = StalenessSweeper::new(
            self.store.clone(),
            self.registry.clone(),
            std::time::Duration::from_secs(self.config.sweep_interval_seconds),
            self.config.stale_branch_days,
        );
        let handle = sweeper.spawn(self.shutdown.clone());
        *self.sweeper.lock().await = Some(handle);

        info!(
            repositories = self.config.repositories.len(),
            "engine initialized"
        );
        Ok(())
    }

    /// Cancel background work and in-flight operations, then wait for the
    /// sweeper to exit
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.sweeper.lock().await.take() {
            let _ = handle.await;
        }
        info!("engine shut down");
    }

    /// The single query entry point
    #[instrument(skip(self, request), fields(repository = %request.repository))]
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse, EngineError> {
        let profile = match &request.profile {
            Some(name) => RetrievalProfile::parse(name)?,
            None => RetrievalProfile::default(),
        };

        let repository = self.resolve_repository(&request.repository).await?;
        let branch_name = request
            .branch
            .clone()
            .unwrap_or_else(|| repository.default_branch.clone());
        let branch = self
            .ensure_branch_tracked(&repository, &branch_name)
            .await?;

        branch.touch(chrono::Utc::now());
        if let Err(e) = self.store.touch_branch(repository.id, &branch_name).await {
            warn!(error = %e, "access-time update failed");
        }

        self.index_if_needed(&repository, &branch).await?;

        self.orchestrator
            .run(
                repository.id,
                &repository.name,
                &branch_name,
                &request.text,
                request.max_results,
                profile,
                &self.shutdown,
            )
            .await
            .map_err(into_engine_error)
    }

    /// `query`, with the error path folded into the `{error, ...}` JSON
    /// object the transport emits
    pub async fn query_json(&self, request: QueryRequest) -> serde_json::Value {
        match self.query(request).await {
            Ok(response) => serde_json::to_value(&response)
                .unwrap_or_else(|e| EngineError::permanent("serialize", e.to_string()).to_payload()),
            Err(e) => e.to_payload(),
        }
    }

    /// Explicitly index a branch now (also used by the benchmark harness)
    pub async fn index_branch(
        &self,
        repository_name: &str,
        branch_name: &str,
    ) -> Result<IndexReport, EngineError> {
        let repository = self.resolve_repository(repository_name).await?;
        let branch = self
            .ensure_branch_tracked(&repository, branch_name)
            .await?;
        self.indexer
            .index_branch(&repository, &branch, &self.shutdown)
            .await
            .map_err(into_engine_error)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn resolve_repository(
        &self,
        name: &str,
    ) -> Result<Arc<RepositoryState>, EngineError> {
        match self.registry.repository(name) {
            Some(repository) => Ok(repository),
            None => Err(EngineError::RepositoryNotFound {
                name: name.to_string(),
                available: self.registry.repository_names(),
            }),
        }
    }

    /// Lazily track a branch on first use: verify it exists in the mirror
    /// (fetching once if it does not), create its Pending row, and register
    /// it. Unknown branches fail with the directory of available names.
    pub async fn ensure_branch_tracked(
        &self,
        repository: &Arc<RepositoryState>,
        branch_name: &str,
    ) -> Result<Arc<BranchEntry>, EngineError> {
        if let Some(branch) = repository.branch(branch_name) {
            return Ok(branch);
        }

        let tip = match self
            .tracker
            .branch_tip(&repository.name, branch_name)
            .await
        {
            Ok(Some(tip)) => Some(tip),
            Ok(None) => {
                // The branch may have been pushed since the last fetch
                if let Err(e) = self
                    .tracker
                    .fetch(&repository.name, &self.shutdown)
                    .await
                {
                    warn!(error = %e, "fetch during branch tracking failed");
                }
                self.tracker
                    .branch_tip(&repository.name, branch_name)
                    .await
                    .map_err(into_engine_error)?
            }
            Err(e) => return Err(into_engine_error(e)),
        };

        let Some(tip) = tip else {
            if let Some(message) = self.tracker.init_error(&repository.name) {
                return Err(EngineError::transient("mirror_unavailable", message));
            }
            let available = self
                .tracker
                .list_remote_branches(&repository.name)
                .await
                .map(|branches| branches.into_iter().map(|b| b.name).collect())
                .unwrap_or_else(|_| repository.branch_names());
            return Err(EngineError::BranchNotFound {
                repository: repository.name.clone(),
                branch: branch_name.to_string(),
                available,
            });
        };

        let row = self
            .store
            .upsert_branch(repository.id, branch_name, &tip)
            .await
            .map_err(into_engine_error)?;
        Ok(repository.track_branch(BranchStatus {
            name: row.name,
            head_commit: row.head_commit,
            indexed_commit: row.indexed_commit,
            state: row.state,
            last_indexed_at: row.last_indexed_at,
            last_accessed_at: row.last_accessed_at,
        }))
    }

    /// Lazy indexing: run when the branch has never completed or has gone
    /// stale. A branch with an indexed snapshot keeps serving that snapshot
    /// if the refresh fails transiently.
    async fn index_if_needed(
        &self,
        repository: &Arc<RepositoryState>,
        branch: &Arc<BranchEntry>,
    ) -> Result<(), EngineError> {
        let status = branch.status();
        let needs_index = match status.state {
            IndexState::Completed => status.indexed_commit.as_deref()
                != Some(status.head_commit.as_str()),
            IndexState::Pending | IndexState::Stale | IndexState::Failed => true,
            IndexState::InProgress => true,
        };
        if !needs_index {
            return Ok(());
        }

        match self
            .indexer
            .index_branch(repository, branch, &self.shutdown)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                if branch.status().indexed_commit.is_some() {
                    warn!(error = %e, "re-index failed, serving previous snapshot");
                    Ok(())
                } else {
                    Err(into_engine_error(e))
                }
            }
        }
    }
}

/// Fold an internal error into the public taxonomy without leaking stack
/// traces
fn into_engine_error(e: anyhow::Error) -> EngineError {
    match e.downcast::<EngineError>() {
        Ok(engine_error) => engine_error,
        Err(other) => EngineError::permanent("internal", other.to_string()),
    }
}
