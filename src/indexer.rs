//! The per-branch indexing pipeline
//!
//! Change enumeration → bounded parallel parse+chunk → ordered per-file
//! persistence, with embedding generation pipelined behind parsing through a
//! channel. The indexed-commit cursor advances only after every file batch
//! and the edge-resolution pass have committed; cancellation or a transient
//! failure leaves the cursor untouched and the next request retries.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::chunker::chunk_file;
use crate::config::EngineConfig;
use crate::embeddings::EmbeddingClient;
use crate::error::EngineError;
use crate::fingerprint::fingerprint_text;
use crate::git::GitTracker;
use crate::lifecycle::{BranchEntry, RepositoryState};
use crate::parsing::{parse_file, ParseOutcome};
use crate::store::{FilePersistence, Store};
use crate::types::{
    ChangeKind, CodeChunk, detect_language, Fingerprint, IndexState, SymbolKind,
};

/// Symbol kinds worth fingerprinting for near-duplicate detection
const FINGERPRINTED_KINDS: &[SymbolKind] = &[
    SymbolKind::Class,
    SymbolKind::Interface,
    SymbolKind::Struct,
    SymbolKind::Enum,
    SymbolKind::Function,
    SymbolKind::Method,
    SymbolKind::Constructor,
];

/// Outcome of one indexing run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub repository: String,
    pub branch: String,
    pub head_commit: String,
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_deleted: usize,
    pub files_failed: usize,
    pub symbols: usize,
    pub edges: usize,
    pub chunks: usize,
    pub embeddings: usize,
    pub edges_resolved: u64,
    /// True when the embedder was unavailable and chunks persisted without
    /// vectors
    pub embedding_degraded: bool,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

/// Runs indexing for one branch at a time
pub struct Indexer {
    config: Arc<EngineConfig>,
    tracker: Arc<GitTracker>,
    store: Store,
    embedder: Arc<EmbeddingClient>,
}

struct FileResult {
    path: String,
    symbols: usize,
    edges: usize,
    chunks: usize,
    error: Option<String>,
}

impl Indexer {
    pub fn new(
        config: Arc<EngineConfig>,
        tracker: Arc<GitTracker>,
        store: Store,
        embedder: Arc<EmbeddingClient>,
    ) -> Self {
        Self {
            config,
            tracker,
            store,
            embedder,
        }
    }

    /// Index one branch up to its current head. Holds the branch's writer
    /// lock for the duration; concurrent callers for the same branch await
    /// the in-flight run.
    #[instrument(skip(self, repository, branch, cancel), fields(repository = %repository.name))]
    pub async fn index_branch(
        &self,
        repository: &Arc<RepositoryState>,
        branch: &Arc<BranchEntry>,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let _writer = branch.writer.lock().await;
        let started = Instant::now();
        let branch_name = branch.status().name;

        // Snapshot the head once; a fetch racing this run is observed next
        // time
        let head = self
            .tracker
            .branch_tip(&repository.name, &branch_name)
            .await?
            .ok_or_else(|| {
                EngineError::permanent(
                    "branch_vanished",
                    format!("branch {branch_name} no longer exists in the mirror"),
                )
            })?;

        let indexed = branch.status().indexed_commit;
        let mut report = IndexReport {
            repository: repository.name.clone(),
            branch: branch_name.clone(),
            head_commit: head.clone(),
            ..Default::default()
        };

        if indexed.as_deref() == Some(head.as_str()) {
            // Nothing moved; a no-op run still completes
            branch.mark_indexed(head.clone(), chrono::Utc::now());
            self.store
                .mark_branch_indexed(repository.id, &branch_name, &head)
                .await?;
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        branch.set_state(IndexState::InProgress);
        self.store
            .set_branch_state(repository.id, &branch_name, IndexState::InProgress)
            .await?;

        let run = self
            .run_pipeline(repository, &branch_name, indexed.as_deref(), &head, cancel, &mut report)
            .await;

        match run {
            Ok(()) => {
                branch.mark_indexed(head.clone(), chrono::Utc::now());
                self.store
                    .mark_branch_indexed(repository.id, &branch_name, &head)
                    .await?;
                if let Err(e) = self.store.refresh_repository_stats(repository.id).await {
                    warn!(error = %e, "stats refresh failed");
                }
                report.duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    files = report.files_indexed,
                    symbols = report.symbols,
                    chunks = report.chunks,
                    ms = report.duration_ms,
                    "branch indexed"
                );
                Ok(report)
            }
            Err(e) => {
                // The cursor stays put; transient failures retry on the next
                // request
                let failed = !matches!(
                    e.downcast_ref::<EngineError>(),
                    Some(EngineError::Cancelled) | Some(EngineError::Transient { .. })
                );
                let state = if failed {
                    IndexState::Failed
                } else {
                    IndexState::Pending
                };
                branch.set_state(state);
                let _ = self
                    .store
                    .set_branch_state(repository.id, &branch_name, state)
                    .await;
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        repository: &Arc<RepositoryState>,
        branch_name: &str,
        indexed: Option<&str>,
        head: &str,
        cancel: &CancellationToken,
        report: &mut IndexReport,
    ) -> Result<()> {
        let changes = self
            .tracker
            .get_file_changes(&repository.name, branch_name, indexed, head)
            .await?;
        report.files_seen = changes.len();
        debug!(changes = changes.len(), "enumerated file changes");

        match self
            .tracker
            .commit_details(&repository.name, head, branch_name)
            .await
        {
            Ok(details) => self.store.record_commit(repository.id, &details).await?,
            Err(e) => warn!(error = %e, "could not record head commit"),
        }

        let (deleted, changed): (Vec<_>, Vec<_>) = changes
            .into_iter()
            .partition(|change| change.kind == ChangeKind::Deleted);

        for change in &deleted {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled.into());
            }
            self.store
                .delete_file_rows(repository.id, branch_name, &change.path)
                .await?;
            report.files_deleted += 1;
        }

        // Embedding generation rides behind parsing on a channel so batches
        // fill while files are still being processed
        let (chunk_tx, chunk_rx) = mpsc::channel::<(Uuid, CodeChunk)>(1024);
        let embed_task = tokio::spawn(embed_worker(
            chunk_rx,
            self.embedder.clone(),
            self.store.clone(),
            repository.id,
            branch_name.to_string(),
            head.to_string(),
            self.config.embedding_batch_size,
        ));

        let concurrency = self.config.file_read_concurrency.max(1);
        let results: Vec<Result<FileResult>> = stream::iter(changed.into_iter().map(|change| {
            let chunk_tx = chunk_tx.clone();
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled.into());
                }
                self.process_file(
                    repository.id,
                    branch_name,
                    head,
                    &change.path,
                    change.content.as_deref().unwrap_or(""),
                    chunk_tx,
                )
                .await
            }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;
        drop(chunk_tx);

        for result in results {
            match result {
                Ok(file) => {
                    report.files_indexed += 1;
                    report.symbols += file.symbols;
                    report.edges += file.edges;
                    report.chunks += file.chunks;
                    if let Some(error) = file.error {
                        report.files_failed += 1;
                        report.errors.push(format!("{}: {error}", file.path));
                    }
                }
                Err(e) => {
                    // Let the embed worker drain, then surface the failure
                    // without advancing the cursor
                    let _ = embed_task.await;
                    return Err(e);
                }
            }
        }

        let embed_outcome = embed_task.await.context("embedding worker panicked")?;
        report.embeddings = embed_outcome.stored;
        report.embedding_degraded = embed_outcome.degraded;

        // Cross-file edge resolution reads the fully committed symbol table
        report.edges_resolved = self
            .store
            .resolve_pending_edges(repository.id, branch_name)
            .await?;

        Ok(())
    }

    /// Parse, chunk, fingerprint, and persist one file; feed its chunks to
    /// the embedding worker
    async fn process_file(
        &self,
        repository_id: Uuid,
        branch: &str,
        commit_sha: &str,
        path: &str,
        content: &str,
        chunk_tx: mpsc::Sender<(Uuid, CodeChunk)>,
    ) -> Result<FileResult> {
        let first_line = content.lines().next();
        let language = detect_language(path, first_line, &self.config.include_extensions);

        // Parser failures are isolated to the file; it still contributes a
        // whole-file chunk
        let outcome = parse_file(path, content, language);
        let error = if outcome.success {
            None
        } else {
            outcome.error_message.clone()
        };
        let outcome = if outcome.success {
            outcome
        } else {
            ParseOutcome {
                success: false,
                ..Default::default()
            }
        };

        let chunks = chunk_file(&self.config, path, content, language, &outcome.symbols);
        let fingerprints: Vec<(usize, Fingerprint)> = outcome
            .symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| FINGERPRINTED_KINDS.contains(&s.kind))
            .map(|(index, s)| {
                let text = symbol_source(content, s.start_line, s.end_line);
                (index, fingerprint_text(text))
            })
            .collect();

        let persisted = self
            .store
            .persist_file(&FilePersistence {
                repository_id,
                branch,
                commit_sha,
                path,
                language,
                size_bytes: content.len() as i64,
                line_count: content.lines().count() as i32,
                outcome: &outcome,
                chunks: &chunks,
                fingerprints: &fingerprints,
            })
            .await?;

        for (chunk_id, chunk) in persisted.chunk_ids.iter().zip(chunks.into_iter()) {
            // Receiver gone means the embed worker already gave up; chunks
            // remain searchable through the lexical path
            if chunk_tx.send((*chunk_id, chunk)).await.is_err() {
                break;
            }
        }

        Ok(FileResult {
            path: path.to_string(),
            symbols: persisted.symbol_count,
            edges: persisted.edge_count,
            chunks: persisted.chunk_count,
            error,
        })
    }
}

/// Lines `start..=end` of a file (1-based, clamped)
fn symbol_source(content: &str, start_line: u32, end_line: u32) -> &str {
    let mut offsets = Vec::new();
    let mut position = 0usize;
    for line in content.split_inclusive('\n') {
        offsets.push(position);
        position += line.len();
    }
    offsets.push(content.len());
    let start = offsets
        .get(start_line.saturating_sub(1) as usize)
        .copied()
        .unwrap_or(0);
    let end = offsets.get(end_line as usize).copied().unwrap_or(content.len());
    &content[start..end]
}

struct EmbedResult {
    stored: usize,
    degraded: bool,
}

/// Drains parsed chunks, embedding them in batches. A failed batch flips
/// the run into degraded mode: remaining chunks persist without vectors.
async fn embed_worker(
    mut rx: mpsc::Receiver<(Uuid, CodeChunk)>,
    embedder: Arc<EmbeddingClient>,
    store: Store,
    repository_id: Uuid,
    branch: String,
    commit_sha: String,
    batch_size: usize,
) -> EmbedResult {
    let batch_size = batch_size.max(1);
    let mut stored = 0usize;
    let mut degraded = false;
    let mut ids: Vec<Uuid> = Vec::with_capacity(batch_size);
    let mut chunks: Vec<CodeChunk> = Vec::with_capacity(batch_size);

    loop {
        let received = rx.recv().await;
        let received_is_none = received.is_none();
        if let Some((id, chunk)) = received {
            if degraded {
                continue;
            }
            ids.push(id);
            chunks.push(chunk);
            if chunks.len() < batch_size {
                continue;
            }
        }

        if !chunks.is_empty() && !degraded {
            let outcome = embedder.try_generate_chunks(&chunks).await;
            if outcome.success {
                let items: Vec<(Uuid, Vec<f32>)> =
                    ids.drain(..).zip(outcome.vectors.into_iter()).collect();
                match store
                    .insert_embeddings(repository_id, &branch, &commit_sha, &items, &embedder.model_name())
                    .await
                {
                    Ok(count) => stored += count,
                    Err(e) => {
                        warn!(error = %e, "embedding insert failed");
                        degraded = true;
                    }
                }
                chunks.clear();
            } else {
                warn!(
                    code = outcome.error_code.as_deref().unwrap_or("unknown"),
                    transient = outcome.is_transient,
                    "embedding generation unavailable, continuing without vectors"
                );
                degraded = true;
                ids.clear();
                chunks.clear();
            }
        }

        if received_is_none {
            break;
        }
    }

    EmbedResult { stored, degraded }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_source_slices_by_line() {
        let content = "one\ntwo\nthree\nfour\n";
        assert_eq!(symbol_source(content, 2, 3), "two\nthree\n");
        assert_eq!(symbol_source(content, 1, 1), "one\n");
        // Clamped past the end
        assert_eq!(symbol_source(content, 3, 99), "three\nfour\n");
    }
}
