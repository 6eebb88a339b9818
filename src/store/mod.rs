//! Durable, transactional storage over PostgreSQL
//!
//! Every entity is written through natural-key upserts so re-indexing a
//! branch converges idempotently. Writes for one file are a single
//! transaction ordered File → Symbols → Edges → Chunks; embeddings follow in
//! their own batch once the embedder responds.

pub mod schema;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::fingerprint::FINGERPRINT_KIND;
use crate::git::CommitDetails;
use crate::parsing::ParseOutcome;
use crate::types::{CodeChunk, EdgeTarget, Fingerprint, IndexState, Language};

/// Row representing a configured repository
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepositoryRow {
    pub id: Uuid,
    pub name: String,
    pub remote_url: String,
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row representing a tracked branch
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BranchRow {
    pub id: Uuid,
    pub repository_id: Uuid,
    pub name: String,
    pub head_commit: String,
    pub indexed_commit: Option<String>,
    pub state: IndexState,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
}

/// Everything the pipeline persists for one parsed file
pub struct FilePersistence<'a> {
    pub repository_id: Uuid,
    pub branch: &'a str,
    pub commit_sha: &'a str,
    pub path: &'a str,
    pub language: Language,
    pub size_bytes: i64,
    pub line_count: i32,
    pub outcome: &'a ParseOutcome,
    pub chunks: &'a [CodeChunk],
    /// (symbol index, fingerprint) pairs computed over symbol source text
    pub fingerprints: &'a [(usize, Fingerprint)],
}

/// Ids and counts produced by one file's persistence transaction
#[derive(Debug, Default)]
pub struct PersistedFile {
    pub chunk_ids: Vec<Uuid>,
    pub symbol_count: usize,
    pub edge_count: usize,
    pub chunk_count: usize,
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    embedding_dims: usize,
}

impl Store {
    /// Open a connection pool with the configured bounds and per-statement
    /// timeout
    pub async fn connect(config: &DatabaseConfig, embedding_dims: usize) -> Result<Self> {
        let timeout = format!("{}s", config.command_timeout_seconds);
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password)
            .options([("statement_timeout", timeout.as_str())]);

        let pool = PgPoolOptions::new()
            .min_connections(config.min_pool)
            .max_connections(config.max_pool)
            .acquire_timeout(Duration::from_secs(config.command_timeout_seconds))
            .connect_with(options)
            .await
            .context("failed to connect to database")?;

        Ok(Self {
            pool,
            embedding_dims,
        })
    }

    pub fn from_pool(pool: PgPool, embedding_dims: usize) -> Self {
        Self {
            pool,
            embedding_dims,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn embedding_dims(&self) -> usize {
        self.embedding_dims
    }

    /// Create extensions, enum types, tables, and indexes
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in schema::schema_statements(self.embedding_dims) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("schema statement failed: {statement}"))?;
        }
        Ok(())
    }

    // ---- repositories ----

    pub async fn upsert_repository(
        &self,
        name: &str,
        remote_url: &str,
        default_branch: &str,
    ) -> Result<RepositoryRow> {
        let row = sqlx::query_as::<_, RepositoryRow>(
            r#"
            INSERT INTO repositories (name, remote_url, default_branch)
            VALUES ($1, $2, $3)
            ON CONFLICT (name)
            DO UPDATE SET
                remote_url = EXCLUDED.remote_url,
                default_branch = EXCLUDED.default_branch,
                updated_at = NOW()
            RETURNING id, name, remote_url, default_branch, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(remote_url)
        .bind(default_branch)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_repository(&self, name: &str) -> Result<Option<RepositoryRow>> {
        let row = sqlx::query_as::<_, RepositoryRow>(
            "SELECT id, name, remote_url, default_branch, created_at, updated_at \
             FROM repositories WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_repository_names(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM repositories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    /// Administrative removal; every dependent row cascades
    pub async fn delete_repository(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM repositories WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- branches ----

    /// Create or refresh a branch row. A completed branch whose head moved
    /// past its indexed commit flips to Stale here.
    pub async fn upsert_branch(
        &self,
        repository_id: Uuid,
        name: &str,
        head_commit: &str,
    ) -> Result<BranchRow> {
        let row = sqlx::query_as::<_, BranchRow>(
            r#"
            INSERT INTO branches (repository_id, name, head_commit, state)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (repository_id, name)
            DO UPDATE SET
                head_commit = EXCLUDED.head_commit,
                last_accessed_at = NOW(),
                state = CASE
                    WHEN branches.state = 'completed'
                         AND branches.indexed_commit IS DISTINCT FROM EXCLUDED.head_commit
                    THEN 'stale'::index_state
                    ELSE branches.state
                END
            RETURNING id, repository_id, name, head_commit, indexed_commit, state,
                      last_indexed_at, last_accessed_at
            "#,
        )
        .bind(repository_id)
        .bind(name)
        .bind(head_commit)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_branch(&self, repository_id: Uuid, name: &str) -> Result<Option<BranchRow>> {
        let row = sqlx::query_as::<_, BranchRow>(
            "SELECT id, repository_id, name, head_commit, indexed_commit, state, \
                    last_indexed_at, last_accessed_at \
             FROM branches WHERE repository_id = $1 AND name = $2",
        )
        .bind(repository_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_branch_names(&self, repository_id: Uuid) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT name FROM branches WHERE repository_id = $1 ORDER BY name",
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    pub async fn set_branch_state(
        &self,
        repository_id: Uuid,
        name: &str,
        state: IndexState,
    ) -> Result<()> {
        sqlx::query("UPDATE branches SET state = $3 WHERE repository_id = $1 AND name = $2")
            .bind(repository_id)
            .bind(name)
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Advance the indexed cursor atomically at the end of a successful run
    pub async fn mark_branch_indexed(
        &self,
        repository_id: Uuid,
        name: &str,
        head_commit: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE branches SET indexed_commit = $3, head_commit = $3, state = 'completed', \
             last_indexed_at = NOW() WHERE repository_id = $1 AND name = $2",
        )
        .bind(repository_id)
        .bind(name)
        .bind(head_commit)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn touch_branch(&self, repository_id: Uuid, name: &str) -> Result<()> {
        sqlx::query(
            "UPDATE branches SET last_accessed_at = NOW() \
             WHERE repository_id = $1 AND name = $2",
        )
        .bind(repository_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark Completed branches idle since before the cutoff as Stale.
    /// Derived rows are left for the next re-index of each branch to clear.
    pub async fn sweep_stale_branches(
        &self,
        idle_cutoff: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, String)>> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "UPDATE branches SET state = 'stale' \
             WHERE state = 'completed' AND last_accessed_at < $1 \
             RETURNING repository_id, name",
        )
        .bind(idle_cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Drop every derived row for a branch ahead of a full rebuild
    pub async fn delete_branch_derived(&self, repository_id: Uuid, branch: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["code_chunks", "symbols", "files"] {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE repository_id = $1 AND branch = $2"
            ))
            .bind(repository_id)
            .bind(branch)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ---- commits ----

    pub async fn record_commit(&self, repository_id: Uuid, details: &CommitDetails) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO commits (repository_id, sha, branch, author, message, committed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (repository_id, sha, branch) DO NOTHING
            "#,
        )
        .bind(repository_id)
        .bind(&details.sha)
        .bind(&details.branch)
        .bind(&details.author)
        .bind(&details.message)
        .bind(details.committed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- per-file persistence ----

    /// Remove every row derived from one file path (used for deletions and
    /// ahead of re-parsing a modified file)
    pub async fn delete_file_rows(
        &self,
        repository_id: Uuid,
        branch: &str,
        path: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM code_chunks WHERE repository_id = $1 AND branch = $2 AND file_path = $3",
        )
        .bind(repository_id)
        .bind(branch)
        .bind(path)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM symbols WHERE repository_id = $1 AND branch = $2 AND file_path = $3",
        )
        .bind(repository_id)
        .bind(branch)
        .bind(path)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM files WHERE repository_id = $1 AND branch = $2 AND path = $3")
            .bind(repository_id)
            .bind(branch)
            .bind(path)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Persist one file's parse output in a single ordered transaction:
    /// File → Symbols → Edges → Chunks (embeddings follow separately).
    #[instrument(skip(self, file), fields(path = %file.path))]
    pub async fn persist_file(&self, file: &FilePersistence<'_>) -> Result<PersistedFile> {
        let mut tx = self.pool.begin().await?;
        let mut persisted = PersistedFile::default();

        // Rows from earlier commits of this path are superseded
        sqlx::query(
            "DELETE FROM code_chunks WHERE repository_id = $1 AND branch = $2 AND file_path = $3",
        )
        .bind(file.repository_id)
        .bind(file.branch)
        .bind(file.path)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM symbols WHERE repository_id = $1 AND branch = $2 AND file_path = $3",
        )
        .bind(file.repository_id)
        .bind(file.branch)
        .bind(file.path)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM files WHERE repository_id = $1 AND branch = $2 AND path = $3 \
             AND commit_sha <> $4",
        )
        .bind(file.repository_id)
        .bind(file.branch)
        .bind(file.path)
        .bind(file.commit_sha)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO files (repository_id, branch, commit_sha, path, language, size_bytes, line_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (repository_id, branch, commit_sha, path)
            DO UPDATE SET
                language = EXCLUDED.language,
                size_bytes = EXCLUDED.size_bytes,
                line_count = EXCLUDED.line_count,
                indexed_at = NOW()
            "#,
        )
        .bind(file.repository_id)
        .bind(file.branch)
        .bind(file.commit_sha)
        .bind(file.path)
        .bind(file.language)
        .bind(file.size_bytes)
        .bind(file.line_count)
        .execute(&mut *tx)
        .await?;

        // Symbols, in source order so parents precede children
        let mut symbol_ids: Vec<Uuid> = Vec::with_capacity(file.outcome.symbols.len());
        for symbol in &file.outcome.symbols {
            let parent_id = symbol.parent.and_then(|p| symbol_ids.get(p).copied());
            let id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO symbols (
                    repository_id, branch, commit_sha, file_path, name, qualified_name,
                    kind, start_line, end_line, start_column, end_column,
                    signature, documentation, modifiers, parent_symbol_id, language
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                ON CONFLICT (repository_id, branch, file_path, name, start_line, end_line)
                DO UPDATE SET
                    commit_sha = EXCLUDED.commit_sha,
                    qualified_name = EXCLUDED.qualified_name,
                    kind = EXCLUDED.kind,
                    start_column = EXCLUDED.start_column,
                    end_column = EXCLUDED.end_column,
                    signature = EXCLUDED.signature,
                    documentation = EXCLUDED.documentation,
                    modifiers = EXCLUDED.modifiers,
                    parent_symbol_id = EXCLUDED.parent_symbol_id,
                    language = EXCLUDED.language,
                    indexed_at = NOW()
                RETURNING id
                "#,
            )
            .bind(file.repository_id)
            .bind(file.branch)
            .bind(file.commit_sha)
            .bind(file.path)
            .bind(&symbol.name)
            .bind(&symbol.qualified_name)
            .bind(symbol.kind)
            .bind(symbol.start_line as i32)
            .bind(symbol.end_line as i32)
            .bind(symbol.start_column as i32)
            .bind(symbol.end_column as i32)
            .bind(&symbol.signature)
            .bind(&symbol.documentation)
            .bind(&symbol.modifiers)
            .bind(parent_id)
            .bind(file.language)
            .fetch_one(&mut *tx)
            .await?;
            symbol_ids.push(id);
        }
        persisted.symbol_count = symbol_ids.len();

        // In-file edge targets resolve immediately; the rest keep their
        // qualified name for the cross-file pass
        let mut by_name: HashMap<&str, Uuid> = HashMap::new();
        for (symbol, id) in file.outcome.symbols.iter().zip(&symbol_ids) {
            by_name.entry(symbol.qualified_name.as_str()).or_insert(*id);
            by_name.entry(symbol.name.as_str()).or_insert(*id);
        }

        for edge in &file.outcome.edges {
            let Some(source_id) = symbol_ids.get(edge.source).copied() else {
                continue;
            };
            let (target_id, target_name): (Option<Uuid>, Option<&str>) = match &edge.target {
                EdgeTarget::Symbol(index) => (symbol_ids.get(*index).copied(), None),
                EdgeTarget::Name(name) => match by_name.get(name.as_str()) {
                    Some(id) => (Some(*id), None),
                    None => (None, Some(name.as_str())),
                },
            };
            if target_id.is_none() && target_name.is_none() {
                continue;
            }
            sqlx::query(
                r#"
                INSERT INTO edges (
                    source_symbol_id, target_symbol_id, target_name, kind,
                    repository_id, branch, commit_sha, source_file_path, source_line
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(source_id)
            .bind(target_id)
            .bind(target_name)
            .bind(edge.kind)
            .bind(file.repository_id)
            .bind(file.branch)
            .bind(file.commit_sha)
            .bind(file.path)
            .bind(edge.line as i32)
            .execute(&mut *tx)
            .await?;
            persisted.edge_count += 1;
        }

        // Sparse search rows ride along with their symbols
        for (symbol, id) in file.outcome.symbols.iter().zip(&symbol_ids) {
            let snippet = symbol
                .signature
                .clone()
                .unwrap_or_else(|| symbol.qualified_name.clone());
            sqlx::query(
                r#"
                INSERT INTO symbol_search (
                    symbol_id, repository_id, branch, commit_sha, file_path, language, kind,
                    name, qualified_name, signature, documentation, literal_text, snippet,
                    search_vector
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    setweight(to_tsvector('simple', $8), 'A')
                    || setweight(to_tsvector('simple', $9), 'B')
                    || setweight(to_tsvector('simple', COALESCE($10, '')), 'C')
                    || setweight(to_tsvector('simple', COALESCE($11, '') || ' ' || COALESCE($12, '')), 'D'))
                ON CONFLICT (symbol_id)
                DO UPDATE SET
                    commit_sha = EXCLUDED.commit_sha,
                    signature = EXCLUDED.signature,
                    documentation = EXCLUDED.documentation,
                    literal_text = EXCLUDED.literal_text,
                    snippet = EXCLUDED.snippet,
                    search_vector = EXCLUDED.search_vector
                "#,
            )
            .bind(id)
            .bind(file.repository_id)
            .bind(file.branch)
            .bind(file.commit_sha)
            .bind(file.path)
            .bind(file.language)
            .bind(symbol.kind)
            .bind(&symbol.name)
            .bind(&symbol.qualified_name)
            .bind(&symbol.signature)
            .bind(&symbol.documentation)
            .bind(Option::<String>::None)
            .bind(snippet)
            .execute(&mut *tx)
            .await?;
        }

        for (index, fingerprint) in file.fingerprints {
            let Some(symbol_id) = symbol_ids.get(*index).copied() else {
                continue;
            };
            let symbol = &file.outcome.symbols[*index];
            sqlx::query(
                r#"
                INSERT INTO symbol_fingerprints (
                    symbol_id, repository_id, branch, commit_sha, file_path, language, kind,
                    fingerprint_kind, fingerprint, band0, band1, band2, band3
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (symbol_id)
                DO UPDATE SET
                    commit_sha = EXCLUDED.commit_sha,
                    fingerprint = EXCLUDED.fingerprint,
                    band0 = EXCLUDED.band0,
                    band1 = EXCLUDED.band1,
                    band2 = EXCLUDED.band2,
                    band3 = EXCLUDED.band3,
                    indexed_at = NOW()
                "#,
            )
            .bind(symbol_id)
            .bind(file.repository_id)
            .bind(file.branch)
            .bind(file.commit_sha)
            .bind(file.path)
            .bind(file.language)
            .bind(symbol.kind)
            .bind(FINGERPRINT_KIND)
            .bind(fingerprint.bits as i64)
            .bind(fingerprint.bands[0] as i32)
            .bind(fingerprint.bands[1] as i32)
            .bind(fingerprint.bands[2] as i32)
            .bind(fingerprint.bands[3] as i32)
            .execute(&mut *tx)
            .await?;
        }

        for chunk in file.chunks {
            let symbol_id = file
                .outcome
                .symbols
                .iter()
                .position(|s| {
                    s.name == chunk.symbol_name && s.start_line == chunk.symbol_start_line
                })
                .and_then(|index| symbol_ids.get(index).copied());
            let id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO code_chunks (
                    repository_id, branch, commit_sha, file_path, symbol_id, symbol_name,
                    symbol_kind, language, content, symbol_start_line, symbol_end_line,
                    start_line, end_line, token_count, parent_symbol, signature, documentation
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                ON CONFLICT (repository_id, branch, file_path, start_line, end_line)
                DO UPDATE SET
                    commit_sha = EXCLUDED.commit_sha,
                    symbol_id = EXCLUDED.symbol_id,
                    symbol_name = EXCLUDED.symbol_name,
                    symbol_kind = EXCLUDED.symbol_kind,
                    content = EXCLUDED.content,
                    symbol_start_line = EXCLUDED.symbol_start_line,
                    symbol_end_line = EXCLUDED.symbol_end_line,
                    token_count = EXCLUDED.token_count,
                    parent_symbol = EXCLUDED.parent_symbol,
                    signature = EXCLUDED.signature,
                    documentation = EXCLUDED.documentation
                RETURNING id
                "#,
            )
            .bind(file.repository_id)
            .bind(file.branch)
            .bind(file.commit_sha)
            .bind(file.path)
            .bind(symbol_id)
            .bind(&chunk.symbol_name)
            .bind(chunk.symbol_kind)
            .bind(chunk.language)
            .bind(&chunk.content)
            .bind(chunk.symbol_start_line as i32)
            .bind(chunk.symbol_end_line as i32)
            .bind(chunk.start_line as i32)
            .bind(chunk.end_line as i32)
            .bind(chunk.token_count as i32)
            .bind(&chunk.parent_symbol)
            .bind(&chunk.signature)
            .bind(&chunk.documentation)
            .fetch_one(&mut *tx)
            .await?;
            persisted.chunk_ids.push(id);
        }
        persisted.chunk_count = persisted.chunk_ids.len();

        tx.commit().await?;
        debug!(
            symbols = persisted.symbol_count,
            edges = persisted.edge_count,
            chunks = persisted.chunk_count,
            "persisted file"
        );
        Ok(persisted)
    }

    /// Attach embeddings to chunks, one batch per call
    pub async fn insert_embeddings(
        &self,
        repository_id: Uuid,
        branch: &str,
        commit_sha: &str,
        items: &[(Uuid, Vec<f32>)],
        model_name: &str,
    ) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for (chunk_id, vector) in items {
            sqlx::query(
                r#"
                INSERT INTO embeddings (
                    chunk_id, repository_id, branch, commit_sha, embedding, dims, model_name
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (chunk_id)
                DO UPDATE SET
                    commit_sha = EXCLUDED.commit_sha,
                    embedding = EXCLUDED.embedding,
                    dims = EXCLUDED.dims,
                    model_name = EXCLUDED.model_name,
                    generated_at = NOW()
                "#,
            )
            .bind(chunk_id)
            .bind(repository_id)
            .bind(branch)
            .bind(commit_sha)
            .bind(Vector::from(vector.clone()))
            .bind(vector.len() as i32)
            .bind(model_name)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(items.len())
    }

    /// Second-pass cross-file edge resolution against the committed symbol
    /// table, matching on the case-insensitive qualified name
    pub async fn resolve_pending_edges(&self, repository_id: Uuid, branch: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE edges e
            SET target_symbol_id = s.id
            FROM symbols s
            WHERE e.repository_id = $1 AND e.branch = $2
              AND e.target_symbol_id IS NULL
              AND s.repository_id = e.repository_id AND s.branch = e.branch
              AND LOWER(s.qualified_name) = LOWER(e.target_name)
            "#,
        )
        .bind(repository_id)
        .bind(branch)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
