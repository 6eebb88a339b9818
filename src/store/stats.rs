//! Per-repository statistics snapshots
//!
//! Counts, language distribution, and hot symbols, collected after indexing
//! runs and cached in `repository_stats` for cheap reads. The benchmark
//! harness also uses the raw collection path for its before/after deltas.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::Store;

/// A frequently-referenced symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotSymbol {
    pub name: String,
    pub file_path: String,
    pub reference_count: i64,
}

/// Snapshot of one repository's index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub branch_count: i64,
    pub file_count: i64,
    pub symbol_count: i64,
    pub edge_count: i64,
    pub chunk_count: i64,
    pub embedding_count: i64,
    /// Files per language
    pub languages: BTreeMap<String, i64>,
    pub hot_symbols: Vec<HotSymbol>,
}

impl Store {
    /// Collect statistics directly from the entity tables
    pub async fn collect_repository_stats(&self, repository_id: Uuid) -> Result<RepositoryStats> {
        let mut stats = RepositoryStats::default();

        for (table, slot) in [
            ("branches", 0usize),
            ("files", 1),
            ("symbols", 2),
            ("edges", 3),
            ("code_chunks", 4),
            ("embeddings", 5),
        ] {
            let count = sqlx::query_scalar::<_, i64>(&format!(
                "SELECT COUNT(*) FROM {table} WHERE repository_id = $1"
            ))
            .bind(repository_id)
            .fetch_one(self.pool())
            .await?;
            match slot {
                0 => stats.branch_count = count,
                1 => stats.file_count = count,
                2 => stats.symbol_count = count,
                3 => stats.edge_count = count,
                4 => stats.chunk_count = count,
                _ => stats.embedding_count = count,
            }
        }

        let languages = sqlx::query_as::<_, (String, i64)>(
            "SELECT language::text, COUNT(*) FROM files \
             WHERE repository_id = $1 GROUP BY language ORDER BY COUNT(*) DESC",
        )
        .bind(repository_id)
        .fetch_all(self.pool())
        .await?;
        stats.languages = languages.into_iter().collect();

        let hot = sqlx::query_as::<_, (String, String, i64)>(
            r#"
            SELECT s.name, s.file_path, COUNT(*) AS refs
            FROM edges e
            JOIN symbols s ON s.id = e.target_symbol_id
            WHERE e.repository_id = $1
            GROUP BY s.id, s.name, s.file_path
            ORDER BY refs DESC
            LIMIT 10
            "#,
        )
        .bind(repository_id)
        .fetch_all(self.pool())
        .await?;
        stats.hot_symbols = hot
            .into_iter()
            .map(|(name, file_path, reference_count)| HotSymbol {
                name,
                file_path,
                reference_count,
            })
            .collect();

        Ok(stats)
    }

    /// Collect and cache the snapshot; safe to run concurrently with reads
    pub async fn refresh_repository_stats(&self, repository_id: Uuid) -> Result<RepositoryStats> {
        let stats = self.collect_repository_stats(repository_id).await?;
        sqlx::query(
            r#"
            INSERT INTO repository_stats (repository_id, snapshot)
            VALUES ($1, $2)
            ON CONFLICT (repository_id)
            DO UPDATE SET snapshot = EXCLUDED.snapshot, refreshed_at = NOW()
            "#,
        )
        .bind(repository_id)
        .bind(serde_json::to_value(&stats)?)
        .execute(self.pool())
        .await?;
        Ok(stats)
    }

    /// Total size of the backing database, for benchmark deltas
    pub async fn database_size_bytes(&self) -> Result<i64> {
        let size =
            sqlx::query_scalar::<_, i64>("SELECT pg_database_size(current_database())")
                .fetch_one(self.pool())
                .await?;
        Ok(size)
    }
}
