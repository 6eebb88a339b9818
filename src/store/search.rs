//! Retrieval SQL: lexical full-text, dense vector, hybrid fusion, symbol
//! lookup, graph traversal, and fingerprint candidates
//!
//! BM25-style ranking is `ts_rank_cd` with document-length normalization;
//! dense scores are cosine similarity over the HNSW index. The hybrid query
//! full-outer-joins both arms on chunk id and fuses with caller weights.

use anyhow::Result;
use pgvector::Vector;
use std::collections::HashMap;
use uuid::Uuid;

use super::Store;
use crate::types::{EdgeKind, Language, SymbolKind};

/// A chunk returned by any retrieval arm
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChunkHit {
    pub id: Uuid,
    pub file_path: String,
    pub language: Language,
    pub symbol_name: String,
    pub symbol_kind: SymbolKind,
    pub content: String,
    pub start_line: i32,
    pub end_line: i32,
    pub signature: Option<String>,
    pub documentation: Option<String>,
    pub bm25_score: Option<f64>,
    pub vector_score: Option<f64>,
    pub combined_score: f64,
}

/// A symbol returned by exact, trigram, or sparse search
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SymbolHit {
    pub id: Uuid,
    pub file_path: String,
    pub language: Language,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub start_line: i32,
    pub end_line: i32,
    pub signature: Option<String>,
    pub documentation: Option<String>,
    pub score: f64,
}

/// One edge endpoint for reference/dependency listings. Unresolved targets
/// carry a name but no symbol id or location.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RelatedSymbolRow {
    pub symbol_id: Option<Uuid>,
    pub name: String,
    pub symbol_kind: Option<SymbolKind>,
    pub file_path: Option<String>,
    pub edge_kind: EdgeKind,
    pub line: i32,
}

/// One step of a breadth-first call chain
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CallChainRow {
    pub depth: i32,
    pub symbol_id: Option<Uuid>,
    pub name: String,
    pub file_path: Option<String>,
}

/// A near-duplicate candidate matched through any fingerprint band
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FingerprintCandidate {
    pub symbol_id: Uuid,
    pub name: String,
    pub file_path: String,
    pub language: Language,
    pub kind: SymbolKind,
    pub fingerprint: i64,
}

const CHUNK_COLUMNS: &str = "c.id, c.file_path, c.language, c.symbol_name, c.symbol_kind, \
     c.content, c.start_line, c.end_line, c.signature, c.documentation";

impl Store {
    /// Lexical full-text search over chunk content
    pub async fn search_chunks_fulltext(
        &self,
        query: &str,
        repository_id: Uuid,
        branch: &str,
        language: Option<Language>,
        limit: i64,
    ) -> Result<Vec<ChunkHit>> {
        let sql = format!(
            r#"
            SELECT {CHUNK_COLUMNS},
                   ts_rank_cd(c.search_vector, q, 4)::float8 AS bm25_score,
                   NULL::float8 AS vector_score,
                   ts_rank_cd(c.search_vector, q, 4)::float8 AS combined_score
            FROM code_chunks c
            CROSS JOIN plainto_tsquery('simple', $1) q
            WHERE c.repository_id = $2 AND c.branch = $3
              AND ($4::language IS NULL OR c.language = $4)
              AND c.search_vector @@ q
            ORDER BY combined_score DESC
            LIMIT $5
            "#
        );
        let hits = sqlx::query_as::<_, ChunkHit>(&sql)
            .bind(query)
            .bind(repository_id)
            .bind(branch)
            .bind(language)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(hits)
    }

    /// Approximate nearest neighbors by cosine similarity
    pub async fn search_embeddings_cosine(
        &self,
        vector: &[f32],
        repository_id: Uuid,
        branch: &str,
        limit: i64,
    ) -> Result<Vec<ChunkHit>> {
        let sql = format!(
            r#"
            SELECT {CHUNK_COLUMNS},
                   NULL::float8 AS bm25_score,
                   (1 - (e.embedding <=> $1))::float8 AS vector_score,
                   (1 - (e.embedding <=> $1))::float8 AS combined_score
            FROM embeddings e
            JOIN code_chunks c ON c.id = e.chunk_id
            WHERE e.repository_id = $2 AND e.branch = $3
            ORDER BY e.embedding <=> $1
            LIMIT $4
            "#
        );
        let hits = sqlx::query_as::<_, ChunkHit>(&sql)
            .bind(Vector::from(vector.to_vec()))
            .bind(repository_id)
            .bind(branch)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(hits)
    }

    /// L2-distance accessor kept for debugging embeddings; scores are raw
    /// distances, ascending
    pub async fn search_embeddings_l2(
        &self,
        vector: &[f32],
        repository_id: Uuid,
        branch: &str,
        limit: i64,
    ) -> Result<Vec<ChunkHit>> {
        let sql = format!(
            r#"
            SELECT {CHUNK_COLUMNS},
                   NULL::float8 AS bm25_score,
                   (e.embedding <-> $1)::float8 AS vector_score,
                   (e.embedding <-> $1)::float8 AS combined_score
            FROM embeddings e
            JOIN code_chunks c ON c.id = e.chunk_id
            WHERE e.repository_id = $2 AND e.branch = $3
            ORDER BY e.embedding <-> $1
            LIMIT $4
            "#
        );
        let hits = sqlx::query_as::<_, ChunkHit>(&sql)
            .bind(Vector::from(vector.to_vec()))
            .bind(repository_id)
            .bind(branch)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(hits)
    }

    /// Hybrid retrieval: both arms evaluated, full-outer-joined on chunk id,
    /// fused as `bm25_weight·bm25 + vector_weight·similarity`. With no
    /// vector the same call degrades to pure lexical ranking.
    #[allow(clippy::too_many_arguments)]
    pub async fn hybrid_search(
        &self,
        query: &str,
        vector: Option<&[f32]>,
        repository_id: Uuid,
        branch: &str,
        language: Option<Language>,
        bm25_weight: f64,
        vector_weight: f64,
        limit: i64,
    ) -> Result<Vec<ChunkHit>> {
        let Some(vector) = vector else {
            return self
                .search_chunks_fulltext(query, repository_id, branch, language, limit)
                .await;
        };

        let sql = format!(
            r#"
            WITH lexical AS (
                SELECT c.id,
                       ts_rank_cd(c.search_vector, plainto_tsquery('simple', $1), 4)::float8 AS bm25
                FROM code_chunks c
                WHERE c.repository_id = $3 AND c.branch = $4
                  AND ($5::language IS NULL OR c.language = $5)
                  AND c.search_vector @@ plainto_tsquery('simple', $1)
                ORDER BY bm25 DESC
                LIMIT $8
            ),
            dense AS (
                SELECT e.chunk_id AS id,
                       (1 - (e.embedding <=> $2))::float8 AS similarity
                FROM embeddings e
                WHERE e.repository_id = $3 AND e.branch = $4
                ORDER BY e.embedding <=> $2
                LIMIT $8
            )
            SELECT {CHUNK_COLUMNS},
                   l.bm25 AS bm25_score,
                   d.similarity AS vector_score,
                   (COALESCE(l.bm25, 0) * $6 + COALESCE(d.similarity, 0) * $7)::float8
                       AS combined_score
            FROM lexical l
            FULL OUTER JOIN dense d ON l.id = d.id
            JOIN code_chunks c ON c.id = COALESCE(l.id, d.id)
            WHERE ($5::language IS NULL OR c.language = $5)
            ORDER BY combined_score DESC
            LIMIT $8
            "#
        );
        let hits = sqlx::query_as::<_, ChunkHit>(&sql)
            .bind(query)
            .bind(Vector::from(vector.to_vec()))
            .bind(repository_id)
            .bind(branch)
            .bind(language)
            .bind(bm25_weight)
            .bind(vector_weight)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(hits)
    }

    /// Symbol lookup: exact case-insensitive match, or trigram similarity
    /// when `fuzzy` is set. An empty query returns no rows.
    pub async fn search_symbols(
        &self,
        query: &str,
        repository_id: Uuid,
        branch: &str,
        kind: Option<SymbolKind>,
        fuzzy: bool,
        limit: i64,
    ) -> Result<Vec<SymbolHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let sql = if fuzzy {
            r#"
            SELECT s.id, s.file_path, s.language, s.name, s.qualified_name, s.kind,
                   s.start_line, s.end_line, s.signature, s.documentation,
                   similarity(s.name, $1)::float8 AS score
            FROM symbols s
            WHERE s.repository_id = $2 AND s.branch = $3
              AND ($4::symbol_kind IS NULL OR s.kind = $4)
              AND similarity(s.name, $1) > 0.3
            ORDER BY score DESC, s.file_path, s.start_line
            LIMIT $5
            "#
        } else {
            r#"
            SELECT s.id, s.file_path, s.language, s.name, s.qualified_name, s.kind,
                   s.start_line, s.end_line, s.signature, s.documentation,
                   1.0::float8 AS score
            FROM symbols s
            WHERE s.repository_id = $2 AND s.branch = $3
              AND ($4::symbol_kind IS NULL OR s.kind = $4)
              AND (LOWER(s.name) = LOWER($1) OR LOWER(s.qualified_name) = LOWER($1))
            ORDER BY s.file_path, s.start_line
            LIMIT $5
            "#
        };
        let hits = sqlx::query_as::<_, SymbolHit>(sql)
            .bind(query)
            .bind(repository_id)
            .bind(branch)
            .bind(kind)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(hits)
    }

    /// BM25-style search over the weighted sparse symbol index
    pub async fn search_symbols_sparse(
        &self,
        query: &str,
        repository_id: Uuid,
        branch: &str,
        limit: i64,
    ) -> Result<Vec<SymbolHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let hits = sqlx::query_as::<_, SymbolHit>(
            r#"
            SELECT s.id, s.file_path, s.language, s.name, s.qualified_name, s.kind,
                   s.start_line, s.end_line, s.signature, s.documentation,
                   ts_rank_cd(ss.search_vector, q, 4)::float8 AS score
            FROM symbol_search ss
            JOIN symbols s ON s.id = ss.symbol_id
            CROSS JOIN plainto_tsquery('simple', $1) q
            WHERE ss.repository_id = $2 AND ss.branch = $3
              AND ss.search_vector @@ q
            ORDER BY score DESC
            LIMIT $4
            "#,
        )
        .bind(query)
        .bind(repository_id)
        .bind(branch)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(hits)
    }

    /// Incoming edges: who points at this symbol. Unresolved edges naming
    /// the symbol are matched by its name and qualified name.
    pub async fn find_references(
        &self,
        target_symbol_id: Uuid,
        target_name: &str,
        target_qualified_name: &str,
        kind: Option<EdgeKind>,
        limit: i64,
    ) -> Result<Vec<RelatedSymbolRow>> {
        let rows = sqlx::query_as::<_, RelatedSymbolRow>(
            r#"
            SELECT s.id AS symbol_id, s.name, s.kind AS symbol_kind,
                   s.file_path, e.kind AS edge_kind, e.source_line AS line
            FROM edges e
            JOIN symbols s ON s.id = e.source_symbol_id
            WHERE (e.target_symbol_id = $1
                   OR LOWER(e.target_name) IN (LOWER($2), LOWER($3)))
              AND ($4::edge_kind IS NULL OR e.kind = $4)
            ORDER BY e.kind, s.file_path, e.source_line
            LIMIT $5
            "#,
        )
        .bind(target_symbol_id)
        .bind(target_name)
        .bind(target_qualified_name)
        .bind(kind)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Outgoing edges: what this symbol points at, resolved or not
    pub async fn find_dependencies(
        &self,
        source_symbol_id: Uuid,
        kind: Option<EdgeKind>,
        limit: i64,
    ) -> Result<Vec<RelatedSymbolRow>> {
        let rows = sqlx::query_as::<_, RelatedSymbolRow>(
            r#"
            SELECT s.id AS symbol_id,
                   COALESCE(s.name, e.target_name, '') AS name,
                   s.kind AS symbol_kind, s.file_path,
                   e.kind AS edge_kind, e.source_line AS line
            FROM edges e
            LEFT JOIN symbols s ON s.id = e.target_symbol_id
            WHERE e.source_symbol_id = $1
              AND ($2::edge_kind IS NULL OR e.kind = $2)
            ORDER BY e.kind, e.source_line
            LIMIT $3
            "#,
        )
        .bind(source_symbol_id)
        .bind(kind)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Breadth-first traversal over Calls edges, bounded by depth; cycles
    /// are cut by tracking visited sources per path
    pub async fn find_call_chain(
        &self,
        start_symbol_id: Uuid,
        max_depth: i32,
    ) -> Result<Vec<CallChainRow>> {
        let rows = sqlx::query_as::<_, CallChainRow>(
            r#"
            WITH RECURSIVE chain AS (
                SELECT e.source_symbol_id, e.target_symbol_id, e.target_name,
                       1 AS depth, ARRAY[e.source_symbol_id] AS seen
                FROM edges e
                WHERE e.source_symbol_id = $1 AND e.kind = 'calls'
                UNION ALL
                SELECT e.source_symbol_id, e.target_symbol_id, e.target_name,
                       c.depth + 1, c.seen || e.source_symbol_id
                FROM edges e
                JOIN chain c ON e.source_symbol_id = c.target_symbol_id
                WHERE e.kind = 'calls'
                  AND c.depth < $2
                  AND NOT e.source_symbol_id = ANY(c.seen)
            )
            SELECT c.depth, s.id AS symbol_id,
                   COALESCE(s.name, c.target_name, '') AS name,
                   s.file_path
            FROM chain c
            LEFT JOIN symbols s ON s.id = c.target_symbol_id
            ORDER BY c.depth, name
            "#,
        )
        .bind(start_symbol_id)
        .bind(max_depth)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Near-duplicate candidates: rows matching any one of the four LSH
    /// bands (a union, per band-collision semantics)
    #[allow(clippy::too_many_arguments)]
    pub async fn find_fingerprint_candidates(
        &self,
        repository_id: Uuid,
        branch: &str,
        language: Language,
        kind: SymbolKind,
        kind_tag: &str,
        bands: [u16; 4],
        limit: i64,
    ) -> Result<Vec<FingerprintCandidate>> {
        let rows = sqlx::query_as::<_, FingerprintCandidate>(
            r#"
            SELECT f.symbol_id, s.name, f.file_path, f.language, f.kind, f.fingerprint
            FROM symbol_fingerprints f
            JOIN symbols s ON s.id = f.symbol_id
            WHERE f.repository_id = $1 AND f.branch = $2
              AND f.language = $3 AND f.kind = $4 AND f.fingerprint_kind = $5
              AND (f.band0 = $6 OR f.band1 = $7 OR f.band2 = $8 OR f.band3 = $9)
            LIMIT $10
            "#,
        )
        .bind(repository_id)
        .bind(branch)
        .bind(language)
        .bind(kind)
        .bind(kind_tag)
        .bind(bands[0] as i32)
        .bind(bands[1] as i32)
        .bind(bands[2] as i32)
        .bind(bands[3] as i32)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Fetch full symbol rows by id, preserving no particular order
    pub async fn get_symbols_by_ids(&self, symbol_ids: &[Uuid]) -> Result<Vec<SymbolHit>> {
        if symbol_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, SymbolHit>(
            r#"
            SELECT s.id, s.file_path, s.language, s.name, s.qualified_name, s.kind,
                   s.start_line, s.end_line, s.signature, s.documentation,
                   1.0::float8 AS score
            FROM symbols s
            WHERE s.id = ANY($1)
            "#,
        )
        .bind(symbol_ids)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// A symbol's stored fingerprint bands, for near-duplicate expansion
    pub async fn get_fingerprint_bands(&self, symbol_id: Uuid) -> Result<Option<[u16; 4]>> {
        let row = sqlx::query_as::<_, (i32, i32, i32, i32)>(
            "SELECT band0, band1, band2, band3 FROM symbol_fingerprints WHERE symbol_id = $1",
        )
        .bind(symbol_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|(b0, b1, b2, b3)| [b0 as u16, b1 as u16, b2 as u16, b3 as u16]))
    }

    /// Incoming/outgoing edge counts for the graph re-ranking boost
    pub async fn edge_degrees(&self, symbol_ids: &[Uuid]) -> Result<HashMap<Uuid, (i64, i64)>> {
        if symbol_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (Uuid, i64, i64)>(
            r#"
            SELECT s.id,
                   (SELECT COUNT(*) FROM edges e WHERE e.target_symbol_id = s.id),
                   (SELECT COUNT(*) FROM edges e WHERE e.source_symbol_id = s.id)
            FROM symbols s
            WHERE s.id = ANY($1)
            "#,
        )
        .bind(symbol_ids)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, incoming, outgoing)| (id, (incoming, outgoing)))
            .collect())
    }

    /// The chunk anchored on a symbol, for navigation results
    pub async fn chunk_for_symbol(&self, symbol_id: Uuid) -> Result<Option<ChunkHit>> {
        let sql = format!(
            r#"
            SELECT {CHUNK_COLUMNS},
                   NULL::float8 AS bm25_score,
                   NULL::float8 AS vector_score,
                   1.0::float8 AS combined_score
            FROM code_chunks c
            WHERE c.symbol_id = $1
            ORDER BY c.start_line
            LIMIT 1
            "#
        );
        let hit = sqlx::query_as::<_, ChunkHit>(&sql)
            .bind(symbol_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(hit)
    }
}
