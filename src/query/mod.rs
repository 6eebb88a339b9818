//! The hybrid query orchestrator
//!
//! Turns a raw natural-language query into a ranked, compacted list of code
//! results: intent detection → query parsing → intent-specific retrieval →
//! graph re-ranking → suggested queries → compaction. Every retrieval path
//! has a non-embedding fallback; an offline embedder degrades hybrid and
//! semantic profiles to sparse-only retrieval.

pub mod compaction;
pub mod intent;
pub mod response;

pub use compaction::{compact_response, CompactionBudgets};
pub use intent::{detect_intent, parse_query, ParsedQuery, QueryIntent, RetrievalProfile};
pub use response::{
    QueryResponse, RelatedSymbol, ResponseMetadata, ResultType, SearchResult,
};

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::embeddings::EmbeddingClient;
use crate::fingerprint::FINGERPRINT_KIND;
use crate::store::search::{ChunkHit, RelatedSymbolRow, SymbolHit};
use crate::store::Store;

/// Default fusion weights for hybrid retrieval
const BM25_WEIGHT: f64 = 0.3;
const VECTOR_WEIGHT: f64 = 0.7;

/// Blend between retrieval score and graph centrality
const RETRIEVAL_BLEND: f64 = 0.7;
const GRAPH_BLEND: f64 = 0.3;
const GRAPH_ALPHA: f64 = 0.6;
const GRAPH_BETA: f64 = 0.4;

/// Base retrieval score for symbols reached through an edge rather than a
/// direct match
const RELATED_BASE_SCORE: f64 = 0.8;

static SIMILARITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(similar\s+to|duplicates?\s+of|code\s+like)\b").expect("invalid pattern")
});

static CALL_CHAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bcall\s+chain\b").expect("invalid pattern")
});

/// Depth cap for breadth-first call-chain expansion
const CALL_CHAIN_DEPTH: i32 = 3;

pub struct QueryOrchestrator {
    config: Arc<EngineConfig>,
    store: Store,
    embedder: Arc<EmbeddingClient>,
}

impl QueryOrchestrator {
    pub fn new(config: Arc<EngineConfig>, store: Store, embedder: Arc<EmbeddingClient>) -> Self {
        Self {
            config,
            store,
            embedder,
        }
    }

    /// Execute one query against an indexed branch
    #[instrument(skip(self, cancel), fields(repository = %repository_name, branch = %branch))]
    pub async fn run(
        &self,
        repository_id: Uuid,
        repository_name: &str,
        branch: &str,
        text: &str,
        max_results: Option<usize>,
        profile: RetrievalProfile,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse> {
        let started = Instant::now();
        let intent = detect_intent(text);
        let parsed = parse_query(text);
        debug!(intent = intent.as_str(), "classified query");

        let mut response = QueryResponse::empty(text, intent.as_str(), repository_name, branch);
        response.metadata.keywords = parsed.keywords.clone();

        if text.trim().is_empty() || cancel.is_cancelled() {
            response.execution_time_ms = started.elapsed().as_millis() as u64;
            return Ok(response);
        }

        let fetch_limit = self.config.max_results.max(1) as i64;
        let mut results = match intent {
            QueryIntent::Navigation => {
                self.navigate(repository_id, repository_name, branch, text, &parsed, fetch_limit)
                    .await?
            }
            QueryIntent::Relations => {
                self.relate(repository_id, repository_name, branch, text, &parsed, fetch_limit, cancel)
                    .await?
            }
            QueryIntent::Search | QueryIntent::Documentation | QueryIntent::Examples => {
                self.search(repository_id, repository_name, branch, text, &parsed, profile, fetch_limit)
                    .await?
            }
        };

        if cancel.is_cancelled() {
            response.execution_time_ms = started.elapsed().as_millis() as u64;
            return Ok(response);
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        response.suggested_queries = suggest_queries(&results);
        response.results = results;

        let budgets = CompactionBudgets {
            max_results: max_results
                .unwrap_or(self.config.max_response_results)
                .min(self.config.max_response_results)
                .max(1),
            max_snippet_chars: self.config.max_response_snippet_chars,
            max_response_bytes: self.config.max_response_bytes,
        };
        compact_response(&mut response, &budgets);
        response.total_results = response.results.len();
        response.execution_time_ms = started.elapsed().as_millis() as u64;
        Ok(response)
    }

    /// Navigation: exact symbol match, then fuzzy, then the sparse index;
    /// each hit carries its primary chunk or a reconstructed snippet
    async fn navigate(
        &self,
        repository_id: Uuid,
        repository_name: &str,
        branch: &str,
        text: &str,
        parsed: &ParsedQuery,
        limit: i64,
    ) -> Result<Vec<SearchResult>> {
        let target = parsed.primary_identifier().unwrap_or(text.trim());

        let mut hits = self
            .store
            .search_symbols(target, repository_id, branch, None, false, limit)
            .await?;
        if hits.is_empty() {
            hits = self
                .store
                .search_symbols(target, repository_id, branch, None, true, limit)
                .await?;
        }
        if hits.is_empty() {
            hits = self
                .store
                .search_symbols_sparse(text, repository_id, branch, limit)
                .await?;
        }

        // A path hint in the query narrows matches to those files
        if !parsed.path_hints.is_empty() {
            let narrowed: Vec<_> = hits
                .iter()
                .filter(|hit| {
                    parsed
                        .path_hints
                        .iter()
                        .any(|hint| hit.file_path.contains(hint.as_str()))
                })
                .cloned()
                .collect();
            if !narrowed.is_empty() {
                hits = narrowed;
            }
        }

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let content = match self.store.chunk_for_symbol(hit.id).await? {
                Some(chunk) => chunk.content,
                None => reconstructed_snippet(&hit),
            };
            results.push(symbol_result(
                repository_name,
                branch,
                &hit,
                content,
                hit.score,
                None,
            ));
        }
        Ok(results)
    }

    /// Relations: resolve the identifier, then walk incoming and outgoing
    /// edges; callers become results of their own, and scores blend with
    /// graph centrality
    #[allow(clippy::too_many_arguments)]
    async fn relate(
        &self,
        repository_id: Uuid,
        repository_name: &str,
        branch: &str,
        text: &str,
        parsed: &ParsedQuery,
        limit: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let Some(target) = parsed.primary_identifier() else {
            return Ok(Vec::new());
        };

        let mut targets = self
            .store
            .search_symbols(target, repository_id, branch, None, false, 5)
            .await?;
        if targets.is_empty() {
            targets = self
                .store
                .search_symbols(target, repository_id, branch, None, true, 5)
                .await?;
        }

        let similar_mode = SIMILARITY_PATTERN.is_match(text);
        let mut results = Vec::new();
        let mut candidate_ids = Vec::new();

        for symbol in &targets {
            if cancel.is_cancelled() {
                return Ok(results);
            }
            let incoming = self
                .store
                .find_references(symbol.id, &symbol.name, &symbol.qualified_name, None, limit)
                .await?;
            let outgoing = self
                .store
                .find_dependencies(symbol.id, None, limit)
                .await?;

            // The matched symbol itself, tagged with both directions
            let mut related: Vec<RelatedSymbol> = Vec::new();
            related.extend(incoming.iter().map(|row| related_symbol(row, "incoming")));
            related.extend(outgoing.iter().map(|row| related_symbol(row, "outgoing")));
            if similar_mode {
                related.extend(
                    self.near_duplicates(repository_id, branch, symbol).await?,
                );
            }
            if CALL_CHAIN_PATTERN.is_match(text) {
                let chain = self
                    .store
                    .find_call_chain(symbol.id, CALL_CHAIN_DEPTH)
                    .await?;
                related.extend(chain.into_iter().filter(|row| !row.name.is_empty()).map(
                    |row| RelatedSymbol {
                        name: row.name,
                        relation_type: "Calls".to_string(),
                        direction: "outgoing".to_string(),
                        file_path: row.file_path,
                        line: None,
                    },
                ));
            }
            let content = match self.store.chunk_for_symbol(symbol.id).await? {
                Some(chunk) => chunk.content,
                None => reconstructed_snippet(symbol),
            };
            candidate_ids.push(symbol.id);
            results.push(symbol_result(
                repository_name,
                branch,
                symbol,
                content,
                symbol.score,
                Some(related),
            ));

            // Each distinct referencing symbol becomes a result carrying the
            // relation back to the target
            let mut seen_sources: HashMap<Uuid, &RelatedSymbolRow> = HashMap::new();
            for row in &incoming {
                if let Some(id) = row.symbol_id {
                    seen_sources.entry(id).or_insert(row);
                }
            }
            let sources = self
                .store
                .get_symbols_by_ids(&seen_sources.keys().copied().collect::<Vec<_>>())
                .await?;
            for source in sources {
                let Some(row) = seen_sources.get(&source.id) else {
                    continue;
                };
                let relation = RelatedSymbol {
                    name: symbol.name.clone(),
                    relation_type: edge_kind_label(row.edge_kind),
                    direction: "outgoing".to_string(),
                    file_path: Some(symbol.file_path.clone()),
                    line: Some(row.line.max(0) as u32),
                };
                let content = match self.store.chunk_for_symbol(source.id).await? {
                    Some(chunk) => chunk.content,
                    None => reconstructed_snippet(&source),
                };
                candidate_ids.push(source.id);
                results.push(symbol_result(
                    repository_name,
                    branch,
                    &source,
                    content,
                    RELATED_BASE_SCORE,
                    Some(vec![relation]),
                ));
            }
        }

        self.apply_graph_boost(&mut results, &candidate_ids).await?;
        Ok(results)
    }

    /// Fingerprint-band candidates for "similar to X" relation queries
    async fn near_duplicates(
        &self,
        repository_id: Uuid,
        branch: &str,
        symbol: &SymbolHit,
    ) -> Result<Vec<RelatedSymbol>> {
        let Some(bands) = self.store.get_fingerprint_bands(symbol.id).await? else {
            return Ok(Vec::new());
        };
        let candidates = self
            .store
            .find_fingerprint_candidates(
                repository_id,
                branch,
                symbol.language,
                symbol.kind,
                FINGERPRINT_KIND,
                bands,
                10,
            )
            .await?;
        Ok(candidates
            .into_iter()
            .filter(|c| c.symbol_id != symbol.id)
            .map(|c| RelatedSymbol {
                name: c.name,
                relation_type: "NearDuplicate".to_string(),
                direction: "outgoing".to_string(),
                file_path: Some(c.file_path),
                line: None,
            })
            .collect())
    }

    /// Search / Documentation / Examples: hybrid retrieval over chunks with
    /// the profile narrowing which arms run
    #[allow(clippy::too_many_arguments)]
    async fn search(
        &self,
        repository_id: Uuid,
        repository_name: &str,
        branch: &str,
        text: &str,
        parsed: &ParsedQuery,
        profile: RetrievalProfile,
        limit: i64,
    ) -> Result<Vec<SearchResult>> {
        let vector = match profile {
            RetrievalProfile::Fast => None,
            RetrievalProfile::Hybrid | RetrievalProfile::Semantic => {
                let outcome = self.embedder.try_generate_query(text).await;
                if outcome.success {
                    outcome.vectors.into_iter().next()
                } else {
                    // Sparse-only degradation; the lexical arm carries the
                    // query
                    debug!(
                        code = outcome.error_code.as_deref().unwrap_or("unknown"),
                        "query embedding unavailable, degrading to lexical"
                    );
                    None
                }
            }
        };

        let hits = match (profile, &vector) {
            (RetrievalProfile::Semantic, Some(vector)) => {
                self.store
                    .search_embeddings_cosine(vector, repository_id, branch, limit)
                    .await?
            }
            _ => {
                self.store
                    .hybrid_search(
                        text,
                        vector.as_deref(),
                        repository_id,
                        branch,
                        parsed.language,
                        BM25_WEIGHT,
                        VECTOR_WEIGHT,
                        limit,
                    )
                    .await?
            }
        };

        Ok(hits
            .iter()
            .map(|hit| chunk_result(repository_name, branch, hit))
            .collect())
    }

    /// Blend retrieval scores with log-scaled edge-degree centrality
    async fn apply_graph_boost(
        &self,
        results: &mut [SearchResult],
        candidate_ids: &[Uuid],
    ) -> Result<()> {
        let degrees = self.store.edge_degrees(candidate_ids).await?;
        if degrees.is_empty() {
            return Ok(());
        }
        let by_id: HashMap<String, (i64, i64)> = degrees
            .into_iter()
            .map(|(id, counts)| (id.to_string(), counts))
            .collect();
        for result in results.iter_mut() {
            let Some((incoming, outgoing)) = by_id.get(&result.id) else {
                continue;
            };
            let graph_score = GRAPH_ALPHA * (1.0 + *incoming as f64).ln()
                + GRAPH_BETA * (1.0 + *outgoing as f64).ln();
            result.graph_score = Some(graph_score);
            result.score = RETRIEVAL_BLEND * result.score + GRAPH_BLEND * graph_score;
        }
        Ok(())
    }
}

fn related_symbol(row: &RelatedSymbolRow, direction: &str) -> RelatedSymbol {
    RelatedSymbol {
        name: row.name.clone(),
        relation_type: edge_kind_label(row.edge_kind),
        direction: direction.to_string(),
        file_path: row.file_path.clone(),
        line: Some(row.line.max(0) as u32),
    }
}

/// Edge kinds render PascalCase in payloads ("Calls", "TypeOf")
fn edge_kind_label(kind: crate::types::EdgeKind) -> String {
    let mut label = String::new();
    for part in kind.as_str().split('_') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            label.push(first.to_ascii_uppercase());
            label.extend(chars);
        }
    }
    label
}

fn symbol_kind_label(kind: crate::types::SymbolKind) -> String {
    let mut label = String::new();
    for part in kind.as_str().split('_') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            label.push(first.to_ascii_uppercase());
            label.extend(chars);
        }
    }
    label
}

fn symbol_result(
    repository: &str,
    branch: &str,
    hit: &SymbolHit,
    content: String,
    score: f64,
    related_symbols: Option<Vec<RelatedSymbol>>,
) -> SearchResult {
    SearchResult {
        id: hit.id.to_string(),
        result_type: ResultType::Symbol,
        repository: repository.to_string(),
        branch: branch.to_string(),
        file_path: hit.file_path.clone(),
        language: hit.language.to_string(),
        symbol_name: hit.name.clone(),
        symbol_kind: symbol_kind_label(hit.kind),
        content,
        start_line: hit.start_line.max(0) as u32,
        end_line: hit.end_line.max(0) as u32,
        score,
        bm25_score: None,
        vector_score: None,
        graph_score: None,
        signature: hit.signature.clone(),
        documentation: hit.documentation.clone(),
        related_symbols,
    }
}

fn chunk_result(repository: &str, branch: &str, hit: &ChunkHit) -> SearchResult {
    SearchResult {
        id: hit.id.to_string(),
        result_type: ResultType::CodeChunk,
        repository: repository.to_string(),
        branch: branch.to_string(),
        file_path: hit.file_path.clone(),
        language: hit.language.to_string(),
        symbol_name: hit.symbol_name.clone(),
        symbol_kind: symbol_kind_label(hit.symbol_kind),
        content: hit.content.clone(),
        start_line: hit.start_line.max(0) as u32,
        end_line: hit.end_line.max(0) as u32,
        score: hit.combined_score,
        bm25_score: hit.bm25_score,
        vector_score: hit.vector_score,
        graph_score: None,
        signature: hit.signature.clone(),
        documentation: hit.documentation.clone(),
        related_symbols: None,
    }
}

/// Rebuild a snippet from stored metadata when a symbol has no chunk
fn reconstructed_snippet(hit: &SymbolHit) -> String {
    let mut snippet = String::new();
    if let Some(documentation) = &hit.documentation {
        snippet.push_str(documentation);
        snippet.push('\n');
    }
    match &hit.signature {
        Some(signature) => snippet.push_str(signature),
        None => snippet.push_str(&hit.qualified_name),
    }
    snippet
}

/// Follow-up prompts synthesized from the top result symbols
fn suggest_queries(results: &[SearchResult]) -> Vec<String> {
    let mut suggestions = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for result in results.iter().take(3) {
        if result.symbol_name.is_empty() || !seen.insert(result.symbol_name.clone()) {
            continue;
        }
        suggestions.push(format!("Show me how {} is used", result.symbol_name));
        suggestions.push(format!("What calls {}?", result.symbol_name));
        if suggestions.len() >= 4 {
            break;
        }
    }
    suggestions.truncate(4);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EdgeKind, SymbolKind};

    #[test]
    fn edge_and_symbol_kind_labels_are_pascal_case() {
        assert_eq!(edge_kind_label(EdgeKind::Calls), "Calls");
        assert_eq!(edge_kind_label(EdgeKind::TypeOf), "TypeOf");
        assert_eq!(symbol_kind_label(SymbolKind::Class), "Class");
        assert_eq!(symbol_kind_label(SymbolKind::TypeParameter), "TypeParameter");
    }

    #[test]
    fn suggestions_come_from_top_symbols() {
        let hit = SymbolHit {
            id: Uuid::new_v4(),
            file_path: "src/auth.rs".to_string(),
            language: crate::types::Language::Rust,
            name: "HashPassword".to_string(),
            qualified_name: "auth::HashPassword".to_string(),
            kind: SymbolKind::Function,
            start_line: 1,
            end_line: 10,
            signature: None,
            documentation: None,
            score: 1.0,
        };
        let results = vec![symbol_result("demo", "main", &hit, String::new(), 1.0, None)];
        let suggestions = suggest_queries(&results);
        assert!(suggestions.contains(&"What calls HashPassword?".to_string()));
    }
}
