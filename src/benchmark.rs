//! Benchmark harness: index a repository, run a named query set, report
//! hit rate, latency percentiles, and raw stats for regression tracking

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use crate::engine::{Engine, QueryRequest};
use crate::error::EngineError;
use crate::indexer::IndexReport;
use crate::store::stats::RepositoryStats;

/// One query with the symbols a correct index should surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkQuery {
    pub query: String,
    pub expected_symbols: Vec<String>,
}

/// A named query set to run against one repository+branch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSpec {
    pub name: String,
    pub top_k: usize,
    pub queries: Vec<BenchmarkQuery>,
}

/// Per-query measurements
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStat {
    pub query: String,
    pub elapsed_ms: u64,
    pub json_bytes: usize,
    pub snippet_chars: usize,
    pub returned_symbols: Vec<String>,
    /// True iff any expected symbol appeared in the result list
    pub hit: bool,
}

/// Full harness output
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    pub name: String,
    pub repository: String,
    pub branch: String,
    pub index: IndexReport,
    pub index_elapsed_ms: u64,
    pub database_delta_bytes: i64,
    pub peak_rss_bytes: Option<u64>,
    pub stats: RepositoryStats,
    pub queries: Vec<QueryStat>,
    pub top_k_hit_rate: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
}

/// Nearest-rank percentile over an unsorted latency sample.
/// `percentile(&[10, 20, 30, 40, 50], 50.0) == 30`.
pub fn percentile_nearest_rank(samples: &[u64], percentile: f64) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Peak resident set size of this process, when the platform exposes it
pub fn peak_rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmHWM:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

/// Drives the full pipeline and the orchestrator against one branch
pub struct BenchmarkHarness<'a> {
    engine: &'a Engine,
}

impl<'a> BenchmarkHarness<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    pub async fn run(
        &self,
        repository: &str,
        branch: &str,
        spec: &BenchmarkSpec,
    ) -> Result<BenchmarkReport, EngineError> {
        let size_before = self
            .engine
            .store()
            .database_size_bytes()
            .await
            .unwrap_or(0);

        let index_started = Instant::now();
        let index = self.engine.index_branch(repository, branch).await?;
        let index_elapsed_ms = index_started.elapsed().as_millis() as u64;

        let size_after = self
            .engine
            .store()
            .database_size_bytes()
            .await
            .unwrap_or(size_before);

        let repository_row = self
            .engine
            .store()
            .get_repository(repository)
            .await
            .map_err(|e| EngineError::transient("database", e.to_string()))?
            .ok_or_else(|| EngineError::RepositoryNotFound {
                name: repository.to_string(),
                available: Vec::new(),
            })?;
        let stats = self
            .engine
            .store()
            .collect_repository_stats(repository_row.id)
            .await
            .map_err(|e| EngineError::transient("database", e.to_string()))?;

        let mut queries = Vec::with_capacity(spec.queries.len());
        let mut latencies = Vec::with_capacity(spec.queries.len());
        let mut hits = 0usize;

        for bench_query in &spec.queries {
            let started = Instant::now();
            let response = self
                .engine
                .query(QueryRequest {
                    repository: repository.to_string(),
                    text: bench_query.query.clone(),
                    branch: Some(branch.to_string()),
                    max_results: Some(spec.top_k),
                    profile: None,
                })
                .await?;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let json_bytes = serde_json::to_vec(&response).map(|b| b.len()).unwrap_or(0);
            let snippet_chars = response
                .results
                .iter()
                .map(|r| r.content.chars().count())
                .sum();
            let returned_symbols: Vec<String> = response
                .results
                .iter()
                .map(|r| r.symbol_name.clone())
                .collect();
            let hit = bench_query
                .expected_symbols
                .iter()
                .any(|expected| returned_symbols.iter().any(|got| got == expected));
            if hit {
                hits += 1;
            }

            latencies.push(elapsed_ms);
            queries.push(QueryStat {
                query: bench_query.query.clone(),
                elapsed_ms,
                json_bytes,
                snippet_chars,
                returned_symbols,
                hit,
            });
        }

        let hit_rate = if spec.queries.is_empty() {
            0.0
        } else {
            hits as f64 / spec.queries.len() as f64
        };
        let report = BenchmarkReport {
            name: spec.name.clone(),
            repository: repository.to_string(),
            branch: branch.to_string(),
            index,
            index_elapsed_ms,
            database_delta_bytes: size_after - size_before,
            peak_rss_bytes: peak_rss_bytes(),
            stats,
            queries,
            top_k_hit_rate: hit_rate,
            p50_latency_ms: percentile_nearest_rank(&latencies, 50.0),
            p95_latency_ms: percentile_nearest_rank(&latencies, 95.0),
        };
        info!(
            name = %report.name,
            hit_rate = report.top_k_hit_rate,
            p50 = report.p50_latency_ms,
            p95 = report.p95_latency_ms,
            "benchmark complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_percentiles_match_the_rule() {
        let samples = [10u64, 20, 30, 40, 50];
        assert_eq!(percentile_nearest_rank(&samples, 50.0), 30);
        assert_eq!(percentile_nearest_rank(&samples, 95.0), 50);
        assert_eq!(percentile_nearest_rank(&samples, 100.0), 50);
    }

    #[test]
    fn p50_never_exceeds_p95() {
        let samples = [5u64, 9, 2, 44, 17, 3, 3, 28];
        let p50 = percentile_nearest_rank(&samples, 50.0);
        let p95 = percentile_nearest_rank(&samples, 95.0);
        assert!(p50 <= p95);
    }

    #[test]
    fn empty_and_singleton_samples() {
        assert_eq!(percentile_nearest_rank(&[], 50.0), 0);
        assert_eq!(percentile_nearest_rank(&[7], 50.0), 7);
        assert_eq!(percentile_nearest_rank(&[7], 95.0), 7);
    }
}
