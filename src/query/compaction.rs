//! Response compaction under result-count, snippet-char, and byte budgets
//!
//! All three budgets hold simultaneously on the emitted payload. Results
//! arrive ranked best-first; the snippet budget truncates lower-ranked items
//! first (keeping their header line), and the byte budget drops items from
//! the tail until the serialized response fits.

use crate::query::response::QueryResponse;

/// Output budgets applied before emission
#[derive(Debug, Clone, Copy)]
pub struct CompactionBudgets {
    pub max_results: usize,
    pub max_snippet_chars: usize,
    pub max_response_bytes: usize,
}

/// Enforce every budget on the response in place. Sets `truncated` when
/// anything was cut.
pub fn compact_response(response: &mut QueryResponse, budgets: &CompactionBudgets) {
    let mut truncated = false;

    if response.results.len() > budgets.max_results {
        response.results.truncate(budgets.max_results);
        truncated = true;
    }

    truncated |= enforce_snippet_budget(response, budgets.max_snippet_chars);
    truncated |= enforce_byte_budget(response, budgets.max_response_bytes);

    if truncated {
        response.truncated = Some(true);
    }
}

/// Shrink snippet content, lowest-ranked first, until the total character
/// count fits. Each shrunk item keeps its first line as a header.
fn enforce_snippet_budget(response: &mut QueryResponse, max_chars: usize) -> bool {
    let total: usize = response
        .results
        .iter()
        .map(|r| r.content.chars().count())
        .sum();
    if total <= max_chars {
        return false;
    }

    let mut over = total - max_chars;
    for result in response.results.iter_mut().rev() {
        if over == 0 {
            break;
        }
        let length = result.content.chars().count();
        let header_length = result
            .content
            .lines()
            .next()
            .map(|line| line.chars().count())
            .unwrap_or(0);
        let keep = length.saturating_sub(over).max(header_length);
        if keep < length {
            let byte_end = result
                .content
                .char_indices()
                .nth(keep)
                .map(|(index, _)| index)
                .unwrap_or(result.content.len());
            result.content.truncate(byte_end);
            over -= length - keep;
        }
    }
    true
}

/// Drop results from the tail (lowest score first) until the serialized
/// response fits the byte budget
fn enforce_byte_budget(response: &mut QueryResponse, max_bytes: usize) -> bool {
    let mut dropped = false;
    while serialized_size(response) > max_bytes && !response.results.is_empty() {
        response.results.pop();
        dropped = true;
    }
    dropped
}

fn serialized_size(response: &QueryResponse) -> usize {
    serde_json::to_vec(response).map(|b| b.len()).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::response::{ResultType, SearchResult};

    fn result(rank: usize, content: &str) -> SearchResult {
        SearchResult {
            id: format!("r{rank}"),
            result_type: ResultType::CodeChunk,
            repository: "demo".to_string(),
            branch: "main".to_string(),
            file_path: format!("src/file{rank}.rs"),
            language: "rust".to_string(),
            symbol_name: format!("symbol{rank}"),
            symbol_kind: "function".to_string(),
            content: content.to_string(),
            start_line: 1,
            end_line: 10,
            score: 1.0 / (rank as f64 + 1.0),
            bm25_score: Some(0.5),
            vector_score: None,
            graph_score: None,
            signature: None,
            documentation: None,
            related_symbols: None,
        }
    }

    fn response_with(results: Vec<SearchResult>) -> QueryResponse {
        let mut response = QueryResponse::empty("q", "search", "demo", "main");
        response.total_results = results.len();
        response.results = results;
        response
    }

    #[test]
    fn within_budget_passes_untouched() {
        let mut response = response_with(vec![result(0, "fn a() {}"), result(1, "fn b() {}")]);
        compact_response(
            &mut response,
            &CompactionBudgets {
                max_results: 10,
                max_snippet_chars: 1000,
                max_response_bytes: 64 * 1024,
            },
        );
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.truncated, None);
    }

    #[test]
    fn result_count_budget_cuts_the_tail() {
        let results: Vec<_> = (0..10).map(|i| result(i, "fn x() {}")).collect();
        let mut response = response_with(results);
        compact_response(
            &mut response,
            &CompactionBudgets {
                max_results: 3,
                max_snippet_chars: 100_000,
                max_response_bytes: 1024 * 1024,
            },
        );
        assert_eq!(response.results.len(), 3);
        assert_eq!(response.truncated, Some(true));
        // Best-ranked results survive
        assert_eq!(response.results[0].id, "r0");
    }

    #[test]
    fn snippet_budget_truncates_lower_ranked_first_keeping_headers() {
        let long = format!("fn long() {{\n{}\n}}", "    body();\n".repeat(50));
        let mut response = response_with(vec![result(0, &long), result(1, &long)]);
        compact_response(
            &mut response,
            &CompactionBudgets {
                max_results: 10,
                max_snippet_chars: long.chars().count() + 20,
                max_response_bytes: 1024 * 1024,
            },
        );
        assert_eq!(response.truncated, Some(true));
        // Top result keeps its content; the tail result shrank to near its
        // header
        assert_eq!(response.results[0].content, long);
        assert!(response.results[1].content.starts_with("fn long() {"));
        assert!(response.results[1].content.chars().count() < long.chars().count());
    }

    #[test]
    fn byte_budget_bounds_serialized_size() {
        let results: Vec<_> = (0..10)
            .map(|i| result(i, &format!("fn f{i}() {{ {} }}", "x".repeat(200))))
            .collect();
        let mut response = response_with(results);
        compact_response(
            &mut response,
            &CompactionBudgets {
                max_results: 3,
                max_snippet_chars: 100_000,
                max_response_bytes: 1024,
            },
        );
        assert!(serde_json::to_vec(&response).unwrap().len() <= 1024);
        assert!(response.results.len() <= 3);
        assert_eq!(response.truncated, Some(true));
    }
}
