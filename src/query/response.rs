//! Outbound response types. Everything serializes camelCase for the
//! transport layer.

use serde::{Deserialize, Serialize};

/// What a result row is backed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Symbol,
    CodeChunk,
}

/// A symbol related to a result, tagged with the relationship kind and
/// direction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedSymbol {
    pub name: String,
    /// Edge kind, e.g. "Calls", "Inherits"
    pub relation_type: String,
    /// "incoming" or "outgoing" relative to the result symbol
    pub direction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// One ranked result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    #[serde(rename = "type")]
    pub result_type: ResultType,
    pub repository: String,
    pub branch: String,
    pub file_path: String,
    pub language: String,
    pub symbol_name: String,
    pub symbol_kind: String,
    pub content: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Blended ranking score
    pub score: f64,
    pub bm25_score: Option<f64>,
    pub vector_score: Option<f64>,
    pub graph_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_symbols: Option<Vec<RelatedSymbol>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub keywords: Vec<String>,
    pub repository: String,
    pub branch: String,
}

/// The full payload of one `query` call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query: String,
    pub intent: String,
    pub repository: String,
    pub branch: String,
    pub total_results: usize,
    pub execution_time_ms: u64,
    pub results: Vec<SearchResult>,
    pub suggested_queries: Vec<String>,
    pub metadata: ResponseMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
}

impl QueryResponse {
    /// An empty but well-formed response (used for cancellation and for
    /// queries that match nothing)
    pub fn empty(query: &str, intent: &str, repository: &str, branch: &str) -> Self {
        Self {
            query: query.to_string(),
            intent: intent.to_string(),
            repository: repository.to_string(),
            branch: branch.to_string(),
            total_results: 0,
            execution_time_ms: 0,
            results: Vec::new(),
            suggested_queries: Vec::new(),
            metadata: ResponseMetadata {
                keywords: Vec::new(),
                repository: repository.to_string(),
                branch: branch.to_string(),
            },
            truncated: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_is_camel_case() {
        let response = QueryResponse::empty("q", "search", "demo", "main");
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("totalResults").is_some());
        assert!(json.get("executionTimeMs").is_some());
        assert!(json.get("suggestedQueries").is_some());
        assert!(json.get("metadata").unwrap().get("keywords").is_some());
        // Absent unless a budget bit
        assert!(json.get("truncated").is_none());
    }
}
