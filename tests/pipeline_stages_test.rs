// The pure pipeline stages chained together: detection → parse → chunk,
// plus the intent/compaction behavior the orchestrator builds on. No
// database or network involved.

use codequarry::chunker::chunk_file;
use codequarry::config::EngineConfig;
use codequarry::parsing::parse_file;
use codequarry::query::response::QueryResponse;
use codequarry::query::{compact_response, detect_intent, CompactionBudgets, QueryIntent};
use codequarry::types::{detect_language, EdgeKind, EdgeTarget, Language, SymbolKind};
use pretty_assertions::assert_eq;

const RUST_FIXTURE: &str = r#"
/// Coordinates user authentication.
pub struct UserService {
    store: UserStore,
}

impl UserService {
    pub fn login(&self, name: &str) -> Session {
        let digest = hash_password(name);
        self.store.lookup(digest)
    }
}

fn hash_password(input: &str) -> Digest {
    Digest::compute(input)
}
"#;

#[test]
fn rust_file_flows_from_detection_to_chunks() {
    let language = detect_language("user/user_service.rs", None, &[]);
    assert_eq!(language, Language::Rust);

    let outcome = parse_file("user/user_service.rs", RUST_FIXTURE, language);
    assert!(outcome.success);

    let service = outcome
        .symbols
        .iter()
        .find(|s| s.name == "UserService")
        .expect("UserService missing");
    assert_eq!(service.kind, SymbolKind::Struct);
    assert!(service.documentation.is_some());

    // The login → hash_password call survives to the edge list
    assert!(outcome.edges.iter().any(|e| e.kind == EdgeKind::Calls
        && e.target == EdgeTarget::Name("hash_password".to_string())));

    let config = EngineConfig {
        chunk_context_lines_before: 2,
        chunk_context_lines_after: 2,
        max_chunk_chars: 10_000,
        ..Default::default()
    };
    let chunks = chunk_file(
        &config,
        "user/user_service.rs",
        RUST_FIXTURE,
        language,
        &outcome.symbols,
    );
    assert!(!chunks.is_empty());

    let login_chunk = chunks
        .iter()
        .find(|c| c.symbol_name == "login")
        .expect("no chunk anchored on login");
    assert!(login_chunk.start_line <= login_chunk.symbol_start_line);
    assert!(login_chunk.symbol_end_line <= login_chunk.end_line);
    assert!(login_chunk.content.contains("hash_password"));
    // Every chunk honors the character cap and its span invariant
    for chunk in &chunks {
        assert!(chunk.content.chars().count() <= config.max_chunk_chars);
        assert!(chunk.start_line <= chunk.end_line);
    }
}

#[test]
fn python_file_flows_through_the_textual_parser() {
    let language = detect_language("services/billing.py", None, &[]);
    assert_eq!(language, Language::Python);

    let source = "\
class BillingService(BaseService):
    def charge(self, amount):
        return amount

def helper():
    pass
";
    let outcome = parse_file("services/billing.py", source, language);
    assert!(outcome.success);
    let charge = outcome.symbols.iter().find(|s| s.name == "charge").unwrap();
    assert_eq!(charge.kind, SymbolKind::Method);
    assert_eq!(charge.qualified_name, "BillingService.charge");

    let config = EngineConfig::default();
    let chunks = chunk_file(&config, "services/billing.py", source, language, &outcome.symbols);
    assert!(chunks.iter().any(|c| c.symbol_name == "BillingService"));
}

#[test]
fn unknown_file_still_yields_a_whole_file_chunk() {
    let language = detect_language("docs/notes.adoc", None, &[]);
    assert_eq!(language, Language::Unknown);

    let outcome = parse_file("docs/notes.adoc", "some notes\nmore notes\n", language);
    assert!(outcome.success);
    assert!(outcome.symbols.is_empty());

    let config = EngineConfig::default();
    let chunks = chunk_file(
        &config,
        "docs/notes.adoc",
        "some notes\nmore notes\n",
        language,
        &outcome.symbols,
    );
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].symbol_kind, SymbolKind::Unknown);
}

#[test]
fn scenario_intents_classify_as_specified() {
    assert_eq!(
        detect_intent("Where is the UserService class?"),
        QueryIntent::Navigation
    );
    assert_eq!(detect_intent("what calls HashPassword?"), QueryIntent::Relations);
    assert_eq!(detect_intent("password hashing"), QueryIntent::Search);
}

#[test]
fn compaction_meets_all_three_budgets_together() {
    use codequarry::query::response::{ResultType, SearchResult};

    let mut response = QueryResponse::empty("q", "search", "demo", "main");
    for rank in 0..10 {
        response.results.push(SearchResult {
            id: format!("r{rank}"),
            result_type: ResultType::CodeChunk,
            repository: "demo".to_string(),
            branch: "main".to_string(),
            file_path: format!("src/f{rank}.rs"),
            language: "rust".to_string(),
            symbol_name: format!("sym{rank}"),
            symbol_kind: "function".to_string(),
            content: format!("fn sym{rank}() {{}}\n{}", "// body\n".repeat(30)),
            start_line: 1,
            end_line: 40,
            score: 1.0 - rank as f64 * 0.05,
            bm25_score: Some(0.4),
            vector_score: None,
            graph_score: None,
            signature: None,
            documentation: None,
            related_symbols: None,
        });
    }

    compact_response(
        &mut response,
        &CompactionBudgets {
            max_results: 3,
            max_snippet_chars: 400,
            max_response_bytes: 4096,
        },
    );
    response.total_results = response.results.len();

    assert!(response.results.len() <= 3);
    let snippet_total: usize = response
        .results
        .iter()
        .map(|r| r.content.chars().count())
        .sum();
    assert!(snippet_total <= 400 + 40, "snippet budget blown: {snippet_total}");
    assert!(serde_json::to_vec(&response).unwrap().len() <= 4096);
    assert_eq!(response.truncated, Some(true));
    // Survivors are the best ranked
    assert_eq!(response.results[0].id, "r0");
}
