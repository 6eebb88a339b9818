// Postgres round-trip tests. These need a live database with the `vector`
// and `pg_trgm` extensions available; point DATABASE_URL at it and run
// with `cargo test -- --ignored`.

use anyhow::Result;
use codequarry::fingerprint::fingerprint_text;
use codequarry::parsing::parse_file;
use codequarry::store::{FilePersistence, Store};
use codequarry::types::{detect_language, Fingerprint, IndexState, Language};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

const DIMS: usize = 8;

async fn connect() -> Result<Store> {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at a test database for ignored tests");
    let pool = PgPoolOptions::new().max_connections(4).connect(&url).await?;
    let store = Store::from_pool(pool, DIMS);
    store.ensure_schema().await?;
    Ok(store)
}

const FIXTURE: &str = r#"
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

async fn seed_branch(store: &Store, repo_name: &str) -> Result<(Uuid, String)> {
    let repo = store
        .upsert_repository(repo_name, "https://example.com/demo.git", "main")
        .await?;
    store.upsert_branch(repo.id, "main", "deadbeef").await?;

    let path = "user/user_service.rs";
    let language = detect_language(path, None, &[]);
    let outcome = parse_file(path, FIXTURE, language);
    assert!(outcome.success);

    let config = codequarry::config::EngineConfig::default();
    let chunks =
        codequarry::chunker::chunk_file(&config, path, FIXTURE, language, &outcome.symbols);
    let fingerprints: Vec<(usize, Fingerprint)> = outcome
        .symbols
        .iter()
        .enumerate()
        .map(|(index, _)| (index, fingerprint_text(FIXTURE)))
        .collect();

    store
        .persist_file(&FilePersistence {
            repository_id: repo.id,
            branch: "main",
            commit_sha: "deadbeef",
            path,
            language,
            size_bytes: FIXTURE.len() as i64,
            line_count: FIXTURE.lines().count() as i32,
            outcome: &outcome,
            chunks: &chunks,
            fingerprints: &fingerprints,
        })
        .await?;
    Ok((repo.id, "main".to_string()))
}

#[tokio::test]
#[ignore]
async fn persisted_symbols_come_back_by_exact_name() -> Result<()> {
    let store = connect().await?;
    let name = format!("rt-{}", Uuid::new_v4());
    let (repo_id, branch) = seed_branch(&store, &name).await?;

    let hits = store
        .search_symbols("UserService", repo_id, &branch, None, false, 10)
        .await?;
    assert!(!hits.is_empty());
    assert_eq!(hits[0].name, "UserService");
    assert_eq!(hits[0].file_path, "user/user_service.rs");

    store.delete_repository(&name).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn empty_symbol_query_returns_zero_rows() -> Result<()> {
    let store = connect().await?;
    let name = format!("rt-{}", Uuid::new_v4());
    let (repo_id, branch) = seed_branch(&store, &name).await?;

    let hits = store
        .search_symbols("", repo_id, &branch, None, false, 10)
        .await?;
    assert!(hits.is_empty());

    store.delete_repository(&name).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn hybrid_search_without_vector_degrades_to_lexical() -> Result<()> {
    let store = connect().await?;
    let name = format!("rt-{}", Uuid::new_v4());
    let (repo_id, branch) = seed_branch(&store, &name).await?;

    let hits = store
        .hybrid_search("hash_password", None, repo_id, &branch, None, 0.3, 0.7, 10)
        .await?;
    assert!(!hits.is_empty());
    assert!(hits[0].bm25_score.unwrap_or(0.0) > 0.0);
    assert!(hits[0].vector_score.is_none());

    // Both arms empty stays a well-formed empty list
    let nothing = store
        .hybrid_search("zzzqqqxyzzy", None, repo_id, &branch, None, 0.3, 0.7, 10)
        .await?;
    assert!(nothing.is_empty());

    store.delete_repository(&name).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn embeddings_round_trip_through_cosine_search() -> Result<()> {
    let store = connect().await?;
    let name = format!("rt-{}", Uuid::new_v4());
    let (repo_id, branch) = seed_branch(&store, &name).await?;

    let chunk_ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM code_chunks WHERE repository_id = $1 AND branch = $2",
    )
    .bind(repo_id)
    .bind(&branch)
    .fetch_all(store.pool())
    .await?;
    assert!(!chunk_ids.is_empty());

    let items: Vec<(Uuid, Vec<f32>)> = chunk_ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let mut vector = vec![0.0f32; DIMS];
            vector[index % DIMS] = 1.0;
            (*id, vector)
        })
        .collect();
    store
        .insert_embeddings(repo_id, &branch, "deadbeef", &items, "test-model")
        .await?;

    let mut probe = vec![0.0f32; DIMS];
    probe[0] = 1.0;
    let hits = store
        .search_embeddings_cosine(&probe, repo_id, &branch, 5)
        .await?;
    assert!(!hits.is_empty());
    assert!(hits[0].vector_score.unwrap_or(0.0) > 0.9);

    // The L2 accessor sees the same rows, nearest first
    let l2_hits = store
        .search_embeddings_l2(&probe, repo_id, &branch, 5)
        .await?;
    assert_eq!(l2_hits.len(), hits.len());
    assert!(l2_hits[0].vector_score.unwrap_or(f64::MAX) < 1.0);

    store.delete_repository(&name).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn edge_resolution_links_cross_file_targets() -> Result<()> {
    let store = connect().await?;
    let name = format!("rt-{}", Uuid::new_v4());
    let (repo_id, branch) = seed_branch(&store, &name).await?;

    // A second file calling into the first by qualified name
    let caller = "pub fn reset(s: &user_service::UserService) {\n    s.login(\"x\");\n}\n";
    let path = "admin/reset.rs";
    let outcome = parse_file(path, caller, Language::Rust);
    let config = codequarry::config::EngineConfig::default();
    let chunks = codequarry::chunker::chunk_file(&config, path, caller, Language::Rust, &outcome.symbols);
    store
        .persist_file(&FilePersistence {
            repository_id: repo_id,
            branch: &branch,
            commit_sha: "deadbeef",
            path,
            language: Language::Rust,
            size_bytes: caller.len() as i64,
            line_count: caller.lines().count() as i32,
            outcome: &outcome,
            chunks: &chunks,
            fingerprints: &[],
        })
        .await?;

    let resolved = store.resolve_pending_edges(repo_id, &branch).await?;
    assert!(resolved > 0, "expected at least one edge to resolve");

    store.delete_repository(&name).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn stale_sweep_marks_only_idle_completed_branches() -> Result<()> {
    let store = connect().await?;
    let name = format!("rt-{}", Uuid::new_v4());
    let repo = store
        .upsert_repository(&name, "https://example.com/demo.git", "main")
        .await?;
    store.upsert_branch(repo.id, "main", "deadbeef").await?;
    store.mark_branch_indexed(repo.id, "main", "deadbeef").await?;

    // A cutoff in the future makes the fresh branch "idle"
    let swept = store
        .sweep_stale_branches(chrono::Utc::now() + chrono::Duration::hours(1))
        .await?;
    assert!(swept.iter().any(|(id, b)| *id == repo.id && b == "main"));
    let branch = store.get_branch(repo.id, "main").await?.unwrap();
    assert_eq!(branch.state, IndexState::Stale);

    store.delete_repository(&name).await?;
    Ok(())
}
