//! Relational schema bootstrap
//!
//! Every table carries a natural-key unique constraint so re-indexing a
//! branch converges through idempotent upserts. Enumerations are Postgres
//! enum types; vectors use the `vector` extension with an HNSW cosine
//! index; fuzzy matching uses `pg_trgm`.

/// Statements executed in order by `Store::ensure_schema`.
/// The embedding dimensionality is fixed at schema-creation time.
pub fn schema_statements(embedding_dims: usize) -> Vec<String> {
    let mut statements: Vec<String> = vec![
        "CREATE EXTENSION IF NOT EXISTS vector".into(),
        "CREATE EXTENSION IF NOT EXISTS pg_trgm".into(),
    ];

    for (name, values) in [
        (
            "language",
            "'rust', 'python', 'java_script', 'type_script', 'go', 'java', 'c_sharp', 'ruby', 'shell', 'unknown'",
        ),
        (
            "symbol_kind",
            "'namespace', 'class', 'interface', 'struct', 'enum', 'method', 'function', 'property', 'field', 'variable', 'parameter', 'constant', 'event', 'delegate', 'constructor', 'destructor', 'module', 'package', 'type_parameter', 'unknown'",
        ),
        (
            "edge_kind",
            "'import', 'inherits', 'implements', 'calls', 'references', 'defines', 'contains', 'overrides', 'type_of', 'returns', 'unknown'",
        ),
        (
            "index_state",
            "'pending', 'in_progress', 'completed', 'failed', 'stale'",
        ),
    ] {
        statements.push(format!(
            "DO $$ BEGIN CREATE TYPE {name} AS ENUM ({values}); \
             EXCEPTION WHEN duplicate_object THEN NULL; END $$"
        ));
    }

    statements.extend(
        [
            r#"
CREATE TABLE IF NOT EXISTS repositories (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name TEXT NOT NULL UNIQUE,
    remote_url TEXT NOT NULL,
    default_branch TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            r#"
CREATE TABLE IF NOT EXISTS branches (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    head_commit TEXT NOT NULL,
    indexed_commit TEXT,
    state index_state NOT NULL DEFAULT 'pending',
    last_indexed_at TIMESTAMPTZ,
    last_accessed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (repository_id, name)
)"#,
            r#"
CREATE TABLE IF NOT EXISTS commits (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    sha TEXT NOT NULL,
    branch TEXT NOT NULL,
    author TEXT NOT NULL,
    message TEXT NOT NULL,
    committed_at TIMESTAMPTZ NOT NULL,
    UNIQUE (repository_id, sha, branch)
)"#,
            r#"
CREATE TABLE IF NOT EXISTS files (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    branch TEXT NOT NULL,
    commit_sha TEXT NOT NULL,
    path TEXT NOT NULL,
    language language NOT NULL,
    size_bytes BIGINT NOT NULL,
    line_count INTEGER NOT NULL,
    indexed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (repository_id, branch, commit_sha, path)
)"#,
            "CREATE INDEX IF NOT EXISTS files_repo_branch_idx ON files (repository_id, branch)",
            "CREATE INDEX IF NOT EXISTS files_path_trgm_idx ON files USING GIN (path gin_trgm_ops)",
            r#"
CREATE TABLE IF NOT EXISTS symbols (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    branch TEXT NOT NULL,
    commit_sha TEXT NOT NULL,
    file_path TEXT NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    kind symbol_kind NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    start_column INTEGER NOT NULL DEFAULT 0,
    end_column INTEGER NOT NULL DEFAULT 0,
    signature TEXT,
    documentation TEXT,
    modifiers TEXT[] NOT NULL DEFAULT '{}',
    parent_symbol_id UUID REFERENCES symbols(id) ON DELETE SET NULL,
    language language NOT NULL,
    indexed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (repository_id, branch, file_path, name, start_line, end_line)
)"#,
            "CREATE INDEX IF NOT EXISTS symbols_repo_branch_idx ON symbols (repository_id, branch)",
            "CREATE INDEX IF NOT EXISTS symbols_name_trgm_idx ON symbols USING GIN (name gin_trgm_ops)",
            "CREATE INDEX IF NOT EXISTS symbols_qualified_lower_idx ON symbols (LOWER(qualified_name))",
            r#"
CREATE TABLE IF NOT EXISTS edges (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    source_symbol_id UUID NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
    target_symbol_id UUID,
    target_name TEXT,
    kind edge_kind NOT NULL,
    repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    branch TEXT NOT NULL,
    commit_sha TEXT NOT NULL,
    source_file_path TEXT NOT NULL,
    source_line INTEGER NOT NULL,
    CHECK (target_symbol_id IS NOT NULL OR target_name IS NOT NULL)
)"#,
            "CREATE INDEX IF NOT EXISTS edges_repo_branch_idx ON edges (repository_id, branch)",
            "CREATE INDEX IF NOT EXISTS edges_source_idx ON edges (source_symbol_id, kind)",
            "CREATE INDEX IF NOT EXISTS edges_target_idx ON edges (target_symbol_id, kind)",
            "CREATE INDEX IF NOT EXISTS edges_target_name_idx ON edges (LOWER(target_name))",
            r#"
CREATE TABLE IF NOT EXISTS code_chunks (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    branch TEXT NOT NULL,
    commit_sha TEXT NOT NULL,
    file_path TEXT NOT NULL,
    symbol_id UUID REFERENCES symbols(id) ON DELETE SET NULL,
    symbol_name TEXT NOT NULL,
    symbol_kind symbol_kind NOT NULL,
    language language NOT NULL,
    content TEXT NOT NULL,
    symbol_start_line INTEGER NOT NULL,
    symbol_end_line INTEGER NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    token_count INTEGER NOT NULL,
    parent_symbol TEXT,
    signature TEXT,
    documentation TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    search_vector tsvector GENERATED ALWAYS AS (to_tsvector('simple', left(content, 200000))) STORED,
    UNIQUE (repository_id, branch, file_path, start_line, end_line)
)"#,
            "CREATE INDEX IF NOT EXISTS chunks_repo_branch_idx ON code_chunks (repository_id, branch)",
            "CREATE INDEX IF NOT EXISTS chunks_fts_idx ON code_chunks USING GIN (search_vector)",
        ]
        .into_iter()
        .map(String::from),
    );

    statements.push(format!(
        r#"
CREATE TABLE IF NOT EXISTS embeddings (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    chunk_id UUID NOT NULL UNIQUE REFERENCES code_chunks(id) ON DELETE CASCADE,
    repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    branch TEXT NOT NULL,
    commit_sha TEXT NOT NULL,
    embedding vector({embedding_dims}) NOT NULL,
    dims INTEGER NOT NULL,
    model_name TEXT NOT NULL,
    model_version TEXT,
    generated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#
    ));

    statements.extend(
        [
            "CREATE INDEX IF NOT EXISTS embeddings_repo_branch_idx ON embeddings (repository_id, branch)",
            "CREATE INDEX IF NOT EXISTS embeddings_hnsw_idx ON embeddings USING hnsw (embedding vector_cosine_ops)",
            r#"
CREATE TABLE IF NOT EXISTS symbol_search (
    symbol_id UUID PRIMARY KEY REFERENCES symbols(id) ON DELETE CASCADE,
    repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    branch TEXT NOT NULL,
    commit_sha TEXT NOT NULL,
    file_path TEXT NOT NULL,
    language language NOT NULL,
    kind symbol_kind NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    signature TEXT,
    documentation TEXT,
    literal_text TEXT,
    snippet TEXT NOT NULL,
    search_vector tsvector NOT NULL
)"#,
            "CREATE INDEX IF NOT EXISTS symbol_search_repo_branch_idx ON symbol_search (repository_id, branch)",
            "CREATE INDEX IF NOT EXISTS symbol_search_fts_idx ON symbol_search USING GIN (search_vector)",
            r#"
CREATE TABLE IF NOT EXISTS symbol_fingerprints (
    symbol_id UUID PRIMARY KEY REFERENCES symbols(id) ON DELETE CASCADE,
    repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    branch TEXT NOT NULL,
    commit_sha TEXT NOT NULL,
    file_path TEXT NOT NULL,
    language language NOT NULL,
    kind symbol_kind NOT NULL,
    fingerprint_kind TEXT NOT NULL,
    fingerprint BIGINT NOT NULL,
    band0 INTEGER NOT NULL,
    band1 INTEGER NOT NULL,
    band2 INTEGER NOT NULL,
    band3 INTEGER NOT NULL,
    indexed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
            "CREATE INDEX IF NOT EXISTS fingerprints_band0_idx ON symbol_fingerprints (band0)",
            "CREATE INDEX IF NOT EXISTS fingerprints_band1_idx ON symbol_fingerprints (band1)",
            "CREATE INDEX IF NOT EXISTS fingerprints_band2_idx ON symbol_fingerprints (band2)",
            "CREATE INDEX IF NOT EXISTS fingerprints_band3_idx ON symbol_fingerprints (band3)",
            r#"
CREATE TABLE IF NOT EXISTS repository_stats (
    repository_id UUID PRIMARY KEY REFERENCES repositories(id) ON DELETE CASCADE,
    snapshot JSONB NOT NULL,
    refreshed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#,
        ]
        .into_iter()
        .map(String::from),
    );

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_carries_every_entity_table() {
        let ddl = schema_statements(768).join("\n");
        for table in [
            "repositories",
            "branches",
            "commits",
            "files",
            "symbols",
            "edges",
            "code_chunks",
            "embeddings",
            "symbol_search",
            "symbol_fingerprints",
        ] {
            assert!(
                ddl.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing table {table}"
            );
        }
        assert!(ddl.contains("vector(768)"));
        assert!(ddl.contains("hnsw"));
        assert!(ddl.contains("gin_trgm_ops"));
        assert!(ddl.contains("LOWER(qualified_name)"));
    }
}
