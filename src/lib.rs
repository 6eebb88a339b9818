// Codequarry - A self-hosted code indexing and hybrid retrieval engine
// Root library module

pub mod benchmark;
pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod indexer;
pub mod lifecycle;
pub mod observability;
pub mod query;
pub mod store;
pub mod types;

// Git mirror management and change tracking
pub mod git;

// Language detection and symbol extraction
pub mod parsing;

// Re-export the engine surface the transport layer talks to
pub use engine::{Engine, QueryRequest};
pub use error::EngineError;
pub use query::{QueryIntent, QueryResponse, RetrievalProfile, SearchResult};

// Re-export configuration
pub use config::{DatabaseConfig, EngineConfig, RepositoryConfig};

// Re-export observability helpers
pub use observability::{init_logging, init_logging_with_level};

// Re-export the benchmark harness
pub use benchmark::{BenchmarkHarness, BenchmarkQuery, BenchmarkReport, BenchmarkSpec};
