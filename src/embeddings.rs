// Embeddings Module - Client for an external embedding inference service
//
// The embedder is best-effort: every failure is classified transient or
// permanent, and no caller is allowed to block indexing or retrieval on it.
// Chunks persist without embeddings and queries fall back to sparse-only
// retrieval when the service is unavailable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::types::CodeChunk;

/// Outcome of an embedding call. Never an Err: failures are data so callers
/// must handle the degraded path explicitly.
#[derive(Debug, Clone)]
pub struct EmbeddingOutcome {
    pub success: bool,
    pub is_transient: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub dims: usize,
    /// In input order, aligned 1:1 with the submitted texts
    pub vectors: Vec<Vec<f32>>,
}

impl EmbeddingOutcome {
    fn failure(transient: bool, code: &str, message: String) -> Self {
        Self {
            success: false,
            is_transient: transient,
            error_code: Some(code.to_string()),
            error_message: Some(message),
            dims: 0,
            vectors: Vec::new(),
        }
    }
}

/// Classified failure from a provider call
#[derive(Debug, Clone)]
pub struct EmbedFailure {
    pub transient: bool,
    pub code: String,
    pub message: String,
}

/// Trait for embedding providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedFailure>;

    /// Dimensionality of the vectors this provider produces
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Provider backed by an external HTTP inference endpoint
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(endpoint: String, model: String, dims: usize, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            model,
            dims,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.embedding_service_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimensions,
            Duration::from_secs(config.embedding_timeout_seconds),
        )
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedFailure> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            // 5xx and throttling may clear on retry; other statuses will not
            let transient = status.is_server_error() || status.as_u16() == 429;
            return Err(EmbedFailure {
                transient,
                code: format!("embedder_http_{}", status.as_u16()),
                message: format!("embedding service returned {status}"),
            });
        }

        let body: EmbedResponse = response.json().await.map_err(|e| EmbedFailure {
            transient: false,
            code: "embedder_bad_response".to_string(),
            message: format!("malformed embedding response: {e}"),
        })?;

        if body.embeddings.len() != texts.len() {
            return Err(EmbedFailure {
                transient: false,
                code: "embedder_misaligned".to_string(),
                message: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    body.embeddings.len()
                ),
            });
        }
        for vector in &body.embeddings {
            if vector.len() != self.dims {
                return Err(EmbedFailure {
                    transient: false,
                    code: "embedder_bad_dims".to_string(),
                    message: format!("expected {} dims, got {}", self.dims, vector.len()),
                });
            }
        }

        Ok(body.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> EmbedFailure {
    let transient = e.is_timeout() || e.is_connect() || e.is_request();
    EmbedFailure {
        transient,
        code: if e.is_timeout() {
            "embedder_timeout".to_string()
        } else {
            "embedder_unreachable".to_string()
        },
        message: e.to_string(),
    }
}

/// Batching client over a provider; the unit the pipeline and the query
/// orchestrator talk to
pub struct EmbeddingClient {
    provider: std::sync::Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingClient {
    pub fn new(provider: std::sync::Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            std::sync::Arc::new(HttpEmbeddingProvider::from_config(config)),
            config.embedding_batch_size,
        )
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn model_name(&self) -> String {
        self.provider.model_name().to_string()
    }

    /// Embed a list of chunks, batched. The first failed batch fails the
    /// whole call; callers persist chunks without embeddings on failure.
    pub async fn try_generate_chunks(&self, chunks: &[CodeChunk]) -> EmbeddingOutcome {
        let texts: Vec<String> = chunks.iter().map(embedding_text).collect();
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            match self.provider.embed_batch(batch).await {
                Ok(mut batch_vectors) => vectors.append(&mut batch_vectors),
                Err(failure) => {
                    warn!(
                        code = %failure.code,
                        transient = failure.transient,
                        "embedding batch failed"
                    );
                    return EmbeddingOutcome::failure(
                        failure.transient,
                        &failure.code,
                        failure.message,
                    );
                }
            }
        }

        debug!(count = vectors.len(), "generated chunk embeddings");
        EmbeddingOutcome {
            success: true,
            is_transient: false,
            error_code: None,
            error_message: None,
            dims: self.provider.dimensions(),
            vectors,
        }
    }

    /// Embed a single query string
    pub async fn try_generate_query(&self, text: &str) -> EmbeddingOutcome {
        match self.provider.embed_batch(&[text.to_string()]).await {
            Ok(vectors) => EmbeddingOutcome {
                success: true,
                is_transient: false,
                error_code: None,
                error_message: None,
                dims: self.provider.dimensions(),
                vectors,
            },
            Err(failure) => {
                debug!(code = %failure.code, "query embedding unavailable");
                EmbeddingOutcome::failure(failure.transient, &failure.code, failure.message)
            }
        }
    }
}

/// Text submitted to the embedder for one chunk: a header line carrying the
/// symbol identity plus the chunk content
fn embedding_text(chunk: &CodeChunk) -> String {
    format!(
        "{} {} in {}\n{}",
        chunk.symbol_kind, chunk.symbol_name, chunk.file_path, chunk.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Language, SymbolKind};

    struct FixedProvider {
        dims: usize,
        fail: Option<EmbedFailure>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedFailure> {
            if let Some(failure) = &self.fail {
                return Err(failure.clone());
            }
            Ok(texts.iter().map(|_| vec![0.5; self.dims]).collect())
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        fn model_name(&self) -> &str {
            "fixed-test-model"
        }
    }

    fn chunk(name: &str) -> CodeChunk {
        CodeChunk {
            file_path: "a.rs".to_string(),
            symbol_name: name.to_string(),
            symbol_kind: SymbolKind::Function,
            language: Language::Rust,
            content: format!("fn {name}() {{}}"),
            symbol_start_line: 1,
            symbol_end_line: 1,
            start_line: 1,
            end_line: 1,
            token_count: 4,
            parent_symbol: None,
            signature: None,
            documentation: None,
        }
    }

    #[tokio::test]
    async fn vectors_align_with_input_across_batches() {
        let client = EmbeddingClient::new(
            std::sync::Arc::new(FixedProvider {
                dims: 8,
                fail: None,
            }),
            2,
        );
        let chunks: Vec<_> = (0..5).map(|i| chunk(&format!("f{i}"))).collect();
        let outcome = client.try_generate_chunks(&chunks).await;
        assert!(outcome.success);
        assert_eq!(outcome.vectors.len(), 5);
        assert_eq!(outcome.dims, 8);
    }

    #[tokio::test]
    async fn transient_failure_is_reported_not_raised() {
        let client = EmbeddingClient::new(
            std::sync::Arc::new(FixedProvider {
                dims: 8,
                fail: Some(EmbedFailure {
                    transient: true,
                    code: "embedder_timeout".to_string(),
                    message: "timed out".to_string(),
                }),
            }),
            2,
        );
        let outcome = client.try_generate_query("password hashing").await;
        assert!(!outcome.success);
        assert!(outcome.is_transient);
        assert_eq!(outcome.error_code.as_deref(), Some("embedder_timeout"));
        assert!(outcome.vectors.is_empty());
    }
}
