//! Embedding client abstraction and the Rig + Ollama implementation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client as ReqwestClient;
use rig::client::{EmbeddingsClient, Nothing};
use rig::embeddings::EmbeddingModel;
use rig::providers::ollama;

use crate::config::EmbeddingConfig;
use crate::llm::error::ProviderError;
use crate::llm::retry::{RetryPolicy, retry_with_backoff, with_timeout};
use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Boxed future type for embedder operations.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Black-box text embedding provider.
pub trait Embedder: Send + Sync {
    /// Embed multiple texts, one vector per input, in input order.
    ///
    /// # Errors
    /// Returns an error if the provider fails or returns vectors of the wrong
    /// dimensionality.
    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, Result<Vec<Vec<f32>>, ProviderError>>;

    /// Return embedding dimensionality.
    fn ndims(&self) -> usize;

    /// Embed a single text string.
    ///
    /// # Errors
    /// Returns an error if the embedding request fails.
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, Result<Vec<f32>, ProviderError>> {
        let text = text.to_string();
        Box::pin(async move {
            let mut vectors = self.embed_texts(vec![text]).await?;
            vectors
                .pop()
                .ok_or_else(|| ProviderError::malformed("embedding", "no vector returned"))
        })
    }
}

/// Check that a provider returned one vector of the expected size per input.
///
/// # Errors
/// Returns a malformed-response error on count or dimension mismatch.
pub fn check_vectors(
    service: &str,
    vectors: &[Vec<f32>],
    expected_count: usize,
    ndims: usize,
) -> Result<(), ProviderError> {
    if vectors.len() != expected_count {
        return Err(ProviderError::malformed(
            service,
            format!("expected {expected_count} vectors, got {}", vectors.len()),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != ndims) {
        return Err(ProviderError::malformed(
            service,
            format!("expected {ndims} dimensions, got {}", bad.len()),
        ));
    }
    Ok(())
}

type OllamaEmbeddingModel = ollama::EmbeddingModel<ReqwestClient>;

const OLLAMA_SERVICE: &str = "ollama-embedding";

/// Ollama embedder using Rig provider.
#[derive(Clone)]
pub struct OllamaEmbedder {
    model: OllamaEmbeddingModel,
    ndims: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder from config.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &EmbeddingConfig, retry: RetryPolicy) -> MemoryResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(MemoryError::from)?;
        let model = client.embedding_model_with_ndims(config.model.clone(), config.ndims);
        Ok(Self {
            model,
            ndims: config.ndims,
            timeout: config.timeout(),
            retry,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn embed_once(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
        let embeddings = self
            .model
            .embed_texts(texts)
            .await
            .map_err(|err| ProviderError::transport(OLLAMA_SERVICE, err.to_string()))?;
        Ok(embeddings
            .into_iter()
            .map(|embedding| embedding.vec.into_iter().map(|x| x as f32).collect())
            .collect())
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, Result<Vec<Vec<f32>>, ProviderError>> {
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let expected = texts.len();
            let vectors = retry_with_backoff(&self.retry, OLLAMA_SERVICE, || {
                with_timeout(OLLAMA_SERVICE, self.timeout, self.embed_once(texts.clone()))
            })
            .await?;
            check_vectors(OLLAMA_SERVICE, &vectors, expected, self.ndims)?;
            Ok(vectors)
        })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}
