//! Embedding clients.

pub mod cached;
pub mod embedder;
pub mod openai_compat;

use std::sync::Arc;

pub use cached::CachedEmbedder;
pub use embedder::{EmbedFuture, Embedder, OllamaEmbedder, check_vectors};
pub use openai_compat::HttpEmbedder;

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::llm::retry::RetryPolicy;
use crate::memory::core::errors::MemoryResult;

/// Build the configured embedder, wrapped in the query cache.
///
/// # Errors
/// Returns an error if the provider client cannot be built.
pub fn build_embedder(config: &EmbeddingConfig, retry: &RetryPolicy) -> MemoryResult<Arc<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(config, retry.clone())?),
        EmbeddingProvider::OpenAiCompatible => Arc::new(HttpEmbedder::new(config, retry.clone())?),
    };
    Ok(CachedEmbedder::wrap(inner, config.query_cache_capacity))
}
