//! Embeddings through any OpenAI-compatible `/embeddings` endpoint
//! (`SiliconFlow`, `OpenAI`, vLLM, ...).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::llm::error::ProviderError;
use crate::llm::http::{build_client, endpoint, post_json};
use crate::llm::retry::{RetryPolicy, retry_with_backoff};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::embedding::embedder::{EmbedFuture, Embedder, check_vectors};

const SERVICE: &str = "embedding";
const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";

/// HTTP embedding client.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    ndims: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    /// Build the client from config.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig, retry: RetryPolicy) -> MemoryResult<Self> {
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let client = build_client(SERVICE, config.timeout()).map_err(MemoryError::from)?;
        Ok(Self {
            client,
            url: endpoint(base_url, "embeddings"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            ndims: config.ndims,
            timeout: config.timeout(),
            retry,
        })
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let response: EmbeddingResponse = post_json(
            &self.client,
            SERVICE,
            &self.url,
            self.api_key.as_deref(),
            &request,
            self.timeout,
        )
        .await?;
        Ok(order_by_index(response.data))
    }
}

/// Providers may return items out of order; `index` restores input order.
fn order_by_index(mut data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    if data.iter().all(|item| item.index.is_some()) {
        data.sort_by_key(|item| item.index);
    }
    data.into_iter().map(|item| item.embedding).collect()
}

impl Embedder for HttpEmbedder {
    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, Result<Vec<Vec<f32>>, ProviderError>> {
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let vectors =
                retry_with_backoff(&self.retry, SERVICE, || self.embed_once(&texts)).await?;
            check_vectors(SERVICE, &vectors, texts.len(), self.ndims)?;
            Ok(vectors)
        })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}
