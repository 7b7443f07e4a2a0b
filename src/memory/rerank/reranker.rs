//! Cross-encoder reranking.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RerankerConfig;
use crate::llm::error::ProviderError;
use crate::llm::http::{build_client, endpoint, post_json};
use crate::llm::retry::{RetryPolicy, retry_with_backoff};
use crate::memory::core::errors::{MemoryError, MemoryResult};

const SERVICE: &str = "rerank";

/// Boxed future type for rerank calls.
pub type RerankFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<f32>, ProviderError>> + Send + 'a>>;

/// Black-box relevance scorer.
pub trait Reranker: Send + Sync {
    /// Score every document against the query. The result has exactly one
    /// score per document, in document order.
    ///
    /// # Errors
    /// Returns a provider error on timeout, transport failure, or a response
    /// that does not cover every document exactly once.
    fn rerank<'a>(&'a self, query: &'a str, documents: &'a [String]) -> RerankFuture<'a>;
}

/// Reranker speaking the `/rerank` protocol shared by `SiliconFlow`, Jina and
/// Cohere-compatible gateways.
pub struct HttpReranker {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
    return_documents: bool,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl HttpReranker {
    /// Build the client from config.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &RerankerConfig, retry: RetryPolicy) -> MemoryResult<Self> {
        let client = build_client(SERVICE, config.timeout()).map_err(MemoryError::from)?;
        Ok(Self {
            client,
            url: endpoint(&config.base_url, "rerank"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: config.timeout(),
            retry,
        })
    }

    async fn rerank_once(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, ProviderError> {
        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n: documents.len(),
            return_documents: false,
        };
        let response: RerankResponse = post_json(
            &self.client,
            SERVICE,
            &self.url,
            self.api_key.as_deref(),
            &request,
            self.timeout,
        )
        .await?;
        scores_by_index(response.results, documents.len())
    }
}

/// Scatter `(index, score)` pairs back into document order.
fn scores_by_index(results: Vec<RerankResult>, expected: usize) -> Result<Vec<f32>, ProviderError> {
    let mut scores: Vec<Option<f32>> = vec![None; expected];
    for result in results {
        let slot = scores.get_mut(result.index).ok_or_else(|| {
            ProviderError::malformed(
                SERVICE,
                format!("index {} out of range for {expected} documents", result.index),
            )
        })?;
        if slot.replace(result.relevance_score).is_some() {
            return Err(ProviderError::malformed(
                SERVICE,
                format!("duplicate score for index {}", result.index),
            ));
        }
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(idx, score)| {
            score.ok_or_else(|| ProviderError::malformed(SERVICE, format!("no score for index {idx}")))
        })
        .collect()
}

impl Reranker for HttpReranker {
    fn rerank<'a>(&'a self, query: &'a str, documents: &'a [String]) -> RerankFuture<'a> {
        Box::pin(async move {
            if documents.is_empty() {
                return Ok(Vec::new());
            }
            let scores =
                retry_with_backoff(&self.retry, SERVICE, || self.rerank_once(query, documents)).await?;
            debug!(documents = documents.len(), "rerank complete");
            Ok(scores)
        })
    }
}
