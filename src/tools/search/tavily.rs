//! Tavily search API backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::llm::error::ProviderError;
use crate::llm::http::{build_client, endpoint, post_json};
use crate::tools::search::{SearchBackend, SearchFuture, SearchHit, SearchRequest, SearchResponse, SearchTopic};

const SERVICE: &str = "tavily";

/// Tavily `POST /search` backend.
pub struct TavilyBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    topic: &'a str,
    max_results: usize,
    search_depth: &'a str,
    include_answer: bool,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilyBackend {
    /// Backend from config.
    ///
    /// # Errors
    /// Returns a transport error if the HTTP client cannot be built, or a
    /// malformed error when no API key is configured.
    pub fn new(config: &SearchConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .tavily_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ProviderError::malformed(SERVICE, "no API key configured"))?;
        Ok(Self {
            client: build_client(SERVICE, config.timeout())?,
            url: endpoint(&config.tavily_base_url, "search"),
            api_key,
            timeout: config.timeout(),
        })
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SearchResponse, ProviderError> {
        let news = request.topic == SearchTopic::News;
        let body = TavilyRequest {
            api_key: &self.api_key,
            query: &request.query,
            topic: request.topic.as_str(),
            max_results: request.max_results,
            search_depth: if news { "advanced" } else { "basic" },
            include_answer: news,
        };
        let response: TavilyResponse = post_json(&self.client, SERVICE, &self.url, None, &body, self.timeout).await?;
        Ok(SearchResponse {
            answer: response.answer.filter(|a| !a.trim().is_empty()),
            results: response
                .results
                .into_iter()
                .filter(|r| !r.url.is_empty())
                .map(|r| SearchHit {
                    title: r.title,
                    url: r.url,
                    snippet: r.content,
                })
                .collect(),
        })
    }
}

impl SearchBackend for TavilyBackend {
    fn name(&self) -> &'static str {
        SERVICE
    }

    fn search<'a>(&'a self, request: &'a SearchRequest) -> SearchFuture<'a> {
        Box::pin(self.fetch(request))
    }
}
