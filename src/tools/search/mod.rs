//! Web search tool and its backends.

pub mod cache;
pub mod duckduckgo;
pub mod tavily;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{SearchBackendKind, SearchConfig};
use crate::llm::error::ProviderError;
use crate::llm::retry::{RetryPolicy, retry_with_backoff};
use crate::memory::core::errors::MemoryResult;
use crate::tools::error::ToolError;
use crate::tools::registry::{Tool, ToolFuture};
use crate::tools::schema::{ArgKind, ArgSpec, Arguments, ToolSpec};

pub use cache::SearchCache;
pub use duckduckgo::DuckDuckGoBackend;
pub use tavily::TavilyBackend;

/// Search tool name.
pub const SEARCH_TOOL: &str = "web_search";

/// Snippets handed to the reasoner are cut to this many characters.
pub const MAX_SNIPPET_CHARS: usize = 300;

/// Boxed future type for backend searches.
pub type SearchFuture<'a> = Pin<Box<dyn Future<Output = Result<SearchResponse, ProviderError>> + Send + 'a>>;

/// Kind of search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTopic {
    /// General web results.
    General,
    /// Recent news.
    News,
}

impl SearchTopic {
    /// Stable identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::News => "news",
        }
    }
}

/// A backend search request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
    /// Query text.
    pub query: String,
    /// Kind of search.
    pub topic: SearchTopic,
    /// Upper bound on results.
    pub max_results: usize,
}

/// One search hit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// Page title.
    pub title: String,
    /// Page URL.
    pub url: String,
    /// Text excerpt.
    pub snippet: String,
}

/// Backend response, hits in backend relevance order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SearchResponse {
    /// Short synthesized answer, when the backend provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Hits.
    pub results: Vec<SearchHit>,
}

/// Black-box search provider.
pub trait SearchBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Run one search.
    ///
    /// # Errors
    /// Returns a provider error on timeout, transport failure, non-2xx
    /// status, or an undecodable response.
    fn search<'a>(&'a self, request: &'a SearchRequest) -> SearchFuture<'a>;
}

/// Build the configured backend.
///
/// # Errors
/// Returns an error if the backend cannot be initialized.
pub fn build_search_backend(config: &SearchConfig) -> MemoryResult<Arc<dyn SearchBackend>> {
    let backend: Arc<dyn SearchBackend> = match config.backend {
        SearchBackendKind::DuckDuckGo => Arc::new(DuckDuckGoBackend::new(config.timeout())?),
        SearchBackendKind::Tavily => Arc::new(TavilyBackend::new(config)?),
    };
    Ok(backend)
}

/// `web_search(query, topic?, max_results?)`.
pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
    cache: SearchCache,
    retry: RetryPolicy,
    default_max_results: usize,
    spec: ToolSpec,
}

impl WebSearchTool {
    /// Tool over `backend`, with caching and retry from config.
    #[must_use]
    pub fn new(backend: Arc<dyn SearchBackend>, config: &SearchConfig, retry: RetryPolicy) -> Self {
        Self {
            backend,
            cache: SearchCache::new(Duration::from_secs(config.cache_ttl_seconds), config.cache_max_entries),
            retry,
            default_max_results: config.max_results.clamp(1, 10),
            spec: ToolSpec {
                name: SEARCH_TOOL,
                description: "Search the web. Use topic `news` for recent news on a subject.",
                args: vec![
                    ArgSpec::required("query", "Search query", ArgKind::String { max_len: 200 }),
                    ArgSpec::optional("topic", "general or news", ArgKind::Enum(&["general", "news"])),
                    ArgSpec::optional(
                        "max_results",
                        "Number of results, default 5",
                        ArgKind::Integer { min: 1, max: 10 },
                    ),
                ],
            },
        }
    }

    async fn run(&self, args: Arguments) -> Result<Value, ToolError> {
        let query = args.str("query").unwrap_or_default().to_string();
        let topic = match args.str("topic") {
            Some("news") => SearchTopic::News,
            _ => SearchTopic::General,
        };
        let max_results = args
            .int("max_results")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(self.default_max_results);
        let request = SearchRequest {
            query,
            topic,
            max_results,
        };

        let response = if let Some(cached) = self.cache.get(&request) {
            debug!(query = %request.query, "search cache hit");
            cached
        } else {
            let backend = self.backend.name();
            let mut response = retry_with_backoff(&self.retry, backend, || self.backend.search(&request))
                .await
                .map_err(|err| ToolError::execution(SEARCH_TOOL, err))?;
            response.results.truncate(request.max_results);
            for hit in &mut response.results {
                hit.snippet = truncate_snippet(&hit.snippet);
            }
            self.cache.insert(&request, &response);
            response
        };

        let mut value = json!({
            "query": request.query,
            "topic": request.topic.as_str(),
            "results": response.results,
        });
        if let (Some(answer), Some(object)) = (response.answer, value.as_object_mut()) {
            object.insert("answer".to_string(), Value::from(answer));
        }
        Ok(value)
    }
}

impl Tool for WebSearchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn call<'a>(&'a self, _user_id: &'a str, args: Arguments) -> ToolFuture<'a> {
        Box::pin(self.run(args))
    }
}

fn truncate_snippet(snippet: &str) -> String {
    let trimmed = snippet.trim();
    match trimmed.char_indices().nth(MAX_SNIPPET_CHARS) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}
