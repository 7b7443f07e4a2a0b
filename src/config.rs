//! Application configuration.
//!
//! One immutable [`AppConfig`] is built at startup (defaults, then
//! `DIGITAL_EMPLOYEE_*` environment overrides), validated once, and threaded
//! into constructors.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::llm::retry::RetryPolicy;
use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "DIGITAL_EMPLOYEE_";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Embedding provider settings.
    pub embedding: EmbeddingConfig,
    /// Reranker provider settings.
    pub reranker: RerankerConfig,
    /// Retrieval settings.
    pub retrieval: RetrievalConfig,
    /// Reasoning model settings.
    pub llm: LlmConfig,
    /// Agent loop settings.
    pub agent: AgentConfig,
    /// Web search tool settings.
    pub search: SearchConfig,
    /// Calendar tool settings.
    pub calendar: CalendarConfig,
    /// Retry policy for provider calls.
    pub retry: RetryPolicy,
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Demo user seeding.
    pub demo: DemoConfig,
}

impl AppConfig {
    /// Build the configuration from defaults and environment overrides.
    ///
    /// # Errors
    /// Returns an error if an override cannot be parsed.
    pub fn from_env() -> MemoryResult<Self> {
        let mut config = Self::default();

        if let Some(path) = env_var("SQLITE_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }

        if let Some(provider) = env_var("EMBEDDING_PROVIDER") {
            config.embedding.provider = provider.parse()?;
        }
        if let Some(model) = env_var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(ndims) = env_parse("EMBEDDING_NDIMS")? {
            config.embedding.ndims = ndims;
        }
        config.embedding.base_url = env_var("EMBEDDING_BASE_URL").or(config.embedding.base_url);
        config.embedding.api_key = env_var("EMBEDDING_API_KEY").or(config.embedding.api_key);

        if let Some(enabled) = env_parse("RERANKER_ENABLED")? {
            config.reranker.enabled = enabled;
        }
        if let Some(model) = env_var("RERANKER_MODEL") {
            config.reranker.model = model;
        }
        if let Some(base_url) = env_var("RERANKER_BASE_URL") {
            config.reranker.base_url = base_url;
        }
        config.reranker.api_key = env_var("RERANKER_API_KEY").or(config.reranker.api_key);

        if let Some(top_k) = env_parse("RETRIEVAL_TOP_K")? {
            config.retrieval.top_k = top_k;
        }
        if let Some(policy) = env_var("RERANK_FAILURE_POLICY") {
            config.retrieval.on_rerank_failure = policy.parse()?;
        }

        if let Some(model) = env_var("LLM_MODEL") {
            config.llm.model = model;
        }
        config.llm.base_url = env_var("LLM_BASE_URL").or(config.llm.base_url);

        if let Some(max_iterations) = env_parse("AGENT_MAX_ITERATIONS")? {
            config.agent.max_iterations = max_iterations;
        }
        if let Some(extractor) = env_var("MEMORY_EXTRACTOR") {
            config.agent.memory_extractor = extractor.parse()?;
        }

        if let Some(key) = env_var("TAVILY_API_KEY") {
            config.search.tavily_api_key = Some(key);
            config.search.backend = SearchBackendKind::Tavily;
        }
        if let Some(backend) = env_var("SEARCH_BACKEND") {
            config.search.backend = backend.parse()?;
        }

        if let Some(port) = env_parse("PORT")? {
            config.server.port = port;
        }
        if let Some(user_id) = env_var("DEMO_USER") {
            config.demo.user_id = user_id;
        }
        if let Some(seed) = env_parse("SEED_PRESETS")? {
            config.demo.seed_presets = seed;
        }

        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.embedding.ndims == 0 {
            return Err(invalid("embedding.ndims must be > 0"));
        }

        if self.retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k must be > 0"));
        }

        if self.retrieval.overfetch_factor < 2 {
            return Err(invalid("retrieval.overfetch_factor must be >= 2"));
        }

        if self.agent.max_iterations == 0 {
            return Err(invalid("agent.max_iterations must be > 0"));
        }

        if self.agent.context_max_chars == 0 {
            return Err(invalid("agent.context_max_chars must be > 0"));
        }

        if self.agent.memory_extractor == MemoryExtractorKind::Llm && self.agent.llm_extract_max_items == 0 {
            return Err(invalid("agent.llm_extract_max_items must be > 0"));
        }

        if self.search.max_results == 0 || self.search.max_results > 10 {
            return Err(invalid("search.max_results must be within 1..=10"));
        }

        if self.calendar.rooms.is_empty() {
            return Err(invalid("calendar.rooms must not be empty"));
        }

        for (name, timeout_ms) in [
            ("embedding.timeout_ms", self.embedding.timeout_ms),
            ("reranker.timeout_ms", self.reranker.timeout_ms),
            ("llm.timeout_ms", self.llm.timeout_ms),
            ("agent.tool_timeout_ms", self.agent.tool_timeout_ms),
            ("search.timeout_ms", self.search.timeout_ms),
        ] {
            if timeout_ms == 0 {
                return Err(invalid(&format!("{name} must be > 0")));
            }
        }

        if let Some(base_url) = &self.embedding.base_url {
            Url::parse(base_url)?;
        }
        if let Some(base_url) = &self.llm.base_url {
            Url::parse(base_url)?;
        }
        Url::parse(&self.reranker.base_url)?;
        Url::parse(&self.search.tavily_base_url)?;

        if self.search.backend == SearchBackendKind::Tavily && self.search.tavily_api_key.is_none()
        {
            return Err(invalid("search.backend = tavily requires an API key"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> MemoryError {
    MemoryError::InvalidConfig(message.to_string())
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> MemoryResult<Option<T>> {
    env_var(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| {
                MemoryError::InvalidConfig(format!("{ENV_PREFIX}{name} has an invalid value: {raw}"))
            })
        })
        .transpose()
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Memory record table name. The vector index is `{memory_table}_vectors`.
    pub memory_table: String,
    /// Meeting room booking table name.
    pub booking_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("digital_employee.sqlite"),
            memory_table: "memory_records".to_string(),
            booking_table: "room_bookings".to_string(),
        }
    }
}

/// Which embedding backend to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Local Ollama embeddings through Rig.
    Ollama,
    /// Any OpenAI-compatible `/embeddings` endpoint.
    OpenAiCompatible,
}

impl FromStr for EmbeddingProvider {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "openai_compatible" | "siliconflow" => Ok(Self::OpenAiCompatible),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown embedding provider: {other}"
            ))),
        }
    }
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend.
    pub provider: EmbeddingProvider,
    /// Model name.
    pub model: String,
    /// Vector dimensionality, fixed per deployment.
    pub ndims: usize,
    /// Optional custom base URL.
    pub base_url: Option<String>,
    /// API key for hosted providers.
    pub api_key: Option<String>,
    /// Per-request deadline.
    pub timeout_ms: u64,
    /// Capacity of the query embedding LRU cache (0 disables it).
    pub query_cache_capacity: usize,
}

impl EmbeddingConfig {
    /// Request deadline as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            model: "nomic-embed-text".to_string(),
            ndims: 768,
            base_url: None,
            api_key: None,
            timeout_ms: 30_000,
            query_cache_capacity: 256,
        }
    }
}

/// Reranker settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Disable to rank by similarity only.
    pub enabled: bool,
    /// Cross-encoder model name.
    pub model: String,
    /// Base URL; requests go to `{base_url}/rerank`.
    pub base_url: String,
    /// API key.
    pub api_key: Option<String>,
    /// Per-request deadline.
    pub timeout_ms: u64,
}

impl RerankerConfig {
    /// Request deadline as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "BAAI/bge-reranker-v2-m3".to_string(),
            base_url: "https://api.siliconflow.cn/v1".to_string(),
            api_key: None,
            timeout_ms: 10_000,
        }
    }
}

/// What the retriever does when the reranker fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankFailurePolicy {
    /// Keep the store's similarity order.
    #[default]
    SimilarityOrder,
    /// Return no memories for the turn.
    NoMemories,
}

impl FromStr for RerankFailurePolicy {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "similarity" | "similarity_order" => Ok(Self::SimilarityOrder),
            "none" | "no_memories" => Ok(Self::NoMemories),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown rerank failure policy: {other}"
            ))),
        }
    }
}

/// Retrieval settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of memories handed to the agent.
    pub top_k: usize,
    /// Candidates fetched per final memory.
    pub overfetch_factor: usize,
    /// Degradation when reranking fails.
    pub on_rerank_failure: RerankFailurePolicy,
}

impl RetrievalConfig {
    /// Number of candidates to fetch for `top_k` final memories.
    #[must_use]
    pub const fn candidates_for(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.overfetch_factor)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            overfetch_factor: 3,
            on_rerank_failure: RerankFailurePolicy::SimilarityOrder,
        }
    }
}

/// Reasoning model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama completion model name.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Optional max tokens.
    pub max_tokens: Option<u64>,
    /// Optional custom base URL.
    pub base_url: Option<String>,
    /// Per-request deadline.
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Request deadline as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen3:8b".to_string(),
            temperature: 0.2,
            max_tokens: None,
            base_url: None,
            timeout_ms: 60_000,
        }
    }
}

/// Agent loop settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Ceiling on THINK cycles per turn.
    pub max_iterations: usize,
    /// THINK retries allowed after a contract violation.
    pub malformed_retries: usize,
    /// Consecutive fully-failed ACT steps before answering.
    pub max_tool_failures: usize,
    /// Deadline for a single tool call.
    pub tool_timeout_ms: u64,
    /// Character budget for memories and history in the prompt.
    pub context_max_chars: usize,
    /// Most recent history messages considered.
    pub history_window: usize,
    /// Store new preference/interest memories found in user messages.
    pub extract_memories: bool,
    /// How memories are found in user messages.
    pub memory_extractor: MemoryExtractorKind,
    /// Most memories kept from one model extraction.
    pub llm_extract_max_items: usize,
    /// Minimum length of an extracted memory.
    pub min_memory_chars: usize,
    /// Maximum length of an extracted memory.
    pub max_memory_chars: usize,
}

impl AgentConfig {
    /// Tool deadline as a [`Duration`].
    #[must_use]
    pub const fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            malformed_retries: 1,
            max_tool_failures: 2,
            tool_timeout_ms: 20_000,
            context_max_chars: 6_000,
            history_window: 12,
            extract_memories: true,
            memory_extractor: MemoryExtractorKind::Heuristic,
            llm_extract_max_items: 5,
            min_memory_chars: 6,
            max_memory_chars: 300,
        }
    }
}

/// Memory extraction strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryExtractorKind {
    /// Pattern rules only.
    #[default]
    Heuristic,
    /// Ask the reasoning model, falling back to the pattern rules.
    Llm,
}

impl FromStr for MemoryExtractorKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "heuristic" | "regex" => Ok(Self::Heuristic),
            "llm" | "model" => Ok(Self::Llm),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown memory extractor: {other}"
            ))),
        }
    }
}

/// Which search backend the web search tool uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackendKind {
    /// DuckDuckGo HTML results, no key required.
    DuckDuckGo,
    /// Tavily search API.
    Tavily,
}

impl FromStr for SearchBackendKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "duckduckgo" | "ddg" => Ok(Self::DuckDuckGo),
            "tavily" => Ok(Self::Tavily),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown search backend: {other}"
            ))),
        }
    }
}

/// Web search settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Backend.
    pub backend: SearchBackendKind,
    /// Tavily API key.
    pub tavily_api_key: Option<String>,
    /// Tavily base URL.
    pub tavily_base_url: String,
    /// Default number of results.
    pub max_results: usize,
    /// Per-request deadline.
    pub timeout_ms: u64,
    /// Cache TTL (0 disables caching).
    pub cache_ttl_seconds: u64,
    /// Maximum cached queries.
    pub cache_max_entries: usize,
}

impl SearchConfig {
    /// Request deadline as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: SearchBackendKind::DuckDuckGo,
            tavily_api_key: None,
            tavily_base_url: "https://api.tavily.com".to_string(),
            max_results: 5,
            timeout_ms: 15_000,
            cache_ttl_seconds: 600,
            cache_max_entries: 256,
        }
    }
}

/// Calendar tool settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Bookable rooms, in preference order.
    pub rooms: Vec<String>,
    /// Calendar name used in the iCalendar feed.
    pub calendar_name: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            rooms: [
                "1001 Medium Room",
                "1013 Small Room",
                "1015 Medium Room",
                "1106 Meeting Room",
                "1113 Large Room",
                "1117 Small Room",
                "601 Meeting Room",
                "602 Meeting Room",
                "603 Meeting Room",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            calendar_name: "Digital Employee Bookings".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

/// Demo user settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DemoConfig {
    /// User whose preset memories are seeded at startup.
    pub user_id: String,
    /// Seed the default presets at startup.
    pub seed_presets: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            user_id: "demo_user".to_string(),
            seed_presets: true,
        }
    }
}
