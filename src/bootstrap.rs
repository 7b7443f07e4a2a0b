//! Startup for the digital employee server: logging, configuration,
//! component wiring, demo seeding, and serving until Ctrl-C.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;

use crate::agent::AgentService;
use crate::config::{AppConfig, MemoryExtractorKind};
use crate::llm::reasoner::{OllamaReasoner, Reasoner, TextModel};
use crate::memory::embedding::build_embedder;
use crate::memory::ingest::preset::load_default_presets;
use crate::memory::rerank::reranker::{HttpReranker, Reranker};
use crate::memory::retrieval::retriever::Retriever;
use crate::memory::storage::memory_store::{MemoryStore, SqliteMemoryStore};
use crate::server::{self, AppState};
use crate::tools::calendar::{Calendar, SqliteBookingStore};
use crate::tools::search::{WebSearchTool, build_search_backend};
use crate::tools::standard_registry;

/// Run the server.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting digital employee v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e:#}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve(config)) {
        tracing::error!("Server error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

fn load_config() -> anyhow::Result<AppConfig> {
    let config = AppConfig::from_env().context("reading environment overrides")?;
    config.validate().context("validating configuration")?;
    Ok(config)
}

/// Build every component from `config`.
///
/// # Errors
/// Returns an error if a store cannot be opened or a client cannot be built.
pub async fn build_state(config: &AppConfig) -> anyhow::Result<Arc<AppState>> {
    let embedder = build_embedder(&config.embedding, &config.retry).context("building embedder")?;
    let store: Arc<dyn MemoryStore> = Arc::new(
        SqliteMemoryStore::open(&config.storage, Arc::clone(&embedder))
            .await
            .context("opening memory store")?,
    );

    let reranker: Option<Arc<dyn Reranker>> = if config.reranker.enabled {
        Some(Arc::new(
            HttpReranker::new(&config.reranker, config.retry.clone()).context("building reranker")?,
        ))
    } else {
        tracing::warn!("reranker disabled; memories ordered by similarity");
        None
    };
    let retriever = Arc::new(Retriever::new(
        Arc::clone(&store),
        embedder,
        reranker,
        config.retrieval.clone(),
    ));

    let ollama = Arc::new(OllamaReasoner::new(&config.llm, config.retry.clone()).context("building reasoner")?);
    let extraction_model: Option<Arc<dyn TextModel>> =
        (config.agent.memory_extractor == MemoryExtractorKind::Llm).then(|| Arc::clone(&ollama) as Arc<dyn TextModel>);
    let reasoner: Arc<dyn Reasoner> = ollama;

    let bookings = Arc::new(
        SqliteBookingStore::open(&config.storage)
            .await
            .context("opening booking store")?,
    );
    let calendar = Arc::new(Calendar::new(bookings, &config.calendar));
    let backend = build_search_backend(&config.search).context("building search backend")?;
    tracing::info!(backend = backend.name(), "web search ready");
    let search = WebSearchTool::new(backend, &config.search, config.retry.clone());
    let registry = Arc::new(standard_registry(&calendar, search, config.agent.tool_timeout()));

    if config.demo.seed_presets {
        load_default_presets(store.as_ref(), &config.demo.user_id)
            .await
            .context("seeding preset memories")?;
    }

    let agent = AgentService::new(retriever, store, reasoner, registry, extraction_model, config.agent.clone())
        .context("building agent")?;
    Ok(AppState::new(Arc::new(agent), calendar))
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    server::run_server_with_shutdown(state, config.server.port, shutdown_signal())
        .await
        .context("serving HTTP")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
