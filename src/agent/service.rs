//! Turn orchestration: retrieve memories, build the context, run the loop,
//! then learn from the message.

use std::sync::Arc;

use tracing::{info, warn};

use crate::agent::react::ReactLoop;
use crate::agent::turn::{AgentTurn, RetrievalStatus};
use crate::config::AgentConfig;
use crate::llm::reasoner::{Reasoner, TextModel};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::TurnId;
use crate::memory::core::record::RankedMemory;
use crate::memory::ingest::extractor::store_extracted;
use crate::memory::ingest::extractor_llm::MemoryExtractor;
use crate::memory::prompt::prompt_budget::{PromptParts, enforce_budget};
use crate::memory::prompt::prompt_builder::{HistoryMessage, build_prompt_block};
use crate::memory::retrieval::retriever::Retriever;
use crate::memory::storage::memory_store::MemoryStore;
use crate::tools::registry::ToolRegistry;

/// Memory-augmented agent, shared across turns.
pub struct AgentService {
    retriever: Arc<Retriever>,
    store: Arc<dyn MemoryStore>,
    reasoner: Arc<dyn Reasoner>,
    registry: Arc<ToolRegistry>,
    extractor: Option<MemoryExtractor>,
    config: AgentConfig,
}

impl AgentService {
    /// Assemble the agent. `extraction_model` backs model-driven memory
    /// extraction when the config selects it.
    ///
    /// # Errors
    /// Returns an error if the memory extractor cannot be built.
    pub fn new(
        retriever: Arc<Retriever>,
        store: Arc<dyn MemoryStore>,
        reasoner: Arc<dyn Reasoner>,
        registry: Arc<ToolRegistry>,
        extraction_model: Option<Arc<dyn TextModel>>,
        config: AgentConfig,
    ) -> MemoryResult<Self> {
        let extractor = if config.extract_memories {
            Some(
                MemoryExtractor::from_config(&config, extraction_model)
                    .map_err(|err| MemoryError::InvalidConfig(err.to_string()))?,
            )
        } else {
            None
        };
        Ok(Self {
            retriever,
            store,
            reasoner,
            registry,
            extractor,
            config,
        })
    }

    /// Memory store backing the agent.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Registered tools.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one user message and return the answer text.
    ///
    /// # Errors
    /// Returns a validation error for an empty user id or message.
    pub async fn handle_turn(&self, user_id: &str, message: &str, history: &[HistoryMessage]) -> MemoryResult<String> {
        Ok(self.run_turn(user_id, message, history).await?.final_answer)
    }

    /// Handle one user message and return the full turn record.
    ///
    /// Provider and tool failures never fail the turn; they degrade the
    /// answer and show up in the record.
    ///
    /// # Errors
    /// Returns a validation error for an empty user id or message.
    pub async fn run_turn(&self, user_id: &str, message: &str, history: &[HistoryMessage]) -> MemoryResult<AgentTurn> {
        let user_id = user_id.trim();
        let message = message.trim();
        if user_id.is_empty() {
            return Err(MemoryError::validation("user_id must not be empty"));
        }
        if message.is_empty() {
            return Err(MemoryError::validation("message must not be empty"));
        }

        let turn_id = TurnId::new();
        let window_start = history.len().saturating_sub(self.config.history_window);
        let turns = history[window_start..].to_vec();

        let (memories, retrieval) = self.retrieve(user_id, message).await;
        let parts = enforce_budget(
            PromptParts {
                memories,
                turns,
                user_message: message.to_string(),
            },
            self.config.context_max_chars,
        );
        let context_block = build_prompt_block(&parts);

        let outcome = ReactLoop::new(self.reasoner.as_ref(), &self.registry, &self.config)
            .run(user_id, &context_block)
            .await;

        let memories_written = self.learn(user_id, message).await;

        info!(
            %turn_id,
            user_id,
            termination = ?outcome.termination,
            think_cycles = outcome.think_cycles,
            actions = outcome.actions.len(),
            memories = parts.memories.len(),
            memories_written,
            "turn complete"
        );

        Ok(AgentTurn {
            turn_id,
            user_id: user_id.to_string(),
            query_text: message.to_string(),
            history: history.to_vec(),
            retrieved_memories: parts.memories,
            retrieval,
            actions_taken: outcome.actions,
            final_answer: outcome.final_answer,
            think_cycles: outcome.think_cycles,
            termination: outcome.termination,
            memories_written,
        })
    }

    async fn retrieve(&self, user_id: &str, message: &str) -> (Vec<RankedMemory>, RetrievalStatus) {
        match self.retriever.retrieve_for_query(user_id, message).await {
            Ok(outcome) => (outcome.memories, RetrievalStatus::Ranked {
                ranking: outcome.ranking,
            }),
            Err(err) => {
                warn!(user_id, error = %err, "memory retrieval failed; continuing without memories");
                (Vec::new(), RetrievalStatus::Unavailable {
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn learn(&self, user_id: &str, message: &str) -> usize {
        let Some(extractor) = &self.extractor else {
            return 0;
        };
        let found = extractor.extract(message).await;
        if found.is_empty() {
            return 0;
        }
        match store_extracted(self.store.as_ref(), user_id, &found).await {
            Ok(written) => written,
            Err(err) => {
                warn!(user_id, error = %err, "failed to store extracted memories");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::*;
    use crate::agent::turn::Termination;
    use crate::config::{CalendarConfig, MemoryExtractorKind, RetrievalConfig, SearchConfig};
    use crate::llm::decision::Decision;
    use crate::llm::error::ProviderError;
    use crate::llm::retry::RetryPolicy;
    use crate::memory::embedding::embedder::{EmbedFuture, Embedder};
    use crate::memory::ingest::preset::load_default_presets;
    use crate::memory::rerank::reranker::Reranker;
    use crate::memory::retrieval::retriever::RankingSource;
    use crate::memory::storage::memory_store::SqliteMemoryStore;
    use crate::testing::{
        CannedTextModel, GroundedReasoner, KeywordEmbedder, OverlapReranker, ScriptedReasoner, StallingReranker,
        StaticSearchBackend, UnknownToolReasoner,
    };
    use crate::tools::calendar::{BOOK_TOOL, Calendar, SqliteBookingStore};
    use crate::tools::search::{SEARCH_TOOL, SearchBackend, SearchTopic, WebSearchTool};
    use crate::tools::standard_registry;

    const USER: &str = "demo_user";

    struct Harness {
        service: AgentService,
        store: Arc<dyn MemoryStore>,
        search: Arc<StaticSearchBackend>,
    }

    struct DownEmbedder;

    impl Embedder for DownEmbedder {
        fn embed_texts(&self, _texts: Vec<String>) -> EmbedFuture<'_, Result<Vec<Vec<f32>>, ProviderError>> {
            Box::pin(async { Err(ProviderError::transport("embedding", "connection refused")) })
        }

        fn ndims(&self) -> usize {
            KeywordEmbedder::new().ndims()
        }
    }

    async fn harness_with(
        reasoner: Arc<dyn Reasoner>,
        reranker: Option<Arc<dyn Reranker>>,
        query_embedder: Option<Arc<dyn Embedder>>,
        extraction_model: Option<Arc<dyn TextModel>>,
    ) -> Harness {
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new());
        let store: Arc<dyn MemoryStore> =
            Arc::new(SqliteMemoryStore::open_in_memory(Arc::clone(&embedder)).await.unwrap());
        load_default_presets(store.as_ref(), USER).await.unwrap();

        let retriever = Arc::new(Retriever::new(
            Arc::clone(&store),
            query_embedder.unwrap_or(embedder),
            reranker,
            RetrievalConfig::default(),
        ));

        let bookings = Arc::new(SqliteBookingStore::open_in_memory().await.unwrap());
        // 2025-03-12 is a Wednesday.
        let calendar = Arc::new(
            Calendar::new(bookings, &CalendarConfig::default())
                .with_today(NaiveDate::from_ymd_opt(2025, 3, 12).unwrap()),
        );
        let search = Arc::new(StaticSearchBackend::with_snippet("Headline body."));
        let tool = WebSearchTool::new(
            Arc::clone(&search) as Arc<dyn SearchBackend>,
            &SearchConfig::default(),
            RetryPolicy::no_retry(),
        );
        let registry = Arc::new(standard_registry(&calendar, tool, Duration::from_secs(5)));

        let config = AgentConfig {
            memory_extractor: if extraction_model.is_some() {
                MemoryExtractorKind::Llm
            } else {
                MemoryExtractorKind::Heuristic
            },
            ..AgentConfig::default()
        };
        let service = AgentService::new(
            retriever,
            Arc::clone(&store),
            reasoner,
            registry,
            extraction_model,
            config,
        )
        .unwrap();
        Harness { service, store, search }
    }

    async fn harness(reasoner: Arc<dyn Reasoner>) -> Harness {
        harness_with(reasoner, Some(Arc::new(OverlapReranker)), None, None).await
    }

    #[tokio::test]
    async fn test_friday_afternoon_booking_from_preference() {
        let reasoner = Arc::new(GroundedReasoner::default());
        let h = harness(Arc::clone(&reasoner) as Arc<dyn Reasoner>).await;

        let turn = h.service.run_turn(USER, "Book a meeting room for me.", &[]).await.unwrap();

        assert_eq!(turn.termination, Termination::Answered);
        assert_eq!(turn.retrieval, RetrievalStatus::Ranked {
            ranking: RankingSource::Reranker
        });
        assert_eq!(
            turn.retrieved_memories[0].record.text,
            "User prefers to schedule meetings on Friday afternoons."
        );
        assert_eq!(turn.actions_taken.len(), 1);
        let booking = turn.actions_taken[0].result.as_ref().unwrap();
        assert_eq!(turn.actions_taken[0].tool_name, BOOK_TOOL);
        assert_eq!(booking["status"], "confirmed");
        assert_eq!(booking["date"], "2025-03-14");
        assert_eq!(booking["time"], "14:00");
        assert!(turn.final_answer.contains("2025-03-14"));

        let first = &reasoner.requests()[0];
        assert!(first.prompt.contains("- [preference] User prefers to schedule meetings on Friday afternoons."));
        assert!(first.system_prompt.contains(BOOK_TOOL));
    }

    #[tokio::test]
    async fn test_news_request_searches_each_followed_topic() {
        let h = harness(Arc::new(GroundedReasoner::default())).await;

        let turn = h
            .service
            .run_turn(USER, "what news should I read today", &[])
            .await
            .unwrap();

        let top: BTreeSet<&str> = turn.retrieved_memories[..2]
            .iter()
            .map(|m| m.record.text.as_str())
            .collect();
        assert_eq!(
            top,
            BTreeSet::from(["User follows EV industry news.", "User follows AI chip news."])
        );
        assert!(turn.retrieved_memories[..2].iter().all(|m| m.rank < 2));
        assert!(turn.retrieved_memories[2..].iter().all(|m| m.rank >= 2));
        let weakest_interest = turn.retrieved_memories[..2]
            .iter()
            .filter_map(|m| m.rerank_score)
            .fold(f32::INFINITY, f32::min);
        assert!(
            turn.retrieved_memories[2..]
                .iter()
                .all(|m| m.rerank_score.is_some_and(|score| score < weakest_interest))
        );

        let requests = h.search.requests();
        let queries: BTreeSet<String> = requests.iter().map(|r| r.query.clone()).collect();
        assert_eq!(
            queries,
            BTreeSet::from(["ev industry news".to_string(), "ai chip news".to_string()])
        );
        assert!(requests.iter().all(|r| r.topic == SearchTopic::News));
        assert_eq!(turn.termination, Termination::Answered);
        assert!(turn.final_answer.contains("ev industry news headline 1"));
        assert!(turn.final_answer.contains("ai chip news headline 1"));
    }

    #[tokio::test]
    async fn test_reranker_timeout_still_answers() {
        let h = harness_with(
            Arc::new(GroundedReasoner::default()),
            Some(Arc::new(StallingReranker::default())),
            None,
            None,
        )
        .await;

        let turn = h.service.run_turn(USER, "Any EV industry news", &[]).await.unwrap();

        assert!(matches!(
            &turn.retrieval,
            RetrievalStatus::Ranked { ranking: RankingSource::Fallback { reason } } if reason.contains("timed out")
        ));
        assert_eq!(turn.retrieved_memories[0].record.text, "User follows EV industry news.");
        assert!(turn.retrieved_memories.iter().all(|m| m.rerank_score.is_none()));
        assert_eq!(turn.termination, Termination::Answered);
        assert!(turn.actions_taken.iter().all(|a| a.tool_name == SEARCH_TOOL && a.succeeded()));
        assert!(!turn.final_answer.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_reasoner_terminates() {
        let h = harness(Arc::new(UnknownToolReasoner)).await;

        let turn = h.service.run_turn(USER, "Do something impossible", &[]).await.unwrap();

        assert_eq!(turn.termination, Termination::ContractViolations);
        assert!(turn.think_cycles <= AgentConfig::default().max_iterations);
        assert!(!turn.final_answer.is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_failure_runs_without_memories() {
        let reasoner = Arc::new(ScriptedReasoner::new([Ok(Decision::Answer("Hello.".to_string()))]));
        let h = harness_with(
            Arc::clone(&reasoner) as Arc<dyn Reasoner>,
            None,
            Some(Arc::new(DownEmbedder)),
            None,
        )
        .await;

        let turn = h.service.run_turn(USER, "hello there", &[]).await.unwrap();

        assert!(matches!(turn.retrieval, RetrievalStatus::Unavailable { .. }));
        assert!(turn.retrieved_memories.is_empty());
        assert_eq!(turn.final_answer, "Hello.");
        assert!(reasoner.requests()[0].prompt.starts_with("[USER_MEMORIES]\n(none)\n"));
    }

    #[tokio::test]
    async fn test_history_window_and_memory_learning() {
        let reasoner = Arc::new(ScriptedReasoner::new([Ok(Decision::Answer("Noted.".to_string()))]));
        let h = harness(Arc::clone(&reasoner) as Arc<dyn Reasoner>).await;
        let history: Vec<HistoryMessage> = (0..20)
            .map(|i| HistoryMessage::user(format!("old message {i}")))
            .collect();

        let turn = h
            .service
            .run_turn(USER, "I prefer meetings in the morning.", &history)
            .await
            .unwrap();

        assert_eq!(turn.memories_written, 1);
        assert_eq!(h.store.count(USER).await.unwrap(), 5);
        let prompt = &reasoner.requests()[0].prompt;
        assert!(!prompt.contains("old message 7\n"));
        assert!(prompt.contains("User: old message 8\n"));
        assert!(prompt.contains("User: old message 19\n"));
    }

    #[tokio::test]
    async fn test_model_extraction_stores_typed_memories() {
        let reasoner = Arc::new(ScriptedReasoner::new([Ok(Decision::Answer("Noted.".to_string()))]));
        let model = Arc::new(CannedTextModel::replying(
            r#"[{"type": "terminology", "content": "User calls the Q3 sales report 'the dashboard'"}]"#,
        ));
        let h = harness_with(
            reasoner,
            Some(Arc::new(OverlapReranker)),
            None,
            Some(Arc::clone(&model) as Arc<dyn TextModel>),
        )
        .await;

        let turn = h
            .service
            .run_turn(USER, "When I say the dashboard I mean the Q3 sales report", &[])
            .await
            .unwrap();

        assert_eq!(turn.memories_written, 1);
        assert_eq!(model.prompts().len(), 1);
        assert!(model.prompts()[0].contains("the Q3 sales report"));
        assert!(
            h.store
                .contains_text(USER, "User calls the Q3 sales report 'the dashboard'")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let h = harness(Arc::new(UnknownToolReasoner)).await;
        assert!(h.service.handle_turn(USER, "   ", &[]).await.unwrap_err().is_validation());
        assert!(h.service.handle_turn("", "hi", &[]).await.unwrap_err().is_validation());
    }
}
