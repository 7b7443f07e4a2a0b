//! Two-stage retrieval: vector search for candidates, then cross-encoder
//! reranking down to the memories handed to the agent.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{RerankFailurePolicy, RetrievalConfig};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::record::{RankedMemory, RetrievalCandidate};
use crate::memory::embedding::embedder::Embedder;
use crate::memory::rerank::reranker::Reranker;
use crate::memory::retrieval::ranking::{rank_by_rerank, rank_by_similarity};
use crate::memory::storage::memory_store::MemoryStore;

/// How the returned memories were ordered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RankingSource {
    /// Cross-encoder scores.
    Reranker,
    /// No reranker configured; similarity order by choice.
    SimilarityOnly,
    /// The reranker failed and the configured fallback was applied.
    Fallback {
        /// Why reranking was skipped.
        reason: String,
    },
}

/// Result of one retrieval.
#[derive(Clone, Debug, Serialize)]
pub struct RetrievalOutcome {
    /// Ranked memories, rank 0 first.
    pub memories: Vec<RankedMemory>,
    /// Ordering used.
    pub ranking: RankingSource,
}

impl RetrievalOutcome {
    /// Whether ranking fell back because the reranker failed.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self.ranking, RankingSource::Fallback { .. })
    }
}

/// Retriever over a memory store.
pub struct Retriever {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a retriever. Without a reranker, memories are ordered by
    /// similarity.
    #[must_use]
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            config,
        }
    }

    /// Retrieval settings in use.
    #[must_use]
    pub const fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve with the configured `top_k` and over-fetch factor.
    ///
    /// # Errors
    /// See [`Retriever::retrieve`].
    pub async fn retrieve_for_query(&self, user_id: &str, query_text: &str) -> MemoryResult<RetrievalOutcome> {
        let top_k = self.config.top_k;
        self.retrieve(user_id, query_text, self.config.candidates_for(top_k), top_k)
            .await
    }

    /// Fetch `top_k_candidates` by similarity, rerank them against
    /// `query_text`, and keep the best `top_k_final`.
    ///
    /// # Errors
    /// Returns a validation error when `top_k_final` is zero, when
    /// `top_k_candidates` does not exceed it, or when the query is empty.
    /// Embedding and store failures are returned as errors; reranker failures
    /// degrade according to [`RerankFailurePolicy`].
    pub async fn retrieve(
        &self,
        user_id: &str,
        query_text: &str,
        top_k_candidates: usize,
        top_k_final: usize,
    ) -> MemoryResult<RetrievalOutcome> {
        if top_k_final == 0 {
            return Err(MemoryError::validation("top_k_final must be > 0"));
        }
        if top_k_candidates <= top_k_final {
            return Err(MemoryError::validation(format!(
                "top_k_candidates ({top_k_candidates}) must exceed top_k_final ({top_k_final})"
            )));
        }
        if query_text.trim().is_empty() {
            return Err(MemoryError::validation("query text must not be empty"));
        }

        let query_embedding = self.embedder.embed_text(query_text).await?;
        let candidates = self
            .store
            .search(user_id, &query_embedding, top_k_candidates)
            .await?;

        let Some(reranker) = &self.reranker else {
            return Ok(RetrievalOutcome {
                memories: rank_by_similarity(candidates, top_k_final),
                ranking: RankingSource::SimilarityOnly,
            });
        };

        if candidates.is_empty() {
            return Ok(RetrievalOutcome {
                memories: Vec::new(),
                ranking: RankingSource::Reranker,
            });
        }

        let documents: Vec<String> = candidates.iter().map(|c| c.record.text.clone()).collect();
        match reranker.rerank(query_text, &documents).await {
            Ok(scores) if scores.len() == candidates.len() => {
                let memories = rank_by_rerank(candidates, &scores, top_k_final);
                debug!(user_id, candidates = documents.len(), kept = memories.len(), "memories reranked");
                Ok(RetrievalOutcome {
                    memories,
                    ranking: RankingSource::Reranker,
                })
            }
            Ok(scores) => Ok(self.degrade(
                user_id,
                candidates,
                top_k_final,
                format!("reranker returned {} scores for {} documents", scores.len(), documents.len()),
            )),
            Err(err) => Ok(self.degrade(user_id, candidates, top_k_final, err.to_string())),
        }
    }

    fn degrade(
        &self,
        user_id: &str,
        candidates: Vec<RetrievalCandidate>,
        top_k_final: usize,
        reason: String,
    ) -> RetrievalOutcome {
        let policy = self.config.on_rerank_failure;
        warn!(user_id, ?policy, reason = %reason, "reranker unavailable, degrading retrieval");
        let memories = match policy {
            RerankFailurePolicy::SimilarityOrder => rank_by_similarity(candidates, top_k_final),
            RerankFailurePolicy::NoMemories => Vec::new(),
        };
        RetrievalOutcome {
            memories,
            ranking: RankingSource::Fallback { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::error::ProviderError;
    use crate::memory::core::record::MemoryMetadata;
    use crate::memory::storage::memory_store::SqliteMemoryStore;
    use crate::testing::{ClosureReranker, FailingReranker, KeywordEmbedder, OverlapReranker, StallingReranker};

    const MEMORIES: [&str; 6] = [
        "User prefers Friday afternoon meetings.",
        "User follows EV industry news.",
        "User follows AI chip news.",
        "User calls project X 'that mess'.",
        "User dislikes early morning meetings.",
        "User works in the marketing department.",
    ];

    async fn seeded_store() -> (Arc<dyn MemoryStore>, Arc<dyn Embedder>) {
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new());
        let store = SqliteMemoryStore::open_in_memory(Arc::clone(&embedder)).await.unwrap();
        for text in MEMORIES {
            store.insert("alice", text, MemoryMetadata::new()).await.unwrap();
        }
        (Arc::new(store), embedder)
    }

    fn retriever(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        policy: RerankFailurePolicy,
    ) -> Retriever {
        Retriever::new(
            store,
            embedder,
            reranker,
            RetrievalConfig {
                top_k: 2,
                overfetch_factor: 3,
                on_rerank_failure: policy,
            },
        )
    }

    #[tokio::test]
    async fn test_reranked_length_and_order() {
        let (store, embedder) = seeded_store().await;
        let retriever = retriever(
            store,
            embedder,
            Some(Arc::new(OverlapReranker)),
            RerankFailurePolicy::SimilarityOrder,
        );
        for k in 1..=3 {
            let outcome = retriever
                .retrieve("alice", "book a meeting on friday afternoon", 6, k)
                .await
                .unwrap();
            assert_eq!(outcome.ranking, RankingSource::Reranker);
            assert!(outcome.memories.len() <= k);
            assert_eq!(
                outcome.memories.iter().map(|m| m.rank).collect::<Vec<_>>(),
                (0..outcome.memories.len()).collect::<Vec<_>>()
            );
            assert!(
                outcome
                    .memories
                    .windows(2)
                    .all(|w| w[0].rerank_score >= w[1].rerank_score)
            );
        }
        let outcome = retriever
            .retrieve("alice", "book a meeting on friday afternoon", 6, 1)
            .await
            .unwrap();
        assert_eq!(outcome.memories[0].record.text, MEMORIES[0]);
    }

    #[tokio::test]
    async fn test_reranker_can_promote_lower_similarity() {
        let (store, embedder) = seeded_store().await;
        let reranker = ClosureReranker::new(|_, doc| if doc.contains("marketing") { 10.0 } else { 0.0 });
        let retriever = retriever(
            store,
            embedder,
            Some(Arc::new(reranker)),
            RerankFailurePolicy::SimilarityOrder,
        );
        let outcome = retriever
            .retrieve("alice", "user news", 6, 1)
            .await
            .unwrap();
        assert_eq!(outcome.memories[0].record.text, MEMORIES[5]);
        assert_eq!(outcome.memories[0].rerank_score, Some(10.0));
    }

    #[tokio::test]
    async fn test_reranker_timeout_degrades_to_similarity_order() {
        let (store, embedder) = seeded_store().await;
        let retriever = retriever(
            store,
            embedder,
            Some(Arc::new(StallingReranker::default())),
            RerankFailurePolicy::SimilarityOrder,
        );
        let outcome = retriever
            .retrieve("alice", "EV industry news", 6, 2)
            .await
            .unwrap();
        assert!(outcome.is_degraded());
        assert!(matches!(&outcome.ranking, RankingSource::Fallback { reason } if reason.contains("timed out")));
        assert_eq!(outcome.memories.len(), 2);
        assert_eq!(outcome.memories[0].record.text, MEMORIES[1]);
        assert!(outcome.memories.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert!(outcome.memories.iter().all(|m| m.rerank_score.is_none()));
    }

    #[tokio::test]
    async fn test_no_memories_policy() {
        let (store, embedder) = seeded_store().await;
        let failing = FailingReranker::new(ProviderError::status("rerank", 503, "down"));
        let retriever = retriever(store, embedder, Some(Arc::new(failing)), RerankFailurePolicy::NoMemories);
        let outcome = retriever.retrieve_for_query("alice", "AI chip news").await.unwrap();
        assert!(outcome.is_degraded());
        assert!(outcome.memories.is_empty());
    }

    #[tokio::test]
    async fn test_without_reranker_uses_similarity() {
        let (store, embedder) = seeded_store().await;
        let retriever = retriever(store, embedder, None, RerankFailurePolicy::SimilarityOrder);
        let outcome = retriever.retrieve_for_query("alice", "AI chip news").await.unwrap();
        assert_eq!(outcome.ranking, RankingSource::SimilarityOnly);
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.memories[0].record.text, MEMORIES[2]);
    }

    #[tokio::test]
    async fn test_unknown_user_gets_empty_result() {
        let (store, embedder) = seeded_store().await;
        let retriever = retriever(
            store,
            embedder,
            Some(Arc::new(FailingReranker::new(ProviderError::transport("rerank", "unused")))),
            RerankFailurePolicy::SimilarityOrder,
        );
        let outcome = retriever.retrieve_for_query("mallory", "meetings").await.unwrap();
        assert!(outcome.memories.is_empty());
        assert!(!outcome.is_degraded());
    }

    #[tokio::test]
    async fn test_validation() {
        let (store, embedder) = seeded_store().await;
        let retriever = retriever(store, embedder, None, RerankFailurePolicy::SimilarityOrder);
        assert!(retriever.retrieve("alice", "q", 5, 0).await.unwrap_err().is_validation());
        assert!(retriever.retrieve("alice", "q", 3, 3).await.unwrap_err().is_validation());
        assert!(retriever.retrieve("alice", "  ", 6, 2).await.unwrap_err().is_validation());
    }
}
