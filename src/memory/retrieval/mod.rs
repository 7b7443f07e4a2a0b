//! Retrieval and ranking of long-term memories.

pub mod ranking;
pub mod retriever;

pub use ranking::{rank_by_rerank, rank_by_similarity};
pub use retriever::{RankingSource, RetrievalOutcome, Retriever};
