//! Reranker clients.

pub mod reranker;

pub use reranker::{HttpReranker, RerankFuture, Reranker};
