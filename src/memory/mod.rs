//! Long-term memory for the digital employee.
//!
//! - `core`: errors, ids, kinds and records
//! - `embedding`: embedding clients and the query-embedding cache
//! - `storage`: the `SQLite` + `sqlite-vec` memory store
//! - `rerank`: cross-encoder reranker client
//! - `retrieval`: two-stage retrieval and ranking
//! - `ingest`: preset seeding, heuristic extraction, normalization
//! - `prompt`: context block construction and budget enforcement

pub mod core;
pub mod embedding;
pub mod ingest;
pub mod prompt;
pub mod rerank;
pub mod retrieval;
pub mod storage;

pub use core::{
    MemoryError, MemoryId, MemoryKind, MemoryMetadata, MemoryRecord, MemoryResult, RankedMemory,
    RetrievalCandidate,
};
pub use embedding::{Embedder, build_embedder};
pub use ingest::{HeuristicExtractor, PresetMemory, load_default_presets, load_preset_memories};
pub use prompt::{HistoryMessage, PromptParts, build_prompt_block, enforce_budget};
pub use rerank::{HttpReranker, Reranker};
pub use retrieval::{RankingSource, RetrievalOutcome, Retriever};
pub use storage::{MemoryStore, SqliteMemoryStore};
