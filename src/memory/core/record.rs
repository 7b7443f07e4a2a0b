//! Memory records and the retrieval results built from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::core::ids::MemoryId;
use crate::memory::core::kinds::{KIND_METADATA_KEY, MemoryKind};

/// Scalar metadata value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl MetadataValue {
    /// Borrow the text, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Record metadata: string keys to scalar values, ordered for stable JSON.
pub type MemoryMetadata = BTreeMap<String, MetadataValue>;

/// Metadata tagging a memory with its kind and origin.
#[must_use]
pub fn kind_metadata(kind: MemoryKind, source: &str) -> MemoryMetadata {
    let mut metadata = MemoryMetadata::new();
    metadata.insert(KIND_METADATA_KEY.to_string(), kind.as_str().into());
    metadata.insert("source".to_string(), source.into());
    metadata
}

/// One stored memory. Immutable once written; owned by exactly one user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Record identifier.
    pub id: MemoryId,
    /// Owning user.
    pub user_id: String,
    /// Memory text.
    pub text: String,
    /// Embedding of `text`, deployment dimensionality.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Free-form scalar metadata.
    pub metadata: MemoryMetadata,
}

impl MemoryRecord {
    /// Kind stored in metadata, if recognized.
    #[must_use]
    pub fn kind(&self) -> Option<MemoryKind> {
        self.metadata
            .get(KIND_METADATA_KEY)
            .and_then(MetadataValue::as_str)
            .and_then(|raw| raw.parse().ok())
    }

    /// Prompt line in the `- [kind] text` form.
    #[must_use]
    pub fn prompt_line(&self) -> String {
        let tag = self.kind().map_or("memory", MemoryKind::as_str);
        format!("- [{tag}] {}", self.text)
    }
}

/// A store hit before reranking.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalCandidate {
    /// The stored record.
    pub record: MemoryRecord,
    /// Cosine similarity to the query, in [-1, 1].
    pub similarity: f32,
}

/// A memory selected for the current turn, with its final position.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedMemory {
    /// The stored record.
    pub record: MemoryRecord,
    /// Reranker relevance, absent when ranking fell back to similarity.
    pub rerank_score: Option<f32>,
    /// Cosine similarity to the query.
    pub similarity: f32,
    /// Zero-based position; strict total order.
    pub rank: usize,
}
