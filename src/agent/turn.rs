//! Per-turn trace types.

use serde::Serialize;
use serde_json::Value;

use crate::memory::core::ids::TurnId;
use crate::memory::core::kinds::MemoryKind;
use crate::memory::core::record::RankedMemory;
use crate::memory::prompt::prompt_builder::HistoryMessage;
use crate::memory::retrieval::retriever::RankingSource;
use crate::tools::registry::ToolInvocation;

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The reasoner answered on its own.
    Answered,
    /// The THINK ceiling was reached.
    IterationCeiling,
    /// The reasoner kept breaking the tool contract or emitting garbage.
    ContractViolations,
    /// Consecutive tool steps failed entirely.
    ToolFailures,
    /// The reasoning provider could not be reached.
    ProviderUnavailable,
}

/// How memories were obtained for the turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrievalStatus {
    /// Retrieval ran; ordering as reported.
    Ranked {
        /// Ordering used.
        ranking: RankingSource,
    },
    /// Retrieval failed; the turn ran without memories.
    Unavailable {
        /// Failure description.
        reason: String,
    },
}

/// Everything that happened during one user turn.
#[derive(Clone, Debug)]
pub struct AgentTurn {
    /// Turn identifier, also present in the turn's log lines.
    pub turn_id: TurnId,
    /// Owning user.
    pub user_id: String,
    /// The user's message.
    pub query_text: String,
    /// History the turn started from.
    pub history: Vec<HistoryMessage>,
    /// Memories placed in the prompt, after budgeting.
    pub retrieved_memories: Vec<RankedMemory>,
    /// Retrieval result.
    pub retrieval: RetrievalStatus,
    /// Tool calls in issue order.
    pub actions_taken: Vec<ToolInvocation>,
    /// Answer shown to the user.
    pub final_answer: String,
    /// THINK cycles used.
    pub think_cycles: usize,
    /// Why the loop stopped.
    pub termination: Termination,
    /// Memories extracted from the message and stored.
    pub memories_written: usize,
}

impl AgentTurn {
    /// Serializable summary for API responses and logs.
    #[must_use]
    pub fn trace(&self) -> TurnTrace {
        TurnTrace {
            turn_id: self.turn_id,
            memories: self
                .retrieved_memories
                .iter()
                .map(|memory| MemoryTrace {
                    rank: memory.rank,
                    text: memory.record.text.clone(),
                    kind: memory.record.kind().map(MemoryKind::as_str),
                    similarity: memory.similarity,
                    rerank_score: memory.rerank_score,
                })
                .collect(),
            retrieval: self.retrieval.clone(),
            actions: self
                .actions_taken
                .iter()
                .map(|action| ActionTrace {
                    tool: action.tool_name.clone(),
                    arguments: action.arguments.clone(),
                    ok: action.succeeded(),
                    observation: action.observation(),
                    latency_ms: u64::try_from(action.latency.as_millis()).unwrap_or(u64::MAX),
                })
                .collect(),
            think_cycles: self.think_cycles,
            termination: self.termination,
            memories_written: self.memories_written,
        }
    }
}

/// Serializable view of a turn.
#[derive(Clone, Debug, Serialize)]
pub struct TurnTrace {
    /// Turn identifier.
    pub turn_id: TurnId,
    /// Memories used.
    pub memories: Vec<MemoryTrace>,
    /// Retrieval result.
    pub retrieval: RetrievalStatus,
    /// Tool calls.
    pub actions: Vec<ActionTrace>,
    /// THINK cycles used.
    pub think_cycles: usize,
    /// Why the loop stopped.
    pub termination: Termination,
    /// Memories extracted and stored.
    pub memories_written: usize,
}

/// One memory in a [`TurnTrace`].
#[derive(Clone, Debug, Serialize)]
pub struct MemoryTrace {
    /// Zero-based rank.
    pub rank: usize,
    /// Memory text.
    pub text: String,
    /// Memory kind, when tagged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    /// Cosine similarity to the query.
    pub similarity: f32,
    /// Reranker relevance, absent on fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

/// One tool call in a [`TurnTrace`].
#[derive(Clone, Debug, Serialize)]
pub struct ActionTrace {
    /// Tool name.
    pub tool: String,
    /// Arguments as sent.
    pub arguments: Value,
    /// Whether the call succeeded.
    pub ok: bool,
    /// Result JSON or error text.
    pub observation: String,
    /// Wall time in milliseconds.
    pub latency_ms: u64,
}
