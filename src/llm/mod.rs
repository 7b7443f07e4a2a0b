//! Provider plumbing shared by every external call: errors, retry with
//! backoff, and the reasoning model client.

pub mod decision;
pub mod error;
pub mod http;
pub mod reasoner;
pub mod retry;

pub use decision::{Decision, ThoughtTagFilter, ToolCall, parse_decision, strip_thought_tags};
pub use error::ProviderError;
pub use reasoner::{CompleteFuture, OllamaReasoner, ReasonFuture, Reasoner, ReasoningRequest, TextModel};
pub use retry::{RetryPolicy, Retryable, retry_with_backoff, with_timeout};
