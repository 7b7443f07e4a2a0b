//! Character budget for the reasoning context.

use crate::memory::core::record::RankedMemory;
use crate::memory::prompt::prompt_builder::{HistoryMessage, build_prompt_block};

/// Prompt parts before formatting.
#[derive(Clone, Debug, Default)]
pub struct PromptParts {
    /// Ranked memories, rank 0 first.
    pub memories: Vec<RankedMemory>,
    /// Earlier conversation, oldest first.
    pub turns: Vec<HistoryMessage>,
    /// Current user message.
    pub user_message: String,
}

impl PromptParts {
    /// Length of the formatted block in characters.
    #[must_use]
    pub fn rendered_chars(&self) -> usize {
        build_prompt_block(self).chars().count()
    }
}

/// Trim `parts` until the formatted block fits `max_chars`: memories go
/// first, lowest rank first, then the oldest turns. The user message is
/// never trimmed.
#[must_use]
pub fn enforce_budget(mut parts: PromptParts, max_chars: usize) -> PromptParts {
    while parts.rendered_chars() > max_chars {
        if parts.memories.pop().is_some() {
            continue;
        }
        if !parts.turns.is_empty() {
            parts.turns.remove(0);
            continue;
        }
        break;
    }
    parts
}
