//! Context block construction for the reasoning prompt.

use serde::{Deserialize, Serialize};

use crate::memory::core::record::RankedMemory;
use crate::memory::prompt::prompt_budget::PromptParts;

/// Speaker of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The human.
    User,
    /// The agent.
    Assistant,
}

impl ChatRole {
    /// Label used in prompts.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One earlier message of the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Speaker.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl HistoryMessage {
    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Marker opening the memory section.
pub const MEMORY_SECTION: &str = "[USER_MEMORIES]";
/// Marker opening the conversation section.
pub const CONVERSATION_SECTION: &str = "[CONVERSATION]";
/// Marker opening the current message.
pub const USER_MESSAGE_SECTION: &str = "[USER_MESSAGE]";

/// Build a deterministic context block from prepared parts.
#[must_use]
pub fn build_prompt_block(parts: &PromptParts) -> String {
    let mut out = String::new();

    out.push_str(MEMORY_SECTION);
    out.push('\n');
    if parts.memories.is_empty() {
        out.push_str("(none)\n");
    }
    for memory in &parts.memories {
        render_memory(&mut out, memory);
    }

    out.push_str(CONVERSATION_SECTION);
    out.push('\n');
    for message in &parts.turns {
        render_turn(&mut out, message);
    }

    out.push_str(USER_MESSAGE_SECTION);
    out.push('\n');
    out.push_str(&parts.user_message);
    out.push('\n');

    out
}

fn render_memory(out: &mut String, memory: &RankedMemory) {
    out.push_str(&memory.record.prompt_line());
    out.push('\n');
}

fn render_turn(out: &mut String, message: &HistoryMessage) {
    out.push_str(message.role.label());
    out.push_str(": ");
    out.push_str(&message.content);
    out.push('\n');
}
