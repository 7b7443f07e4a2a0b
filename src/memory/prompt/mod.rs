//! Reasoning context construction under a character budget.

pub mod prompt_budget;
pub mod prompt_builder;

pub use prompt_budget::{PromptParts, enforce_budget};
pub use prompt_builder::{
    CONVERSATION_SECTION, ChatRole, HistoryMessage, MEMORY_SECTION, USER_MESSAGE_SECTION,
    build_prompt_block,
};
