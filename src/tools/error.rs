//! Tool invocation errors.

use serde::Serialize;
use thiserror::Error;

use crate::llm::error::ProviderError;

/// Why a tool call failed.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolError {
    /// No tool is registered under this name.
    #[error("unknown tool: {name}")]
    NotFound {
        /// Requested name.
        name: String,
    },
    /// Arguments do not match the tool's declared schema.
    #[error("invalid arguments for {tool}: {message}")]
    Argument {
        /// Tool name.
        tool: String,
        /// What was wrong.
        message: String,
    },
    /// The tool ran but its backend failed or timed out.
    #[error("{tool} failed: {source}")]
    Execution {
        /// Tool name.
        tool: String,
        /// Underlying provider failure.
        source: ProviderError,
    },
}

impl ToolError {
    /// Shorthand for an argument error.
    #[must_use]
    pub fn argument(tool: &str, message: impl Into<String>) -> Self {
        Self::Argument {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for an execution error.
    #[must_use]
    pub fn execution(tool: &str, source: ProviderError) -> Self {
        Self::Execution {
            tool: tool.to_string(),
            source,
        }
    }

    /// Whether the reasoner broke the tool contract (unknown tool or bad
    /// arguments) rather than the tool itself failing.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Argument { .. })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_contract_violation_classification() {
        assert!(ToolError::NotFound { name: "fly".to_string() }.is_contract_violation());
        assert!(ToolError::argument("web_search", "missing query").is_contract_violation());
        let exec = ToolError::execution("web_search", ProviderError::timeout("search", Duration::from_millis(100)));
        assert!(!exec.is_contract_violation());
        assert!(exec.to_string().contains("web_search failed"));
    }
}
