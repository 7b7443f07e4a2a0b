//! Memory kinds.
//!
//! The kind is the semantic category of a memory. It is carried in the
//! record metadata under [`KIND_METADATA_KEY`] and shown to the reasoning
//! model as a `[kind]` tag in front of the memory text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Metadata key holding the memory kind.
pub const KIND_METADATA_KEY: &str = "kind";

/// Semantic category of a memory.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Habits and preferences ("prefers Friday afternoon meetings").
    Preference,
    /// Topics the user follows ("follows EV industry news").
    Interest,
    /// User-specific vocabulary ("calls project X 'that mess'").
    Terminology,
    /// Plain facts about the user ("works in marketing").
    Fact,
}

/// Error returned when parsing an unknown kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryKindParseError {
    value: String,
}

impl MemoryKindParseError {
    /// The rejected input.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for MemoryKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown memory kind: {}", self.value)
    }
}

impl std::error::Error for MemoryKindParseError {}

impl MemoryKind {
    /// All kinds, in prompt display order.
    pub const ALL: [Self; 4] = [Self::Preference, Self::Interest, Self::Terminology, Self::Fact];

    /// Stable `snake_case` identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preference => "preference",
            Self::Interest => "interest",
            Self::Terminology => "terminology",
            Self::Fact => "fact",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = MemoryKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle)
            .ok_or(MemoryKindParseError { value: needle })
    }
}
