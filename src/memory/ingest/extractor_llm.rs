//! Memory extraction by the reasoning model.
//!
//! The model is asked for a JSON array of `{type, content}` objects. When it
//! cannot be reached, or its output holds no readable array, the pattern
//! rules of [`HeuristicExtractor`] run instead. An empty array is a valid
//! answer and stores nothing.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{AgentConfig, MemoryExtractorKind};
use crate::llm::decision::strip_thought_tags;
use crate::llm::reasoner::TextModel;
use crate::memory::core::kinds::MemoryKind;
use crate::memory::ingest::extractor::{ExtractedMemory, HeuristicExtractor, truncate_chars};
use crate::memory::ingest::normalize::same_memory;

const SYSTEM_PROMPT: &str = "You pick out information about the user that is worth remembering long term.
Only keep what the user states or clearly implies. Each memory is one self-contained statement in the
third person (\"User prefers ...\", not \"I like ...\").

Types:
- preference: habits and preferences (meeting times, communication style, ways of working)
- interest: topics, industries or technologies the user follows
- terminology: project code names, internal nicknames, abbreviations and what they mean
- fact: objective facts (role, team, responsibilities)

Reply with a JSON array only, for example:
[{\"type\": \"preference\", \"content\": \"User prefers morning meetings\"}]
Reply [] when nothing is worth remembering.";

static FENCED_ARRAY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\[.*?\])\s*```").ok());

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(rename = "type", alias = "kind")]
    kind: String,
    content: String,
}

/// Model-backed extractor with the pattern rules as fallback.
pub struct LlmExtractor {
    model: Arc<dyn TextModel>,
    fallback: HeuristicExtractor,
    max_items: usize,
    min_chars: usize,
    max_chars: usize,
}

impl LlmExtractor {
    /// Build the extractor; limits come from `config`.
    #[must_use]
    pub fn new(model: Arc<dyn TextModel>, fallback: HeuristicExtractor, config: &AgentConfig) -> Self {
        Self {
            model,
            fallback,
            max_items: config.llm_extract_max_items,
            min_chars: config.min_memory_chars,
            max_chars: config.max_memory_chars,
        }
    }

    /// Memory candidates in `message`.
    pub async fn extract(&self, message: &str) -> Vec<ExtractedMemory> {
        let prompt = format!("User message:\n{message}");
        let raw = match self.model.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "memory extraction model failed; using pattern rules");
                return self.fallback.extract(message);
            }
        };
        let Some(items) = parse_extraction(&raw) else {
            warn!(chars = raw.len(), "memory extraction output has no JSON array; using pattern rules");
            return self.fallback.extract(message);
        };
        let found = self.accept(items);
        debug!(count = found.len(), "model extracted memories");
        found
    }

    fn accept(&self, items: Vec<Value>) -> Vec<ExtractedMemory> {
        let mut found: Vec<ExtractedMemory> = Vec::new();
        for item in items {
            if found.len() >= self.max_items {
                break;
            }
            let Ok(candidate) = serde_json::from_value::<Candidate>(item) else {
                continue;
            };
            let Ok(kind) = candidate.kind.parse::<MemoryKind>() else {
                debug!(kind = %candidate.kind, "dropping memory of unknown type");
                continue;
            };
            let content = candidate.content.trim();
            if content.chars().count() < self.min_chars || self.fallback.is_sensitive(content) {
                continue;
            }
            let text = truncate_chars(content, self.max_chars);
            if found.iter().any(|m| same_memory(&m.text, &text)) {
                continue;
            }
            found.push(ExtractedMemory { kind, text });
        }
        found
    }
}

/// The JSON array in model output: the whole text, a fenced block, or the
/// span from the first `[` to the last `]`.
fn parse_extraction(raw: &str) -> Option<Vec<Value>> {
    let visible = strip_thought_tags(raw);
    let text = visible.trim();

    if let Ok(items) = serde_json::from_str::<Vec<Value>>(text) {
        return Some(items);
    }

    let fenced = FENCED_ARRAY
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| serde_json::from_str::<Vec<Value>>(m.as_str()).ok());
    if fenced.is_some() {
        return fenced;
    }

    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Extraction strategy chosen by [`AgentConfig::memory_extractor`].
pub enum MemoryExtractor {
    /// Pattern rules.
    Heuristic(HeuristicExtractor),
    /// Reasoning model with pattern fallback.
    Llm(LlmExtractor),
}

impl MemoryExtractor {
    /// Build the configured extractor. `model` is only used for
    /// [`MemoryExtractorKind::Llm`]; without it the pattern rules are used.
    ///
    /// # Errors
    /// Returns an error if a pattern rule does not compile.
    pub fn from_config(config: &AgentConfig, model: Option<Arc<dyn TextModel>>) -> Result<Self, regex::Error> {
        let heuristic = HeuristicExtractor::new(config)?;
        Ok(match (config.memory_extractor, model) {
            (MemoryExtractorKind::Llm, Some(model)) => Self::Llm(LlmExtractor::new(model, heuristic, config)),
            (MemoryExtractorKind::Llm, None) => {
                warn!("model extraction requested without a model; using pattern rules");
                Self::Heuristic(heuristic)
            }
            (MemoryExtractorKind::Heuristic, _) => Self::Heuristic(heuristic),
        })
    }

    /// Memory candidates in `message`.
    pub async fn extract(&self, message: &str) -> Vec<ExtractedMemory> {
        match self {
            Self::Heuristic(extractor) => extractor.extract(message),
            Self::Llm(extractor) => extractor.extract(message).await,
        }
    }
}
