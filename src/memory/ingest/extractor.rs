//! Heuristic extraction of new memories from user messages.
//!
//! Only the user's own statements are considered. A sentence becomes a
//! memory when it matches one of the pattern rules below; questions and
//! sentences that look like credentials are never stored.

use regex::Regex;
use tracing::debug;

use crate::config::AgentConfig;
use crate::memory::core::errors::MemoryResult;
use crate::memory::core::kinds::MemoryKind;
use crate::memory::core::record::kind_metadata;
use crate::memory::ingest::normalize::same_memory;
use crate::memory::storage::memory_store::MemoryStore;

/// A pattern rule mapping a regex to a memory kind.
struct PatternRule {
    pattern: Regex,
    kind: MemoryKind,
    priority: u8, // Higher = checked first
}

/// A memory candidate found in a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedMemory {
    /// Inferred category.
    pub kind: MemoryKind,
    /// Text to store.
    pub text: String,
}

/// Pattern-based memory extractor.
pub struct HeuristicExtractor {
    min_chars: usize,
    max_chars: usize,
    remember: Regex,
    secret: Regex,
    rules: Vec<PatternRule>,
}

impl HeuristicExtractor {
    /// Build the extractor with the length bounds from `config`.
    ///
    /// # Errors
    /// Returns an error if any regex pattern is invalid.
    pub fn new(config: &AgentConfig) -> Result<Self, regex::Error> {
        let mut rules = vec![
            // Terminology
            PatternRule {
                pattern: Regex::new(r"(?i)\b(when i say|by .+ i mean|i (call|refer to) .+ (as|by))\b")?,
                kind: MemoryKind::Terminology,
                priority: 100,
            },
            PatternRule {
                pattern: Regex::new(r"(我说的.+(是指|指的是)|我(把|管).+叫)")?,
                kind: MemoryKind::Terminology,
                priority: 100,
            },
            // Interests
            PatternRule {
                pattern: Regex::new(
                    r"(?i)\b(i('m| am) (interested in|following|into)|i (follow|track|keep up with))\b",
                )?,
                kind: MemoryKind::Interest,
                priority: 90,
            },
            PatternRule {
                pattern: Regex::new(r"(关注|感兴趣|在追)")?,
                kind: MemoryKind::Interest,
                priority: 90,
            },
            // Preferences and aversions
            PatternRule {
                pattern: Regex::new(
                    r"(?i)\b(i|we)\s+(really\s+)?(like|love|prefer|enjoy|hate|dislike|don't like|usually|always|never)\b",
                )?,
                kind: MemoryKind::Preference,
                priority: 85,
            },
            PatternRule {
                pattern: Regex::new(r"(?i)\b(my favou?rite|i'm a fan of)\b")?,
                kind: MemoryKind::Preference,
                priority: 85,
            },
            PatternRule {
                pattern: Regex::new(r"(我(比较|更|很)?(喜欢|偏好|习惯|讨厌)|我不喜欢)")?,
                kind: MemoryKind::Preference,
                priority: 85,
            },
            // Facts
            PatternRule {
                pattern: Regex::new(r"(?i)\b(i work (at|for|in|as)|my (manager|team|role|job|office) is)\b")?,
                kind: MemoryKind::Fact,
                priority: 60,
            },
            PatternRule {
                pattern: Regex::new(r"(我在.+(工作|上班)|我是.+的)")?,
                kind: MemoryKind::Fact,
                priority: 60,
            },
        ];
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        Ok(Self {
            min_chars: config.min_memory_chars,
            max_chars: config.max_memory_chars,
            remember: Regex::new(r"(?i)^\s*(please\s+)?(remember|note)( that)?[:,]?\s+|^\s*(请)?记住[:：,，]?\s*")?,
            secret: Regex::new(r"(?i)(password|passwd|api[ _-]?key|secret|token|credit card|密码|口令|密钥)")?,
            rules,
        })
    }

    /// Memory candidates in `message`, in order, without duplicates.
    #[must_use]
    pub fn extract(&self, message: &str) -> Vec<ExtractedMemory> {
        let mut found: Vec<ExtractedMemory> = Vec::new();
        for sentence in split_sentences(message) {
            let Some(candidate) = self.classify(sentence) else {
                continue;
            };
            if found.iter().any(|m| same_memory(&m.text, &candidate.text)) {
                continue;
            }
            found.push(candidate);
        }
        found
    }

    /// Whether `text` looks like it carries a credential.
    pub(crate) fn is_sensitive(&self, text: &str) -> bool {
        self.secret.is_match(text)
    }

    fn classify(&self, sentence: &str) -> Option<ExtractedMemory> {
        let sentence = sentence.trim();
        if sentence.ends_with('?') || sentence.ends_with('？') {
            return None;
        }
        if self.is_sensitive(sentence) {
            debug!("skipping sentence that looks like a credential");
            return None;
        }

        let (body, explicit) = match self.remember.find(sentence) {
            Some(prefix) => (sentence[prefix.end()..].trim(), true),
            None => (sentence, false),
        };
        if body.chars().count() < self.min_chars {
            return None;
        }

        let kind = match self.rules.iter().find(|rule| rule.pattern.is_match(body)) {
            Some(rule) => rule.kind,
            None if explicit => MemoryKind::Fact,
            None => return None,
        };

        Some(ExtractedMemory {
            kind,
            text: truncate_chars(&format!("User said: {body}"), self.max_chars),
        })
    }
}

/// Store extracted memories for `user_id`, skipping ones already known.
/// Returns how many were stored.
///
/// # Errors
/// Returns the first embedding or storage error.
pub async fn store_extracted(
    store: &dyn MemoryStore,
    user_id: &str,
    memories: &[ExtractedMemory],
) -> MemoryResult<usize> {
    let mut stored = 0;
    for memory in memories {
        let metadata = kind_metadata(memory.kind, "conversation");
        if store.insert_if_absent(user_id, &memory.text, metadata).await?.is_some() {
            stored += 1;
        }
    }
    Ok(stored)
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if matches!(ch, '.' | '!' | '\n' | '。' | '！' | '；' | ';') {
            if start < idx {
                parts.push(&text[start..idx]);
            }
            start = idx + ch.len_utf8();
        } else if matches!(ch, '?' | '？') {
            // Keep the mark so the sentence is recognized as a question.
            let end = idx + ch.len_utf8();
            parts.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        parts.push(&text[start..]);
    }
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::embedding::embedder::Embedder;
    use crate::memory::storage::memory_store::SqliteMemoryStore;
    use crate::testing::KeywordEmbedder;

    fn extractor() -> HeuristicExtractor {
        HeuristicExtractor::new(&AgentConfig::default()).unwrap()
    }

    #[test]
    fn test_preference_and_interest() {
        let found = extractor().extract("I prefer short meetings. Also, I follow robotics news!");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, MemoryKind::Preference);
        assert_eq!(found[0].text, "User said: I prefer short meetings");
        assert_eq!(found[1].kind, MemoryKind::Interest);
    }

    #[test]
    fn test_explicit_remember_defaults_to_fact() {
        let found = extractor().extract("Remember that the budget review is owned by Lina.");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, MemoryKind::Fact);
        assert_eq!(found[0].text, "User said: the budget review is owned by Lina");
    }

    #[test]
    fn test_terminology() {
        let found = extractor().extract("When I say the dashboard I mean the Q3 sales report");
        assert_eq!(found[0].kind, MemoryKind::Terminology);
    }

    #[test]
    fn test_chinese_statements() {
        let found = extractor().extract("我喜欢周五下午开会。我关注新能源汽车的新闻。");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, MemoryKind::Preference);
        assert_eq!(found[1].kind, MemoryKind::Interest);
    }

    #[test]
    fn test_questions_and_secrets_are_skipped() {
        let ex = extractor();
        assert!(ex.extract("Do I prefer mornings?").is_empty());
        assert!(ex.extract("Remember my password is hunter2").is_empty());
        assert!(ex.extract("Book a room for Friday").is_empty());
    }

    #[test]
    fn test_duplicates_within_message_collapse() {
        let found = extractor().extract("I like tea. i like   TEA.");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_long_sentences_are_truncated() {
        let config = AgentConfig {
            max_memory_chars: 30,
            ..AgentConfig::default()
        };
        let ex = HeuristicExtractor::new(&config).unwrap();
        let found = ex.extract("I really enjoy long walks along the river on quiet Sunday mornings");
        assert!(found[0].text.chars().count() <= 30);
    }

    #[tokio::test]
    async fn test_store_extracted_skips_known_memories() {
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new());
        let store = SqliteMemoryStore::open_in_memory(embedder).await.unwrap();
        let found = extractor().extract("I prefer short meetings.");
        assert_eq!(store_extracted(&store, "u", &found).await.unwrap(), 1);
        assert_eq!(store_extracted(&store, "u", &found).await.unwrap(), 0);
        assert_eq!(store.count("u").await.unwrap(), 1);
    }
}
