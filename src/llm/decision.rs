//! Closed decision type returned by the reasoning provider, and the parser
//! that turns raw model text into it.
//!
//! The model is asked to reply with a single JSON action object:
//!
//! ```json
//! {"action": "answer", "answer": "..."}
//! {"action": "tool", "tool_calls": [{"name": "web_search", "arguments": {"query": "..."}}]}
//! ```
//!
//! `<think>`/`<analysis>` blocks are hidden, `<final>` content is preferred,
//! and plain prose without any JSON is accepted as an answer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call requested by the reasoning provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Registered tool name.
    pub name: String,
    /// Raw JSON arguments, validated later by the registry.
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

impl ToolCall {
    /// Build a tool call.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// What the reasoning provider decided to do next.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// Reply to the user with this text.
    Answer(String),
    /// Invoke one or more tools before continuing.
    ToolCalls(Vec<ToolCall>),
    /// The output could not be understood.
    Malformed(String),
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RawAction {
    #[serde(alias = "final", alias = "respond")]
    Answer { answer: String },
    #[serde(alias = "tool_call", alias = "tools", alias = "call_tools")]
    Tool {
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
        name: Option<String>,
        arguments: Option<Value>,
    },
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Parse raw model output into a [`Decision`].
#[must_use]
pub fn parse_decision(raw: &str) -> Decision {
    let visible = strip_thought_tags(raw);
    let body = extract_final(&visible).unwrap_or(&visible);
    let body = strip_code_fence(body.trim());

    if body.is_empty() {
        return Decision::Malformed("empty response".to_string());
    }

    let json = match outer_object(body) {
        Some(json) if looks_like_json_action(body) => json,
        None if body.starts_with('{') => return Decision::Malformed("unterminated JSON object".to_string()),
        _ => return Decision::Answer(body.to_string()),
    };

    match serde_json::from_str::<RawAction>(json) {
        Ok(RawAction::Answer { answer }) => {
            let answer = answer.trim();
            if answer.is_empty() {
                Decision::Malformed("answer action with empty text".to_string())
            } else {
                Decision::Answer(answer.to_string())
            }
        }
        Ok(RawAction::Tool {
            mut tool_calls,
            name,
            arguments,
        }) => {
            if let Some(name) = name {
                tool_calls.push(ToolCall::new(name, arguments.unwrap_or_else(empty_object)));
            }
            if tool_calls.is_empty() {
                Decision::Malformed("tool action without any tool call".to_string())
            } else {
                Decision::ToolCalls(tool_calls)
            }
        }
        Err(err) => Decision::Malformed(format!("invalid action JSON: {err}")),
    }
}

fn looks_like_json_action(body: &str) -> bool {
    body.starts_with('{') || body.contains("\"action\"")
}

fn outer_object(body: &str) -> Option<&str> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

fn strip_code_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    let rest = rest.find('\n').map_or(rest, |idx| &rest[idx + 1..]);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Content of the first `<final>` block, if any. An unclosed block runs to
/// the end of the text.
#[must_use]
pub fn extract_final(text: &str) -> Option<&str> {
    let start = text.find(FINAL_OPEN)? + FINAL_OPEN.len();
    let rest = &text[start..];
    let end = rest.find(FINAL_CLOSE).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Remove hidden reasoning blocks from a complete text.
#[must_use]
pub fn strip_thought_tags(text: &str) -> String {
    let mut filter = ThoughtTagFilter::default();
    let mut out = filter.feed(text);
    out.push_str(&filter.finish());
    out
}

const FINAL_OPEN: &str = "<final>";
const FINAL_CLOSE: &str = "</final>";

const HIDDEN_BLOCKS: [(&str, &str); 2] = [("<think>", "</think>"), ("<analysis>", "</analysis>")];

/// Incremental filter hiding `<think>` and `<analysis>` blocks, including
/// blocks split across chunks and stray closing tags.
#[derive(Debug, Default)]
pub struct ThoughtTagFilter {
    closing: Option<&'static str>,
    pending: String,
}

impl ThoughtTagFilter {
    /// Feed a chunk and return the visible part of it.
    pub fn feed(&mut self, chunk: &str) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.push_str(chunk);
        let mut out = String::new();
        let mut rest = buf.as_str();

        loop {
            if let Some(close) = self.closing {
                if let Some(idx) = rest.find(close) {
                    rest = &rest[idx + close.len()..];
                    self.closing = None;
                    continue;
                }
                self.pending = partial_suffix(rest, &[close]).to_string();
                return out;
            }

            match next_tag(rest) {
                Some((idx, tag, closing)) => {
                    out.push_str(&rest[..idx]);
                    rest = &rest[idx + tag.len()..];
                    self.closing = closing;
                }
                None => {
                    let partial = partial_suffix(rest, &all_tags());
                    out.push_str(&rest[..rest.len() - partial.len()]);
                    self.pending = partial.to_string();
                    return out;
                }
            }
        }
    }

    /// Flush text held back while waiting for a possible tag.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        if self.closing.is_some() {
            String::new()
        } else {
            pending
        }
    }
}

fn all_tags() -> [&'static str; 4] {
    [
        HIDDEN_BLOCKS[0].0,
        HIDDEN_BLOCKS[0].1,
        HIDDEN_BLOCKS[1].0,
        HIDDEN_BLOCKS[1].1,
    ]
}

/// Earliest hidden-block tag in `text`: position, tag, and the closing tag to
/// wait for (`None` for a stray closing tag).
fn next_tag(text: &str) -> Option<(usize, &'static str, Option<&'static str>)> {
    HIDDEN_BLOCKS
        .iter()
        .flat_map(|(open, close)| {
            [
                text.find(open).map(|idx| (idx, *open, Some(*close))),
                text.find(close).map(|idx| (idx, *close, None)),
            ]
        })
        .flatten()
        .min_by_key(|(idx, _, _)| *idx)
}

fn partial_suffix<'a>(text: &'a str, tags: &[&str]) -> &'a str {
    text.rfind('<').map_or("", |idx| {
        let tail = &text[idx..];
        if tags.iter().any(|tag| tag.len() > tail.len() && tag.starts_with(tail)) {
            tail
        } else {
            ""
        }
    })
}
