//! Deterministic stand-ins for the external providers, shared by unit tests.
//!
//! `KeywordEmbedder` gives texts sharing content words a high cosine
//! similarity, so retrieval behaves like a real embedder on small fixtures.
//! `GroundedReasoner` reads the memories out of the rendered prompt and picks
//! tools from them the way a compliant model would.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use serde_json::{Value, json};

use crate::llm::decision::{Decision, ToolCall};
use crate::llm::error::ProviderError;
use crate::llm::reasoner::{CompleteFuture, ReasonFuture, Reasoner, ReasoningRequest, TextModel};
use crate::llm::retry::with_timeout;
use crate::memory::embedding::embedder::{EmbedFuture, Embedder};
use crate::agent::prompts::SCRATCHPAD_SECTION;
use crate::memory::prompt::prompt_builder::{CONVERSATION_SECTION, MEMORY_SECTION, USER_MESSAGE_SECTION};
use crate::memory::rerank::reranker::{RerankFuture, Reranker};
use crate::tools::search::{SearchBackend, SearchFuture, SearchHit, SearchRequest, SearchResponse};

const KEYWORD_DIMS: usize = 1024;

const STOPWORDS: &[&str] = &[
    "user", "the", "an", "on", "in", "for", "me", "my", "to", "of", "is", "and", "at", "what", "about", "with", "it",
    "be", "as", "or", "by", "any", "some", "please", "can", "you",
];

fn vocabulary() -> &'static Mutex<HashMap<String, usize>> {
    static VOCAB: OnceLock<Mutex<HashMap<String, usize>>> = OnceLock::new();
    VOCAB.get_or_init(|| Mutex::new(HashMap::new()))
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2 && !STOPWORDS.contains(token))
        .map(|token| {
            if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
                token[..token.len() - 1].to_string()
            } else {
                token.to_string()
            }
        })
        .collect()
}

fn dimension(token: &str) -> usize {
    let mut vocab = vocabulary().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(dim) = vocab.get(token) {
        return *dim;
    }
    let next = vocab.len() + 1;
    let dim = if next < KEYWORD_DIMS {
        next
    } else {
        // Vocabulary exhausted: fall back to hashing.
        let hash = token.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
            (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
        1 + usize::try_from(hash % (KEYWORD_DIMS as u64 - 1)).unwrap_or(0)
    };
    vocab.insert(token.to_string(), dim);
    dim
}

/// Bag-of-words embedder over a process-wide vocabulary.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub const fn new() -> Self {
        Self
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; KEYWORD_DIMS];
        vector[0] = 0.05;
        for token in tokens(text) {
            vector[dimension(&token)] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        vector.iter_mut().for_each(|v| *v /= norm);
        vector
    }
}

impl Embedder for KeywordEmbedder {
    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, Result<Vec<Vec<f32>>, ProviderError>> {
        Box::pin(async move { Ok(texts.iter().map(|text| Self::vector(text)).collect()) })
    }

    fn ndims(&self) -> usize {
        KEYWORD_DIMS
    }
}

/// Scores each document by how many query words it shares.
#[derive(Clone, Copy, Debug, Default)]
pub struct OverlapReranker;

impl Reranker for OverlapReranker {
    #[allow(clippy::cast_precision_loss)]
    fn rerank<'a>(&'a self, query: &'a str, documents: &'a [String]) -> RerankFuture<'a> {
        let query_tokens = tokens(query);
        Box::pin(async move {
            Ok(documents
                .iter()
                .map(|doc| {
                    let doc_tokens = tokens(doc);
                    query_tokens.iter().filter(|t| doc_tokens.contains(t)).count() as f32
                })
                .collect())
        })
    }
}

/// Scores documents with a closure.
pub struct ClosureReranker<F> {
    score: F,
}

impl<F> ClosureReranker<F>
where
    F: Fn(&str, &str) -> f32 + Send + Sync,
{
    pub const fn new(score: F) -> Self {
        Self { score }
    }
}

impl<F> Reranker for ClosureReranker<F>
where
    F: Fn(&str, &str) -> f32 + Send + Sync,
{
    fn rerank<'a>(&'a self, query: &'a str, documents: &'a [String]) -> RerankFuture<'a> {
        let scores = documents.iter().map(|doc| (self.score)(query, doc)).collect();
        Box::pin(async move { Ok(scores) })
    }
}

/// Always fails with the given error.
pub struct FailingReranker {
    error: ProviderError,
}

impl FailingReranker {
    pub const fn new(error: ProviderError) -> Self {
        Self { error }
    }
}

impl Reranker for FailingReranker {
    fn rerank<'a>(&'a self, _query: &'a str, _documents: &'a [String]) -> RerankFuture<'a> {
        let error = self.error.clone();
        Box::pin(async move { Err(error) })
    }
}

/// Never answers; its own short deadline turns that into a timeout.
pub struct StallingReranker {
    deadline: Duration,
}

impl Default for StallingReranker {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(20),
        }
    }
}

impl Reranker for StallingReranker {
    fn rerank<'a>(&'a self, _query: &'a str, _documents: &'a [String]) -> RerankFuture<'a> {
        Box::pin(with_timeout("rerank", self.deadline, std::future::pending()))
    }
}

/// Returns `max_results` canned hits echoing the query, recording requests.
pub struct StaticSearchBackend {
    snippet: String,
    requests: Mutex<Vec<SearchRequest>>,
}

impl StaticSearchBackend {
    pub fn with_snippet(snippet: &str) -> Self {
        Self {
            snippet: snippet.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl SearchBackend for StaticSearchBackend {
    fn name(&self) -> &'static str {
        "static"
    }

    fn search<'a>(&'a self, request: &'a SearchRequest) -> SearchFuture<'a> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }
        let results = (0..request.max_results)
            .map(|i| SearchHit {
                title: format!("{} headline {}", request.query, i + 1),
                url: format!("https://news.example.com/{}/{}", request.query.replace(' ', "-"), i + 1),
                snippet: self.snippet.clone(),
            })
            .collect();
        Box::pin(async move {
            Ok(SearchResponse {
                answer: None,
                results,
            })
        })
    }
}

/// Replays queued decisions, then answers "done". Records every request.
#[derive(Default)]
pub struct ScriptedReasoner {
    script: Mutex<VecDeque<Result<Decision, ProviderError>>>,
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedReasoner {
    pub fn new(script: impl IntoIterator<Item = Result<Decision, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Reasoner for ScriptedReasoner {
    fn decide<'a>(&'a self, request: &'a ReasoningRequest) -> ReasonFuture<'a> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut guard| guard.pop_front())
            .unwrap_or_else(|| Ok(Decision::Answer("done".to_string())));
        Box::pin(async move { next })
    }
}

/// Sections of a rendered turn prompt.
#[derive(Debug, Default)]
pub struct PromptSections {
    pub memories: Vec<String>,
    pub user_message: String,
    pub scratchpad: Vec<String>,
}

pub fn parse_prompt(prompt: &str) -> PromptSections {
    let mut sections = PromptSections::default();
    let mut current = "";
    let mut message = Vec::new();
    for line in prompt.lines() {
        if [MEMORY_SECTION, CONVERSATION_SECTION, USER_MESSAGE_SECTION, SCRATCHPAD_SECTION].contains(&line) {
            current = line;
            continue;
        }
        match current {
            MEMORY_SECTION if line.starts_with("- [") => sections.memories.push(line.to_string()),
            USER_MESSAGE_SECTION => message.push(line),
            SCRATCHPAD_SECTION => sections.scratchpad.push(line.to_string()),
            _ => {}
        }
    }
    sections.user_message = message.join("\n");
    sections
}

/// Rule-following reasoner that grounds tool arguments in prompt memories.
///
/// Meeting requests book the day and slot named by a preference memory;
/// news requests search each followed topic. Once observations exist it
/// answers with them.
#[derive(Default)]
pub struct GroundedReasoner {
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl GroundedReasoner {
    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn plan(request: &ReasoningRequest) -> Decision {
        let sections = parse_prompt(&request.prompt);
        let observations: Vec<&String> =
            sections.scratchpad.iter().filter(|line| line.starts_with("Observation:")).collect();
        if !request.tools_allowed || !observations.is_empty() {
            let summary = observations
                .iter()
                .map(|line| line.trim_start_matches("Observation:").trim())
                .collect::<Vec<_>>()
                .join("\n");
            return Decision::Answer(format!("Based on your known preferences:\n{summary}"));
        }

        let message = sections.user_message.to_lowercase();
        let memories: Vec<String> = sections.memories.iter().map(|m| m.to_lowercase()).collect();

        if message.contains("meeting") || message.contains("room") {
            let Some(preference) = memories.iter().find(|m| m.starts_with("- [preference]")) else {
                return Decision::Answer("Which day and time work for you?".to_string());
            };
            let day = ["monday", "tuesday", "wednesday", "thursday", "friday"]
                .into_iter()
                .find(|day| preference.contains(day))
                .unwrap_or("tomorrow");
            let slot = ["morning", "afternoon", "evening"]
                .into_iter()
                .find(|slot| preference.contains(slot))
                .unwrap_or("afternoon");
            return Decision::ToolCalls(vec![ToolCall::new(
                "book_meeting_room",
                json!({"day": day, "time_slot": slot}),
            )]);
        }

        if message.contains("news") {
            let calls: Vec<ToolCall> = memories
                .iter()
                .filter(|m| m.starts_with("- [interest]"))
                .filter_map(|m| {
                    let topic = m.split("follows ").nth(1)?.split(" news").next()?.trim();
                    Some(ToolCall::new("web_search", json!({"query": format!("{topic} news"), "topic": "news"})))
                })
                .collect();
            if calls.is_empty() {
                return Decision::ToolCalls(vec![ToolCall::new(
                    "web_search",
                    json!({"query": sections.user_message, "topic": "news"}),
                )]);
            }
            return Decision::ToolCalls(calls);
        }

        Decision::Answer("Hello! How can I help?".to_string())
    }
}

impl Reasoner for GroundedReasoner {
    fn decide<'a>(&'a self, request: &'a ReasoningRequest) -> ReasonFuture<'a> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }
        let decision = Self::plan(request);
        Box::pin(async move { Ok(decision) })
    }
}

/// Requests a tool that does not exist on every tool-enabled call.
#[derive(Default)]
pub struct UnknownToolReasoner;

impl Reasoner for UnknownToolReasoner {
    fn decide<'a>(&'a self, request: &'a ReasoningRequest) -> ReasonFuture<'a> {
        let decision = if request.tools_allowed {
            Decision::ToolCalls(vec![ToolCall::new("teleport", Value::Object(serde_json::Map::new()))])
        } else {
            Decision::Answer("I could not complete that request.".to_string())
        };
        Box::pin(async move { Ok(decision) })
    }
}

/// Text model answering every prompt with the same reply; counts calls.
pub struct CannedTextModel {
    reply: Result<String, ProviderError>,
    prompts: Mutex<Vec<String>>,
}

impl CannedTextModel {
    pub fn new(reply: Result<String, ProviderError>) -> Self {
        Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(Ok(text.to_string()))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl TextModel for CannedTextModel {
    fn complete<'a>(&'a self, _system_prompt: &'a str, prompt: &'a str) -> CompleteFuture<'a> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self.reply.clone();
        Box::pin(async move { reply })
    }
}
