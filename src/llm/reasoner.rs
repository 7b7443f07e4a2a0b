//! Reasoning provider abstraction and the Ollama-backed implementation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;
use tracing::debug;

use crate::config::LlmConfig;
use crate::llm::decision::{Decision, parse_decision};
use crate::llm::error::ProviderError;
use crate::llm::retry::{RetryPolicy, retry_with_backoff, with_timeout};
use crate::memory::core::errors::{MemoryError, MemoryResult};

const SERVICE: &str = "reasoning";

/// Boxed future type for reasoner calls.
pub type ReasonFuture<'a> = Pin<Box<dyn Future<Output = Result<Decision, ProviderError>> + Send + 'a>>;

/// Boxed future type for free-text completions.
pub type CompleteFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;

/// One reasoning request: a system preamble and the rendered turn.
#[derive(Clone, Debug)]
pub struct ReasoningRequest {
    /// System prompt (capabilities, tool catalogue, protocol).
    pub system_prompt: String,
    /// Rendered conversation and scratchpad.
    pub prompt: String,
    /// Whether tool calls are acceptable in the reply.
    pub tools_allowed: bool,
}

/// Black-box reasoning provider.
pub trait Reasoner: Send + Sync {
    /// Decide the next step for the turn.
    ///
    /// # Errors
    /// Returns a provider error when the model cannot be reached. Output that
    /// cannot be understood is reported as [`Decision::Malformed`] instead.
    fn decide<'a>(&'a self, request: &'a ReasoningRequest) -> ReasonFuture<'a>;
}

/// Free-text completion, for callers that parse the output themselves.
pub trait TextModel: Send + Sync {
    /// Complete `prompt` under `system_prompt` deterministically.
    ///
    /// # Errors
    /// Returns a provider error when the model cannot be reached.
    fn complete<'a>(&'a self, system_prompt: &'a str, prompt: &'a str) -> CompleteFuture<'a>;
}

/// Reasoner backed by an Ollama completion model through Rig.
pub struct OllamaReasoner {
    model: ollama::CompletionModel,
    temperature: f64,
    max_tokens: Option<u64>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OllamaReasoner {
    /// Build the reasoner from config.
    ///
    /// # Errors
    /// Returns an error if the Ollama client cannot be built.
    pub fn new(llm: &LlmConfig, retry: RetryPolicy) -> MemoryResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(rig::client::Nothing);
        let builder = if let Some(base_url) = &llm.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(MemoryError::from)?;
        let model = client.completion_model(llm.model.clone());
        Ok(Self {
            model,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            timeout: llm.timeout(),
            retry,
        })
    }

    async fn complete_once(&self, system_prompt: &str, prompt: &str, temperature: f64) -> Result<String, ProviderError> {
        let completion = self
            .model
            .completion_request(prompt.to_string())
            .preamble(system_prompt.to_string())
            .temperature(temperature)
            .max_tokens_opt(self.max_tokens)
            .build();

        let response = self
            .model
            .completion(completion)
            .await
            .map_err(|err| ProviderError::transport(SERVICE, err.to_string()))?;
        Ok(extract_text(&response.choice))
    }
}

impl Reasoner for OllamaReasoner {
    fn decide<'a>(&'a self, request: &'a ReasoningRequest) -> ReasonFuture<'a> {
        Box::pin(async move {
            let text = retry_with_backoff(&self.retry, SERVICE, || {
                with_timeout(
                    SERVICE,
                    self.timeout,
                    self.complete_once(&request.system_prompt, &request.prompt, self.temperature),
                )
            })
            .await?;
            debug!(chars = text.len(), "reasoning output received");
            Ok(parse_decision(&text))
        })
    }
}

impl TextModel for OllamaReasoner {
    fn complete<'a>(&'a self, system_prompt: &'a str, prompt: &'a str) -> CompleteFuture<'a> {
        Box::pin(async move {
            retry_with_backoff(&self.retry, SERVICE, || {
                with_timeout(SERVICE, self.timeout, self.complete_once(system_prompt, prompt, 0.0))
            })
            .await
        })
    }
}

fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}
