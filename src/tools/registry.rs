//! Name-indexed tool registry with schema validation and per-call deadlines.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::decision::ToolCall;
use crate::llm::error::ProviderError;
use crate::tools::error::ToolError;
use crate::tools::schema::{Arguments, ToolSpec};

/// Boxed future type for tool calls.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;

/// A named capability the agent can invoke.
pub trait Tool: Send + Sync {
    /// Declared signature.
    fn spec(&self) -> &ToolSpec;

    /// Run the tool for `user_id` with validated arguments.
    ///
    /// # Errors
    /// Returns [`ToolError::Argument`] for values that pass the schema but
    /// are still unusable, or [`ToolError::Execution`] when the backend
    /// fails.
    fn call<'a>(&'a self, user_id: &'a str, args: Arguments) -> ToolFuture<'a>;
}

/// Record of one tool call made during a turn.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    /// Requested tool name.
    pub tool_name: String,
    /// Arguments as sent by the reasoner.
    pub arguments: Value,
    /// Tool output or failure.
    pub result: Result<Value, ToolError>,
    /// Wall time of the call.
    pub latency: Duration,
}

impl ToolInvocation {
    /// Whether the call succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    /// Observation text folded back into the reasoning context.
    #[must_use]
    pub fn observation(&self) -> String {
        match &self.result {
            Ok(value) => value.to_string(),
            Err(err) => format!("ERROR: {err}"),
        }
    }
}

/// Fixed set of tools, looked up by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    /// Empty registry with a per-call deadline.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout,
        }
    }

    /// Register a tool, returning the one it replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        self.tools.insert(tool.spec().name.to_string(), tool)
    }

    /// Builder-style [`ToolRegistry::register`].
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Whether a tool is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Declared signatures, ordered by name.
    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values().map(|tool| tool.spec())
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate and run one tool call.
    ///
    /// # Errors
    /// [`ToolError::NotFound`] for an unregistered name,
    /// [`ToolError::Argument`] for a schema violation, and
    /// [`ToolError::Execution`] for backend failure or deadline expiry.
    pub async fn invoke(&self, user_id: &str, tool_name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let tool = self.tools.get(tool_name).ok_or_else(|| ToolError::NotFound {
            name: tool_name.to_string(),
        })?;
        let args = tool.spec().validate(arguments)?;
        match tokio::time::timeout(self.timeout, tool.call(user_id, args)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::execution(
                tool_name,
                ProviderError::timeout(tool_name, self.timeout),
            )),
        }
    }

    /// Run a reasoner-issued call and record it.
    pub async fn invoke_recorded(&self, user_id: &str, call: &ToolCall) -> ToolInvocation {
        let started = Instant::now();
        let result = self.invoke(user_id, &call.name, &call.arguments).await;
        let latency = started.elapsed();
        match &result {
            Ok(_) => debug!(tool = %call.name, latency_ms = latency.as_millis(), "tool call succeeded"),
            Err(err) => warn!(tool = %call.name, error = %err, "tool call failed"),
        }
        ToolInvocation {
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            result,
            latency,
        }
    }
}
