//! The THINK / ACT / OBSERVE / ANSWER loop for one turn.
//!
//! Every path ends in an answer: the loop is bounded by `max_iterations`,
//! the contract-violation budget and the tool-failure budget, and provider
//! errors fall through to a fixed apology.

use futures::future::join_all;
use tracing::{debug, warn};

use crate::agent::prompts::{answer_only_prompt, render_turn_prompt, system_prompt};
use crate::agent::turn::Termination;
use crate::config::AgentConfig;
use crate::llm::decision::{Decision, ToolCall};
use crate::llm::reasoner::{Reasoner, ReasoningRequest};
use crate::tools::registry::{ToolInvocation, ToolRegistry};

/// Result of running the loop.
#[derive(Clone, Debug)]
pub struct LoopOutcome {
    /// Answer text.
    pub final_answer: String,
    /// Tool calls in issue order.
    pub actions: Vec<ToolInvocation>,
    /// THINK cycles used.
    pub think_cycles: usize,
    /// Why the loop stopped.
    pub termination: Termination,
}

/// Loop over a reasoner and a tool registry.
pub struct ReactLoop<'a> {
    reasoner: &'a dyn Reasoner,
    registry: &'a ToolRegistry,
    config: &'a AgentConfig,
}

#[derive(Default)]
struct LoopState {
    actions: Vec<ToolInvocation>,
    notes: Vec<String>,
    violations: usize,
    failed_steps: usize,
    cycles: usize,
}

enum Step {
    Continue,
    Answer(String),
    Stop(Termination),
}

impl<'a> ReactLoop<'a> {
    /// Loop for one turn.
    #[must_use]
    pub const fn new(reasoner: &'a dyn Reasoner, registry: &'a ToolRegistry, config: &'a AgentConfig) -> Self {
        Self {
            reasoner,
            registry,
            config,
        }
    }

    /// Run the loop for `user_id` over a rendered context block.
    pub async fn run(&self, user_id: &str, context_block: &str) -> LoopOutcome {
        let system = system_prompt(self.registry);
        let mut state = LoopState::default();

        let termination = loop {
            if state.cycles >= self.config.max_iterations {
                break Termination::IterationCeiling;
            }
            state.cycles += 1;

            let request = ReasoningRequest {
                system_prompt: system.clone(),
                prompt: render_turn_prompt(context_block, &state.actions, &state.notes),
                tools_allowed: true,
            };
            let decision = match self.reasoner.decide(&request).await {
                Ok(decision) => decision,
                Err(err) => {
                    warn!(error = %err, cycle = state.cycles, "reasoning provider failed");
                    break Termination::ProviderUnavailable;
                }
            };

            match self.step(user_id, decision, &mut state).await {
                Step::Continue => {}
                Step::Answer(text) => {
                    return LoopOutcome {
                        final_answer: text,
                        actions: state.actions,
                        think_cycles: state.cycles,
                        termination: Termination::Answered,
                    };
                }
                Step::Stop(termination) => break termination,
            }
        };

        let final_answer = self.forced_answer(context_block, &state, termination).await;
        LoopOutcome {
            final_answer,
            actions: state.actions,
            think_cycles: state.cycles,
            termination,
        }
    }

    async fn step(&self, user_id: &str, decision: Decision, state: &mut LoopState) -> Step {
        match decision {
            Decision::Answer(text) if !text.trim().is_empty() => Step::Answer(text.trim().to_string()),
            Decision::Answer(_) => self.violation(state, "the answer was empty".to_string()),
            Decision::ToolCalls(calls) if calls.is_empty() => {
                self.violation(state, "a tool action must name at least one tool".to_string())
            }
            Decision::Malformed(reason) => {
                debug!(%reason, "malformed reasoner output");
                self.violation(state, format!("the previous reply was not a valid action ({reason})"))
            }
            Decision::ToolCalls(calls) => self.act(user_id, &calls, state).await,
        }
    }

    async fn act(&self, user_id: &str, calls: &[ToolCall], state: &mut LoopState) -> Step {
        debug!(calls = calls.len(), "issuing tool calls");
        let step: Vec<ToolInvocation> =
            join_all(calls.iter().map(|call| self.registry.invoke_recorded(user_id, call))).await;

        let broken: Vec<String> = step
            .iter()
            .filter_map(|invocation| match &invocation.result {
                Err(err) if err.is_contract_violation() => Some(err.to_string()),
                _ => None,
            })
            .collect();
        let all_failed = step.iter().all(|invocation| !invocation.succeeded());
        state.actions.extend(step);

        if !broken.is_empty() {
            return self.violation(state, format!("use only the listed tools and arguments: {}", broken.join("; ")));
        }
        if all_failed {
            state.failed_steps += 1;
            if state.failed_steps >= self.config.max_tool_failures {
                warn!(steps = state.failed_steps, "tool failure budget exhausted");
                return Step::Stop(Termination::ToolFailures);
            }
        } else {
            state.failed_steps = 0;
        }
        Step::Continue
    }

    fn violation(&self, state: &mut LoopState, note: String) -> Step {
        state.violations += 1;
        state.notes.push(note);
        if state.violations > self.config.malformed_retries {
            warn!(violations = state.violations, "contract violation budget exhausted");
            Step::Stop(Termination::ContractViolations)
        } else {
            Step::Continue
        }
    }

    async fn forced_answer(&self, context_block: &str, state: &LoopState, termination: Termination) -> String {
        if termination != Termination::ProviderUnavailable {
            let request = ReasoningRequest {
                system_prompt: answer_only_prompt(),
                prompt: render_turn_prompt(context_block, &state.actions, &state.notes),
                tools_allowed: false,
            };
            match self.reasoner.decide(&request).await {
                Ok(Decision::Answer(text)) if !text.trim().is_empty() => return text.trim().to_string(),
                Ok(other) => debug!(?other, "forced answer was not an answer"),
                Err(err) => warn!(error = %err, "forced answer failed"),
            }
        }
        fallback_answer(termination, &state.actions)
    }
}

/// Apology used when no answer could be obtained.
#[must_use]
pub fn fallback_answer(termination: Termination, actions: &[ToolInvocation]) -> String {
    if termination == Termination::ProviderUnavailable {
        return "Sorry, the assistant is unavailable right now. Please try again in a moment.".to_string();
    }
    let mut failed: Vec<&str> = actions
        .iter()
        .filter(|action| !action.succeeded())
        .map(|action| action.tool_name.as_str())
        .collect();
    failed.sort_unstable();
    failed.dedup();
    if failed.is_empty() {
        "Sorry, I could not complete that request. Please try rephrasing it.".to_string()
    } else {
        format!(
            "Sorry, I could not complete that request because these tools failed: {}. Please try again later.",
            failed.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::llm::error::ProviderError;
    use crate::testing::{ScriptedReasoner, UnknownToolReasoner};
    use crate::tools::error::ToolError;
    use crate::tools::registry::{Tool, ToolFuture};
    use crate::tools::schema::{ArgKind, ArgSpec, Arguments, ToolSpec};

    struct Weather {
        spec: ToolSpec,
        fail: bool,
    }

    impl Weather {
        fn new(fail: bool) -> Self {
            Self {
                spec: ToolSpec {
                    name: "weather",
                    description: "Weather for a city",
                    args: vec![ArgSpec::required("city", "City", ArgKind::String { max_len: 40 })],
                },
                fail,
            }
        }
    }

    impl Tool for Weather {
        fn spec(&self) -> &ToolSpec {
            &self.spec
        }

        fn call<'a>(&'a self, _user_id: &'a str, args: Arguments) -> ToolFuture<'a> {
            Box::pin(async move {
                if self.fail {
                    return Err(ToolError::execution(
                        "weather",
                        ProviderError::status("weather", 502, "bad gateway"),
                    ));
                }
                Ok(json!({"city": args.str("city"), "forecast": "sunny"}))
            })
        }
    }

    fn registry(fail: bool) -> ToolRegistry {
        ToolRegistry::new(Duration::from_secs(1)).with_tool(Arc::new(Weather::new(fail)))
    }

    fn weather_call(city: &str) -> Result<Decision, ProviderError> {
        Ok(Decision::ToolCalls(vec![ToolCall::new("weather", json!({"city": city}))]))
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let reasoner = ScriptedReasoner::new([Ok(Decision::Answer("  hi there ".to_string()))]);
        let config = AgentConfig::default();
        let registry = registry(false);
        let outcome = ReactLoop::new(&reasoner, &registry, &config).run("u", "ctx\n").await;
        assert_eq!(outcome.final_answer, "hi there");
        assert_eq!(outcome.termination, Termination::Answered);
        assert_eq!(outcome.think_cycles, 1);
        assert!(outcome.actions.is_empty());
        assert!(reasoner.requests()[0].tools_allowed);
    }

    #[tokio::test]
    async fn test_concurrent_calls_then_answer() {
        let reasoner = ScriptedReasoner::new([
            Ok(Decision::ToolCalls(vec![
                ToolCall::new("weather", json!({"city": "Paris"})),
                ToolCall::new("weather", json!({"city": "Lyon"})),
            ])),
            Ok(Decision::Answer("Sunny in both.".to_string())),
        ]);
        let config = AgentConfig::default();
        let registry = registry(false);
        let outcome = ReactLoop::new(&reasoner, &registry, &config).run("u", "ctx\n").await;
        assert_eq!(outcome.termination, Termination::Answered);
        assert_eq!(outcome.actions.len(), 2);
        assert_eq!(outcome.actions[0].arguments["city"], "Paris");
        assert_eq!(outcome.actions[1].arguments["city"], "Lyon");
        let second = &reasoner.requests()[1];
        assert!(second.prompt.contains("Observation: {\"city\":\"Paris\",\"forecast\":\"sunny\"}"));
    }

    #[tokio::test]
    async fn test_unknown_tool_terminates_with_answer() {
        let config = AgentConfig::default();
        let registry = registry(false);
        let outcome = ReactLoop::new(&UnknownToolReasoner, &registry, &config).run("u", "ctx\n").await;
        assert_eq!(outcome.termination, Termination::ContractViolations);
        assert_eq!(outcome.think_cycles, config.malformed_retries + 1);
        assert!(outcome.think_cycles <= config.max_iterations);
        assert!(!outcome.final_answer.is_empty());
        assert!(outcome.actions.iter().all(|a| matches!(a.result, Err(ToolError::NotFound { .. }))));
    }

    #[tokio::test]
    async fn test_malformed_then_recovers() {
        let reasoner = ScriptedReasoner::new([
            Ok(Decision::Malformed("not json".to_string())),
            Ok(Decision::Answer("ok".to_string())),
        ]);
        let config = AgentConfig::default();
        let registry = registry(false);
        let outcome = ReactLoop::new(&reasoner, &registry, &config).run("u", "ctx\n").await;
        assert_eq!(outcome.final_answer, "ok");
        assert_eq!(outcome.termination, Termination::Answered);
        assert!(reasoner.requests()[1].prompt.contains("Note: the previous reply was not a valid action"));
    }

    #[tokio::test]
    async fn test_tool_failure_budget_forces_answer() {
        let reasoner = ScriptedReasoner::new([
            weather_call("Paris"),
            weather_call("Paris"),
            Ok(Decision::Malformed("still thinking".to_string())),
        ]);
        let config = AgentConfig::default();
        let registry = registry(true);
        let outcome = ReactLoop::new(&reasoner, &registry, &config).run("u", "ctx\n").await;
        assert_eq!(outcome.termination, Termination::ToolFailures);
        assert_eq!(outcome.actions.len(), 2);
        assert!(outcome.final_answer.contains("weather"));
        let last = reasoner.requests().pop().unwrap();
        assert!(!last.tools_allowed);
    }

    #[tokio::test]
    async fn test_iteration_ceiling() {
        let config = AgentConfig {
            max_iterations: 3,
            ..AgentConfig::default()
        };
        let reasoner = ScriptedReasoner::new([
            weather_call("a"),
            weather_call("b"),
            weather_call("c"),
            weather_call("d"),
            Ok(Decision::Answer("summary".to_string())),
        ]);
        let registry = registry(false);
        let outcome = ReactLoop::new(&reasoner, &registry, &config).run("u", "ctx\n").await;
        assert_eq!(outcome.termination, Termination::IterationCeiling);
        assert_eq!(outcome.think_cycles, 3);
        assert_eq!(outcome.actions.len(), 3);
        // Forced call consumed the fourth scripted step, which is not an answer.
        assert!(outcome.final_answer.starts_with("Sorry"));
    }

    #[tokio::test]
    async fn test_provider_failure_yields_apology() {
        let reasoner = ScriptedReasoner::new([Err(ProviderError::transport("reasoning", "connection refused"))]);
        let config = AgentConfig::default();
        let registry = registry(false);
        let outcome = ReactLoop::new(&reasoner, &registry, &config).run("u", "ctx\n").await;
        assert_eq!(outcome.termination, Termination::ProviderUnavailable);
        assert!(outcome.final_answer.contains("unavailable"));
        assert_eq!(reasoner.requests().len(), 1);
    }

    #[test]
    fn test_fallback_lists_failed_tools_once() {
        let failed = ToolInvocation {
            tool_name: "web_search".to_string(),
            arguments: json!({}),
            result: Err(ToolError::execution("web_search", ProviderError::transport("search", "down"))),
            latency: Duration::ZERO,
        };
        let answer = fallback_answer(Termination::ToolFailures, &[failed.clone(), failed]);
        assert_eq!(answer.matches("web_search").count(), 1);
    }
}
