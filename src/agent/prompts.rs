//! System preamble and per-step prompt rendering.

use std::fmt::Write as _;

use serde_json::Value;

use crate::tools::registry::{ToolInvocation, ToolRegistry};
use crate::tools::schema::ToolSpec;

/// Marker opening the tool call log of the current turn.
pub const SCRATCHPAD_SECTION: &str = "[SCRATCHPAD]";

const CAPABILITIES: &str = "\
You are a digital employee assistant with long-term memory of each user.

Capabilities:
1. Meeting rooms: book, query and cancel rooms. Bookings take a `day`
   (weekday, today/tomorrow or YYYY-MM-DD) and either a `time_slot`
   (morning 09:00, afternoon 14:00, evening 17:00) or a 24h `start_time`.
2. Web search: look up news and information. Use topic `news` for news.
3. Memory: the [USER_MEMORIES] section lists what is known about this user.

Using memories:
- Apply known preferences without asking again. If the user prefers a day or
  time for meetings, book that day and time.
- When asked for news without a subject, search each topic the user follows.
- Mention that you used a known preference when you apply one.
- Interpret the user's own terminology as recorded in memory.
";

const PROTOCOL: &str = "\
Reply with exactly one JSON object and nothing else.
To answer the user:
{\"action\": \"answer\", \"answer\": \"<reply shown to the user>\"}
To call tools (independent calls may be issued together):
{\"action\": \"tool\", \"tool_calls\": [{\"name\": \"<tool>\", \"arguments\": {...}}]}
Only use the tools listed above, with the declared arguments.
Reasoning may go inside <think>...</think>; it is hidden from the user.
";

const ANSWER_ONLY: &str = "\
No more tool calls are possible for this turn. Reply with
{\"action\": \"answer\", \"answer\": \"...\"} using what is already known,
and say plainly if something could not be done.
";

/// System prompt: capabilities, tool catalogue and reply protocol.
#[must_use]
pub fn system_prompt(registry: &ToolRegistry) -> String {
    let catalogue: Vec<Value> = registry.specs().map(ToolSpec::to_json).collect();
    let tools = serde_json::to_string_pretty(&catalogue).unwrap_or_else(|_| "[]".to_string());
    format!("{CAPABILITIES}\nTools:\n{tools}\n\n{PROTOCOL}")
}

/// System prompt for a forced, tool-free answer.
#[must_use]
pub fn answer_only_prompt() -> String {
    format!("{CAPABILITIES}\n{ANSWER_ONLY}")
}

/// Append the scratchpad for the actions taken so far to a context block.
#[must_use]
pub fn render_turn_prompt(context_block: &str, actions: &[ToolInvocation], notes: &[String]) -> String {
    let mut out = String::with_capacity(context_block.len() + 256);
    out.push_str(context_block);
    if actions.is_empty() && notes.is_empty() {
        return out;
    }
    out.push_str(SCRATCHPAD_SECTION);
    out.push('\n');
    for action in actions {
        let _ = writeln!(out, "Action: {} {}", action.tool_name, action.arguments);
        let _ = writeln!(out, "Observation: {}", action.observation());
    }
    for note in notes {
        let _ = writeln!(out, "Note: {note}");
    }
    out
}
