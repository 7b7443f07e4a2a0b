//! Tools the agent can invoke: a meeting-room calendar and web search.

pub mod calendar;
pub mod error;
pub mod registry;
pub mod schema;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

pub use calendar::{Calendar, SqliteBookingStore};
pub use error::ToolError;
pub use registry::{Tool, ToolFuture, ToolInvocation, ToolRegistry};
pub use schema::{ArgKind, ArgSpec, Arguments, ToolSpec};
pub use search::{SearchBackend, WebSearchTool, build_search_backend};

/// Registry holding the calendar tools and web search.
#[must_use]
pub fn standard_registry(calendar: &Arc<Calendar>, search: WebSearchTool, timeout: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::new(timeout);
    for tool in calendar.tools() {
        registry.register(tool);
    }
    registry.with_tool(Arc::new(search))
}
