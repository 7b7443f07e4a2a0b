//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::agent::AgentService;
use crate::memory::storage::memory_store::MemoryStore;
use crate::tools::calendar::Calendar;

/// Shared application state.
pub struct AppState {
    /// The agent answering chat turns.
    pub agent: Arc<AgentService>,
    /// Meeting-room calendar, for the iCalendar feed.
    pub calendar: Arc<Calendar>,
}

impl AppState {
    /// Bundle the shared components.
    #[must_use]
    pub fn new(agent: Arc<AgentService>, calendar: Arc<Calendar>) -> Arc<Self> {
        Arc::new(Self { agent, calendar })
    }

    /// Memory store behind the agent.
    #[must_use]
    pub fn store(&self) -> &dyn MemoryStore {
        self.agent.store().as_ref()
    }
}
