//! The ReAct agent: per-turn loop over the reasoner and the tool registry,
//! with memories retrieved before the loop and extracted after it.

pub mod prompts;
pub mod react;
pub mod service;
pub mod turn;

pub use react::{LoopOutcome, ReactLoop};
pub use service::AgentService;
pub use turn::{AgentTurn, RetrievalStatus, Termination, TurnTrace};
