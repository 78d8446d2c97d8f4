pub mod adapter;
pub mod aggregator;
pub mod backend;
pub mod claude_cli;
pub mod coordinator;
pub mod error;
pub mod execution;
pub mod heuristic;
pub mod market;
pub mod openai;
pub mod parser;
pub mod prompts;
pub mod roster;
pub mod state;

pub mod test_support;

pub use adapter::{ReasonedVote, ReasoningAdapter, ReasoningFailure};
pub use aggregator::{aggregate, decision_for, Aggregate, WeightedVote};
pub use backend::{build_backend, ReasoningBackend, RoleContext};
pub use coordinator::{DebateCoordinator, OutcomeReport};
pub use error::{AgentError, CoordinatorError};
pub use execution::{ExecutionSink, PaperExecutionSink};
pub use market::{MarketIntel, StaticMarketIntel};
pub use roster::{RosterMember, SpecialistRoster};
pub use state::{DebateState, TransitionError};
