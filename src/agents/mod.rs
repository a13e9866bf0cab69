// Stack Sage: Agent System
// One specialist per concern, coordinated by the multi-agent graph. Agents
// catch their own tool failures and record them as issues; only the graph
// decides what happens next.

pub mod card_agent;
pub mod deck_agent;
pub mod finalizer;
pub mod interaction;
pub mod judge;
pub mod meta_agent;
pub mod planner;
pub mod rules_agent;

pub use card_agent::CardAgent;
pub use deck_agent::DeckAgent;
pub use finalizer::Finalizer;
pub use interaction::InteractionAgent;
pub use judge::JudgeAgent;
pub use meta_agent::MetaAgent;
pub use planner::Planner;
pub use rules_agent::RulesAgent;

use crate::context::SageContext;
use crate::state::{AgentId, AgentState};
use async_trait::async_trait;

/// Base trait for all agents. `run` must not panic and must not propagate
/// errors; failures are recorded on the state as issues.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> AgentId;

    async fn run(&self, state: &mut AgentState, ctx: &SageContext);
}
