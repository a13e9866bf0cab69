// Stack Sage: Multi-Agent Graph
// The dispatch loop: planner first, then the task plan head-by-head, then
// the finalizer. Node executions are capped, individually timed, and run
// under a soft timeout; agent failures surface as issues, never as aborts.

use crate::agents::{
    Agent, CardAgent, DeckAgent, Finalizer, InteractionAgent, JudgeAgent, MetaAgent, Planner,
    RulesAgent,
};
use crate::config::{NODE_TIMEOUT_SECS, RECURSION_LIMIT, REQUEST_BUDGET_SECS};
use crate::context::SageContext;
use crate::state::{AgentId, AgentState, Citation, JudgeReport};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const TOO_COMPLEX_REPLY: &str =
    "This question is too complex for me to work through within my processing limits. Try \
     splitting it into smaller questions.";

/// Per-request diagnostics surfaced alongside the answer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub agent_timings: HashMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge_report: Option<JudgeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_meta: Option<bool>,
    pub issues: Vec<String>,
}

/// The outcome of one `ask` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer: String,
    pub tools_used: Vec<String>,
    pub citations: Vec<Citation>,
    pub diagnostics: Diagnostics,
    pub success: bool,
}

/// State machine over the specialist agents.
pub struct MultiAgentGraph {
    planner: Planner,
    cards: CardAgent,
    rules: RulesAgent,
    meta: MetaAgent,
    deck: DeckAgent,
    interaction: InteractionAgent,
    judge: JudgeAgent,
    finalizer: Finalizer,
}

impl Default for MultiAgentGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiAgentGraph {
    pub fn new() -> Self {
        Self {
            planner: Planner,
            cards: CardAgent,
            rules: RulesAgent,
            meta: MetaAgent,
            deck: DeckAgent,
            interaction: InteractionAgent,
            judge: JudgeAgent,
            finalizer: Finalizer,
        }
    }

    fn agent(&self, id: AgentId) -> &dyn Agent {
        match id {
            AgentId::Planner => &self.planner,
            AgentId::Cards => &self.cards,
            AgentId::Rules => &self.rules,
            AgentId::Meta => &self.meta,
            AgentId::Deck => &self.deck,
            AgentId::Interaction => &self.interaction,
            AgentId::Judge => &self.judge,
            AgentId::Finalizer => &self.finalizer,
        }
    }

    /// Answer one question. Never fails; abort paths produce a diagnostic
    /// answer with `success = false`.
    pub async fn run(&self, ctx: &SageContext, question: &str) -> AskOutcome {
        let mut state = AgentState::new(question);
        let started = Instant::now();
        let budget = Duration::from_secs(REQUEST_BUDGET_SECS);
        let mut executions = 0usize;
        let mut aborted = false;

        log::info!("[{}] processing question", state.request_id);

        self.execute(AgentId::Planner, &mut state, ctx).await;
        executions += 1;

        while let Some(next) = state.task_plan.pop_front() {
            if next == AgentId::Finalizer {
                break;
            }
            // Keep one execution in reserve so the finalizer always runs
            // inside the cap.
            if executions >= RECURSION_LIMIT - 1 {
                state.add_issue(format!(
                    "recursion limit of {RECURSION_LIMIT} node executions reached"
                ));
                state.draft_answer = TOO_COMPLEX_REPLY.to_string();
                aborted = true;
                break;
            }
            if started.elapsed() >= budget {
                state.add_issue(format!(
                    "request exceeded its {REQUEST_BUDGET_SECS}s budget"
                ));
                state.draft_answer = timeout_reply(&state);
                aborted = true;
                break;
            }

            self.execute(next, &mut state, ctx).await;
            executions += 1;

            if next == AgentId::Interaction {
                self.handle_missing_context(&mut state);
            }
        }

        self.execute(AgentId::Finalizer, &mut state, ctx).await;
        executions += 1;
        debug_assert!(executions <= RECURSION_LIMIT);

        let stale_meta = state.meta_evidence().map(|meta| meta.stale);
        AskOutcome {
            answer: state.final_answer.clone(),
            tools_used: state.tools_used.clone(),
            citations: state.citations.clone(),
            diagnostics: Diagnostics {
                agent_timings: state.agent_timings.clone(),
                judge_report: state.judge_report.clone(),
                stale_meta,
                issues: state.issues.clone(),
            },
            success: !aborted,
        }
    }

    /// When the interaction agent declared a missing evidence kind, re-enter
    /// that specialist (then interaction again), at most once per kind.
    fn handle_missing_context(&self, state: &mut AgentState) {
        let Some(kind) = state.missing_context.take() else {
            return;
        };
        if !state.may_refetch(kind) {
            state.add_issue(format!(
                "{} context still missing after re-fetch",
                kind.as_str()
            ));
            return;
        }
        state.note_refetch(kind);
        log::info!("re-entering {} specialist for missing context", kind.as_str());
        state.task_plan.push_front(AgentId::Interaction);
        state.task_plan.push_front(kind.specialist());
    }

    /// Run one node under the soft timeout and record its wall-clock time.
    async fn execute(&self, id: AgentId, state: &mut AgentState, ctx: &SageContext) {
        log::debug!("[{id}] starting");
        let start = Instant::now();

        let agent = self.agent(id);
        let timed_out = tokio::time::timeout(
            Duration::from_secs(NODE_TIMEOUT_SECS),
            agent.run(state, ctx),
        )
        .await
        .is_err();

        if timed_out {
            state.add_issue(format!("{id} timed out after {NODE_TIMEOUT_SECS}s"));
        }

        let elapsed = start.elapsed().as_secs_f64();
        *state
            .agent_timings
            .entry(id.as_str().to_string())
            .or_insert(0.0) += elapsed;

        if ctx.config.verbose {
            log::info!(
                "[{id}] completed in {elapsed:.2}s ({} issues so far)",
                state.issues.len()
            );
        } else {
            log::debug!("[{id}] completed in {elapsed:.2}s");
        }
    }
}

/// Timeout reply that still surfaces whatever evidence was gathered.
fn timeout_reply(state: &AgentState) -> String {
    let mut reply = String::from("I ran out of time while working on this question.");

    let cards = state.card_evidence();
    let rules = state.rule_evidence();
    if !cards.is_empty() || !rules.is_empty() {
        reply.push_str(" Here is what I gathered before stopping:");
        if !cards.is_empty() {
            let names: Vec<&str> = cards.iter().map(|c| c.name.as_str()).collect();
            reply.push_str(&format!("\n- Cards: {}", names.join(", ")));
        }
        if !rules.is_empty() {
            let ids: Vec<&str> = rules.iter().map(|r| r.rule_id.as_str()).collect();
            reply.push_str(&format!("\n- Rules: {}", ids.join(", ")));
        }
    }
    if !state.draft_answer.trim().is_empty() {
        reply.push_str(&format!("\n\nPartial draft:\n{}", state.draft_answer.trim()));
    }
    reply
}
