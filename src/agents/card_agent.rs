// Stack Sage: Card Agent
// Resolves the planned card names into evidence. Lookups run in bounded
// parallel waves; misses become issues, never failures.

use crate::agents::Agent;
use crate::context::SageContext;
use crate::error::SageError;
use crate::scryfall::extract_card_names;
use crate::state::{AgentId, AgentState, Citation, Evidence, EvidenceKind};
use async_trait::async_trait;

pub struct CardAgent;

#[async_trait]
impl Agent for CardAgent {
    fn id(&self) -> AgentId {
        AgentId::Cards
    }

    async fn run(&self, state: &mut AgentState, ctx: &SageContext) {
        let names = if state.extracted_cards.is_empty() {
            // Planner produced nothing; fall back to conservative extraction.
            extract_card_names(&state.user_question)
        } else {
            state.extracted_cards.clone()
        };

        if names.is_empty() {
            log::debug!("card agent: no card names to fetch");
            return;
        }

        state.mark_tool_used("lookup_card");
        log::info!("card agent: fetching {names:?}");

        for (name, outcome) in ctx.tools.compare_multiple_cards(&names).await {
            match outcome {
                Ok(card) => {
                    state.add_citation(Citation::Card {
                        name: card.name.clone(),
                        set_code: card.set_code.clone(),
                    });
                    state.add_evidence(EvidenceKind::Cards, Evidence::Card(card));
                }
                Err(SageError::NotFound(_)) => {
                    state.add_issue(format!("I couldn't find a card named '{name}'"));
                }
                Err(err) => {
                    state.add_issue(format!("card lookup for '{name}' failed: {err}"));
                }
            }
        }
    }
}
