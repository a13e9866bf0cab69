// Stack Sage: Rules Agent
// Hybrid retrieval over the Comprehensive Rules, with a coverage score that
// flags thin results for the interaction agent.

use crate::agents::Agent;
use crate::config::{COVERAGE_EXPECTED, COVERAGE_THRESHOLD, RETRIEVAL_K};
use crate::context::SageContext;
use crate::state::{AgentId, AgentState, Citation, Evidence, EvidenceKind};
use async_trait::async_trait;

/// How many top-scored chunks turn into citations.
const CITED_RULES: usize = 3;

pub struct RulesAgent;

#[async_trait]
impl Agent for RulesAgent {
    fn id(&self) -> AgentId {
        AgentId::Rules
    }

    async fn run(&self, state: &mut AgentState, ctx: &SageContext) {
        // Card names boost retrieval relevance for interaction questions.
        let mut query = state.user_question.clone();
        for name in &state.extracted_cards {
            query.push(' ');
            query.push_str(name);
        }

        state.mark_tool_used("search_rules_hybrid");

        let results = match ctx.tools.search_rules_hybrid(&query, RETRIEVAL_K, 0.0).await {
            Ok(results) => results,
            Err(err) => {
                state.add_issue(format!("rules search failed: {err}"));
                state.missing_context = Some(EvidenceKind::Rules);
                return;
            }
        };

        let coverage = (results.len() as f64 / COVERAGE_EXPECTED as f64).clamp(0.0, 1.0);
        log::info!("rules agent: {} chunks, coverage {coverage:.2}", results.len());

        for (i, rule) in results.into_iter().enumerate() {
            if i < CITED_RULES {
                state.add_citation(Citation::Rule {
                    rule_id: rule.rule_id.clone(),
                    text: rule.text.clone(),
                });
            }
            state.add_evidence(EvidenceKind::Rules, Evidence::Rule(rule));
        }

        if coverage < COVERAGE_THRESHOLD {
            state.missing_context = Some(EvidenceKind::Rules);
        }
    }
}
