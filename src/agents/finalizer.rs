// Stack Sage: Finalizer
// Pure formatter. Promotes the verified draft to the final answer and
// appends the tools-used and citations blocks. It adds no factual content.

use crate::agents::Agent;
use crate::context::SageContext;
use crate::state::{AgentId, AgentState};
use async_trait::async_trait;

pub struct Finalizer;

#[async_trait]
impl Agent for Finalizer {
    fn id(&self) -> AgentId {
        AgentId::Finalizer
    }

    async fn run(&self, state: &mut AgentState, _ctx: &SageContext) {
        state.mark_tool_used("finalizer");

        let body = if !state.draft_answer.trim().is_empty() {
            state.draft_answer.trim().to_string()
        } else {
            "I couldn't generate an answer for this question.".to_string()
        };

        let mut answer = body;

        if !state.tools_used.is_empty() {
            answer.push_str(&format!("\n\n---\nTools used: {}", state.tools_used.join(", ")));
        }

        if !state.citations.is_empty() {
            let labels: Vec<String> = state.citations.iter().map(|c| c.label()).collect();
            answer.push_str(&format!("\nCitations: {}", labels.join("; ")));
        }

        state.final_answer = answer;
        log::info!("finalizer: answer ready ({} chars)", state.final_answer.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SageConfig;
    use crate::llm::LlmHandles;
    use crate::state::Citation;
    use crate::tools::{MetaSearcher, ToolRegistry};
    use crate::error::{SageError, SageResult};
    use crate::scryfall::{CardSearchFilters, CardSource};
    use crate::state::{CardEvidence, MetaEvidence};
    use std::sync::Arc;

    struct NoCards;

    #[async_trait]
    impl CardSource for NoCards {
        async fn fetch_card(&self, name: &str) -> SageResult<CardEvidence> {
            Err(SageError::NotFound(name.to_string()))
        }

        async fn search_by_criteria(
            &self,
            _filters: &CardSearchFilters,
        ) -> SageResult<Vec<CardEvidence>> {
            Ok(Vec::new())
        }
    }

    struct NoMeta;

    #[async_trait]
    impl MetaSearcher for NoMeta {
        async fn search(&self, _query: &str, _max: usize) -> SageResult<MetaEvidence> {
            Err(SageError::ToolMisconfigured("test".into()))
        }
    }

    fn test_ctx() -> SageContext {
        let tools = ToolRegistry::new(Arc::new(NoCards), None, Arc::new(NoMeta));
        SageContext::new(
            SageConfig::default(),
            LlmHandles::over_http(&SageConfig::default()),
            tools,
        )
    }

    #[tokio::test]
    async fn test_final_answer_carries_metadata_blocks() {
        let mut state = AgentState::new("q");
        state.draft_answer = "The spell resolves.".into();
        state.mark_tool_used("planner");
        state.mark_tool_used("search_rules_hybrid");
        state.add_citation(Citation::Rule {
            rule_id: "405.5".into(),
            text: "405.5 ...".into(),
        });

        Finalizer.run(&mut state, &test_ctx()).await;

        assert!(state.final_answer.starts_with("The spell resolves."));
        assert!(state
            .final_answer
            .contains("Tools used: planner, search_rules_hybrid, finalizer"));
        assert!(state.final_answer.contains("Citations: Rule 405.5"));
    }

    #[tokio::test]
    async fn test_empty_draft_gets_placeholder() {
        let mut state = AgentState::new("q");
        Finalizer.run(&mut state, &test_ctx()).await;
        assert!(state.final_answer.contains("couldn't generate an answer"));
    }
}
