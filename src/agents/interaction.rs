// Stack Sage: Interaction Agent
// The only agent that composes prose. Drafts an answer from gathered
// evidence under the grounding contract, and declares missing context
// instead of inventing facts.

use crate::agents::Agent;
use crate::context::SageContext;
use crate::llm::{Message, SystemPrompts};
use crate::state::{AgentId, AgentState, EvidenceKind, MetaEvidence, RuleEvidence};
use async_trait::async_trait;

pub const EMPTY_QUESTION_REPLY: &str =
    "Please ask a question about Magic: The Gathering rules, cards, or formats.";

pub struct InteractionAgent;

#[async_trait]
impl Agent for InteractionAgent {
    fn id(&self) -> AgentId {
        AgentId::Interaction
    }

    async fn run(&self, state: &mut AgentState, ctx: &SageContext) {
        state.mark_tool_used("interaction_reasoner");

        if state.user_question.trim().is_empty() {
            state.draft_answer = EMPTY_QUESTION_REPLY.to_string();
            return;
        }

        let context_block = build_context_block(state);
        if context_block.is_empty() {
            // No evidence at all. Ask the graph for the most useful kind and
            // leave an honest partial draft in place.
            let wanted = if state.extracted_cards.is_empty() {
                EvidenceKind::Rules
            } else {
                EvidenceKind::Cards
            };
            if state.missing_context.is_none() {
                state.missing_context = Some(wanted);
            }
            state.draft_answer = format!(
                "I couldn't gather enough {} context to answer this reliably yet.",
                wanted.as_str()
            );
            return;
        }

        let handle = match ctx.llm.get(ctx.config.llm_temperature) {
            Ok(handle) => handle,
            Err(err) => {
                state.add_issue(format!("interaction agent has no model handle: {err}"));
                state.draft_answer =
                    "I gathered the relevant evidence but could not compose an answer because the \
                     language model is unavailable."
                        .to_string();
                return;
            }
        };

        let user_prompt = format!(
            "Context:\n\n{context_block}\nQuestion: {}\n\nProvide your answer:",
            state.user_question
        );
        let messages = vec![
            Message::system(SystemPrompts::interaction()),
            Message::user(&user_prompt),
        ];

        // A specialist may already have flagged thin rules coverage; the
        // draft then carries an explicit disclaimer.
        let thin_rules = state.missing_context == Some(EvidenceKind::Rules);

        match handle.complete(&messages).await {
            Ok(response) => {
                let mut draft = response.content.trim().to_string();
                if let Some(wanted) = detect_missing_context(&draft) {
                    log::info!("interaction agent declared missing {} context", wanted.as_str());
                    if state.missing_context.is_none() {
                        state.missing_context = Some(wanted);
                    }
                }
                if thin_rules {
                    draft.push_str(
                        "\n\nNote: I found little matching text in the Comprehensive Rules for \
                         this question, so the answer leans on card text alone.",
                    );
                }
                state.draft_answer = draft;
            }
            Err(err) => {
                state.add_issue(format!("answer drafting failed: {err}"));
                state.draft_answer =
                    "I gathered the relevant evidence but could not compose an answer because the \
                     language model is unavailable."
                        .to_string();
            }
        }
    }
}

/// Assemble the evidence the draft may cite. Order matters: cards first,
/// then rules, then the metagame snapshot when present.
fn build_context_block(state: &AgentState) -> String {
    let mut block = String::new();

    let cards = state.card_evidence();
    if !cards.is_empty() {
        block.push_str("=== CARD INFORMATION ===\n\n");
        for card in cards {
            block.push_str(&card.to_context_block());
            if card.oracle_text.to_lowercase().contains("you ") {
                block.push_str(
                    "Note: 'you' in this card's text refers to the card's CONTROLLER.\n",
                );
            }
            block.push('\n');
        }
    }

    let rules = state.rule_evidence();
    if !rules.is_empty() {
        block.push_str("=== COMPREHENSIVE RULES ===\n\n");
        for rule in rules {
            block.push_str(&format_rule_block(rule));
            block.push('\n');
        }
    }

    if let Some(meta) = state.meta_evidence() {
        block.push_str("=== METAGAME ===\n\n");
        block.push_str(&format_meta_block(meta));
    }

    block
}

fn format_rule_block(rule: &RuleEvidence) -> String {
    format!("[{}] (relevance {:.2})\n{}\n", rule.rule_id, rule.score, rule.text)
}

fn format_meta_block(meta: &MetaEvidence) -> String {
    let mut block = format!(
        "Format: {}\nSnapshot date: {}\n",
        meta.format,
        meta.snapshot_date.format("%Y-%m-%d")
    );
    if meta.stale {
        block.push_str("Note: this snapshot is stale and may be outdated.\n");
    }
    block.push_str(&format!("\n{}\n", meta.summary));
    for (i, source) in meta.sources.iter().take(3).enumerate() {
        block.push_str(&format!("{}. {} ({})\n   {}\n", i + 1, source.title, source.url, source.snippet));
    }
    block
}

/// Phrases that signal the model wants more evidence before committing.
fn detect_missing_context(draft: &str) -> Option<EvidenceKind> {
    let lowered = draft.to_lowercase();
    let indicators = [
        "i need more information",
        "i don't have enough",
        "insufficient information",
        "cannot determine",
        "need to know",
        "missing information",
    ];
    if !indicators.iter().any(|phrase| lowered.contains(phrase)) {
        return None;
    }
    if lowered.contains("card") {
        Some(EvidenceKind::Cards)
    } else {
        Some(EvidenceKind::Rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CardEvidence, Evidence};

    #[test]
    fn test_missing_context_detection() {
        assert_eq!(
            detect_missing_context("I need more information about the card Unearth."),
            Some(EvidenceKind::Cards)
        );
        assert_eq!(
            detect_missing_context("Insufficient information about layering rules."),
            Some(EvidenceKind::Rules)
        );
        assert_eq!(detect_missing_context("The answer is yes, per rule 614.6."), None);
    }

    #[test]
    fn test_context_block_includes_controller_note() {
        let mut state = AgentState::new("q");
        state.add_evidence(
            EvidenceKind::Cards,
            Evidence::Card(CardEvidence {
                name: "Blood Artist".into(),
                oracle_text: "Whenever Blood Artist or another creature dies, target player loses \
                              1 life and you gain 1 life."
                    .into(),
                ..Default::default()
            }),
        );
        let block = build_context_block(&state);
        assert!(block.contains("Blood Artist"));
        assert!(block.contains("CONTROLLER"));
    }

    #[test]
    fn test_empty_state_has_empty_block() {
        let state = AgentState::new("q");
        assert!(build_context_block(&state).is_empty());
    }
}
