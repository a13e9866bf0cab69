// Stack Sage: Deck Agent
// Pulls a decklist out of the question, validates it, and drafts the
// validation report. Deck questions bypass the interaction/judge pipeline;
// the report is factual output of the validator, not model prose.

use crate::agents::Agent;
use crate::context::SageContext;
use crate::deck::{detect_format, parse_decklist, Deck, DeckValidationResult, DeckValidator};
use crate::state::{AgentId, AgentState, DeckEvidence, Evidence, EvidenceKind};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

static CARD_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:SB:\s*)?\d+x?\s+\S").unwrap());
static COMMANDER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*commander:\s*(.+?)\s*$").unwrap());

pub struct DeckAgent;

#[async_trait]
impl Agent for DeckAgent {
    fn id(&self) -> AgentId {
        AgentId::Deck
    }

    async fn run(&self, state: &mut AgentState, ctx: &SageContext) {
        let question = state.user_question.clone();

        if !CARD_LINE.is_match(&question) {
            state.draft_answer = "I couldn't find a decklist in your question. Please provide one \
                                  line per card, like:\n\n4 Lightning Bolt\n20 Mountain\n\nand \
                                  name the format (Standard, Modern, Commander, ...)."
                .to_string();
            return;
        }

        let format = detect_format(&question).unwrap_or("unknown");
        let commander = COMMANDER_LINE
            .captures(&question)
            .map(|c| c[1].to_string());

        let decklist: String = question
            .lines()
            .filter(|line| !COMMANDER_LINE.is_match(line))
            .filter(|line| CARD_LINE.is_match(line) || line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let (mainboard, sideboard, warnings) = parse_decklist(&decklist);
        for warning in &warnings {
            state.add_issue(warning.clone());
        }

        let deck = Deck {
            format: format.to_string(),
            mainboard,
            sideboard,
            commander,
        };

        state.mark_tool_used("deck_validation");
        let mut validation = DeckValidator::new(ctx.tools.card_source()).validate(&deck).await;
        for warning in warnings {
            validation.add_warning(warning);
        }

        log::info!(
            "deck agent: {} ({} cards) -> legal={}",
            deck.format,
            validation.total_cards,
            validation.is_legal
        );

        state.draft_answer = format_validation_report(&validation);
        state.add_evidence(
            EvidenceKind::Deck,
            Evidence::Deck(DeckEvidence {
                format: deck.format.clone(),
                deck,
                validation,
            }),
        );
    }
}

/// Render a validation result for the user.
pub fn format_validation_report(result: &DeckValidationResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Format: {}\n", result.format));
    out.push_str(&format!("Total cards: {}\n", result.total_cards));
    out.push_str(&format!(
        "Status: {}\n",
        if result.is_legal { "LEGAL" } else { "NOT LEGAL" }
    ));

    if !result.errors.is_empty() {
        out.push_str(&format!("\nErrors ({}):\n", result.errors.len()));
        for error in &result.errors {
            out.push_str(&format!("  - {error}\n"));
        }
    }
    if !result.warnings.is_empty() {
        out.push_str(&format!("\nWarnings ({}):\n", result.warnings.len()));
        for warning in &result.warnings {
            out.push_str(&format!("  - {warning}\n"));
        }
    }

    if result.is_legal {
        out.push_str("\nYour deck is legal in this format.\n");
    } else {
        out.push_str("\nFix the errors above to make this deck legal.\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_line_detection() {
        assert!(CARD_LINE.is_match("4 Lightning Bolt"));
        assert!(CARD_LINE.is_match("SB: 2 Blood Moon"));
        assert!(!CARD_LINE.is_match("is my deck legal in modern?"));
    }

    #[test]
    fn test_commander_line_extraction() {
        let captures = COMMANDER_LINE
            .captures("Commander: Urza, Lord High Artificer")
            .unwrap();
        assert_eq!(&captures[1], "Urza, Lord High Artificer");
    }

    #[test]
    fn test_report_shape() {
        let mut result = DeckValidationResult::new("modern", 60);
        result.add_error("too many copies of Lightning Bolt (5 > 4)");
        let report = format_validation_report(&result);
        assert!(report.contains("NOT LEGAL"));
        assert!(report.contains("Lightning Bolt"));
    }
}
