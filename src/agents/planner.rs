// Stack Sage: Planner Agent
// Classifies the question and extracts card names with a deterministic LLM
// call, then derives the task plan. Malformed model output gets one retry
// and a safe fallback; planning never fails the request.

use crate::agents::Agent;
use crate::config::PLANNER_TEMPERATURE;
use crate::context::SageContext;
use crate::llm::{Message, SystemPrompts};
use crate::state::{AgentId, AgentState, Intent};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;

pub struct Planner;

/// Phrasing that distinguishes the asker's permanents from an opponent's.
/// The Judge uses this flag to arm its controller-logic check.
static CONTROLLER_PHRASING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bopponent\b|\btheir\b|\bthey control\b|\bmy\b|\bi control\b").unwrap()
});

#[derive(Debug, PartialEq)]
struct QuestionAnalysis {
    card_names: Vec<String>,
    intent: Intent,
}

#[async_trait]
impl Agent for Planner {
    fn id(&self) -> AgentId {
        AgentId::Planner
    }

    async fn run(&self, state: &mut AgentState, ctx: &SageContext) {
        state.mark_tool_used("planner");

        let question = state.user_question.trim().to_string();
        state.controller_sensitive = CONTROLLER_PHRASING.is_match(&question);

        let analysis = if question.is_empty() {
            // Nothing to analyze; the interaction agent will ask for a question.
            QuestionAnalysis {
                card_names: Vec::new(),
                intent: Intent::Rules,
            }
        } else {
            self.analyze(&question, state, ctx).await
        };

        log::info!(
            "planner: intent={:?} cards={:?}",
            analysis.intent,
            analysis.card_names
        );

        state.intent = analysis.intent;
        state.extracted_cards = analysis.card_names;
        state.task_plan = build_task_plan(state.intent, !state.extracted_cards.is_empty());
    }
}

impl Planner {
    /// One LLM call, one retry on malformed JSON, then the deterministic
    /// fallback. The fallback routes to rules search with no cards, which
    /// downstream agents can always handle.
    async fn analyze(
        &self,
        question: &str,
        state: &mut AgentState,
        ctx: &SageContext,
    ) -> QuestionAnalysis {
        let handle = match ctx.llm.get(PLANNER_TEMPERATURE) {
            Ok(handle) => handle,
            Err(err) => {
                state.add_issue(format!("planner could not obtain a model handle: {err}"));
                return fallback_analysis();
            }
        };

        let messages = vec![
            Message::system(SystemPrompts::planner()),
            Message::user(question),
        ];

        for attempt in 0..2 {
            match handle.complete(&messages).await {
                Ok(response) => match parse_analysis(&response.content) {
                    Some(analysis) => return analysis,
                    None => {
                        log::warn!(
                            "planner returned malformed JSON (attempt {}): {}",
                            attempt + 1,
                            response.content.chars().take(120).collect::<String>()
                        );
                    }
                },
                Err(err) => {
                    state.add_issue(format!("planner analysis call failed: {err}"));
                    break;
                }
            }
        }

        state.add_issue("planner fell back to rules intent after malformed analysis".to_string());
        fallback_analysis()
    }
}

fn fallback_analysis() -> QuestionAnalysis {
    QuestionAnalysis {
        card_names: Vec::new(),
        intent: Intent::Rules,
    }
}

/// Parse the model's `{card_names, intent}` JSON, tolerating fenced code
/// blocks around it.
fn parse_analysis(content: &str) -> Option<QuestionAnalysis> {
    let stripped = strip_code_fences(content);
    let value: serde_json::Value = serde_json::from_str(stripped.trim()).ok()?;

    let intent = Intent::parse(value["intent"].as_str()?)?;
    let card_names = value["card_names"]
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str())
        .map(str::to_string)
        .filter(|name| !name.trim().is_empty())
        .collect();

    Some(QuestionAnalysis { card_names, intent })
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.contains("```") {
        return trimmed;
    }
    for part in trimmed.split("```") {
        let part = part.trim().trim_start_matches("json").trim();
        if part.starts_with('{') || part.starts_with('[') {
            return part;
        }
    }
    trimmed
}

/// Deterministic plan construction from intent and card presence. Every plan
/// ends at the finalizer.
pub fn build_task_plan(intent: Intent, has_cards: bool) -> VecDeque<AgentId> {
    let mut plan = VecDeque::new();
    match intent {
        Intent::DeckValidation => {
            plan.push_back(AgentId::Deck);
        }
        Intent::Meta => {
            plan.push_back(AgentId::Meta);
            if has_cards {
                plan.push_back(AgentId::Cards);
            }
            plan.push_back(AgentId::Interaction);
        }
        Intent::CardInteraction | Intent::Rules => {
            if has_cards {
                plan.push_back(AgentId::Cards);
            }
            plan.push_back(AgentId::Rules);
            plan.push_back(AgentId::Interaction);
            plan.push_back(AgentId::Judge);
        }
    }
    plan.push_back(AgentId::Finalizer);
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_for_deck_validation() {
        let plan = build_task_plan(Intent::DeckValidation, false);
        assert_eq!(plan, VecDeque::from(vec![AgentId::Deck, AgentId::Finalizer]));
    }

    #[test]
    fn test_plan_for_meta_with_cards() {
        let plan = build_task_plan(Intent::Meta, true);
        assert_eq!(
            plan,
            VecDeque::from(vec![
                AgentId::Meta,
                AgentId::Cards,
                AgentId::Interaction,
                AgentId::Finalizer
            ])
        );
    }

    #[test]
    fn test_plan_for_interaction_question() {
        let plan = build_task_plan(Intent::CardInteraction, true);
        assert_eq!(
            plan,
            VecDeque::from(vec![
                AgentId::Cards,
                AgentId::Rules,
                AgentId::Interaction,
                AgentId::Judge,
                AgentId::Finalizer
            ])
        );
    }

    #[test]
    fn test_plan_for_rules_without_cards() {
        let plan = build_task_plan(Intent::Rules, false);
        assert_eq!(
            plan,
            VecDeque::from(vec![
                AgentId::Rules,
                AgentId::Interaction,
                AgentId::Judge,
                AgentId::Finalizer
            ])
        );
    }

    #[test]
    fn test_parse_analysis_plain_and_fenced() {
        let plain = r#"{"card_names": ["Rest in Peace"], "intent": "card_interaction"}"#;
        let parsed = parse_analysis(plain).unwrap();
        assert_eq!(parsed.intent, Intent::CardInteraction);
        assert_eq!(parsed.card_names, vec!["Rest in Peace"]);

        let fenced = "```json\n{\"card_names\": [], \"intent\": \"meta\"}\n```";
        assert_eq!(parse_analysis(fenced).unwrap().intent, Intent::Meta);
    }

    #[test]
    fn test_parse_analysis_rejects_malformed() {
        assert!(parse_analysis("sure! here's my analysis").is_none());
        assert!(parse_analysis(r#"{"intent": "who knows"}"#).is_none());
        assert!(parse_analysis(r#"{"card_names": "not a list", "intent": "rules"}"#).is_none());
    }

    #[test]
    fn test_controller_phrasing() {
        assert!(CONTROLLER_PHRASING.is_match("If my opponent controls Blood Artist"));
        assert!(CONTROLLER_PHRASING.is_match("their creature dies"));
        assert!(!CONTROLLER_PHRASING.is_match("How does the stack work?"));
    }
}
