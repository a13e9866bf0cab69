// Stack Sage: Judge Agent
// Verifies the draft before release: every card name and rule id it mentions
// must exist in state, and controller-sensitive claims must credit effects
// to the right player. Rejected drafts get one constrained rewrite; if that
// cannot be grounded either, an honest refusal replaces the answer.

use crate::agents::Agent;
use crate::config::PLANNER_TEMPERATURE;
use crate::context::SageContext;
use crate::llm::{Message, SystemPrompts};
use crate::state::{AgentId, AgentState, CardEvidence, JudgeReport};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

pub const REFUSAL_ANSWER: &str =
    "I don't have enough reliable information to answer that accurately. The question requires \
     card details or rules text I couldn't verify. Try asking about a specific card name or \
     rules topic.";

static RULE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}\.\d+[a-z]?\b").unwrap());
static CARD_CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z][a-z]+(?:\s+(?:of|the|in|from|to|with|and|or)?\s*[A-Z][a-z]+)+\b").unwrap()
});
static USER_GAINS_LIFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\byou\s+(?:would\s+)?gain(?:s)?\b[^.]*\blife\b").unwrap());
static OPPONENT_LOSES_LIFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:your\s+)?opponent\s+(?:would\s+)?loses?\b[^.]*\blife\b").unwrap());

/// Phrases that look like card names but are game or product terms.
const NAME_SKIP_LIST: &[&str] = &[
    "magic the gathering",
    "the gathering",
    "the stack",
    "the battlefield",
    "comprehensive rules",
    "stack sage",
    "state based actions",
    "state-based actions",
    "oracle text",
];

/// Which player controls a permanent, as parsed from the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    User,
    Opponent,
    Unknown,
}

pub struct JudgeAgent;

#[async_trait]
impl Agent for JudgeAgent {
    fn id(&self) -> AgentId {
        AgentId::Judge
    }

    async fn run(&self, state: &mut AgentState, ctx: &SageContext) {
        if state.draft_answer.trim().is_empty() {
            log::debug!("judge: no draft to verify");
            return;
        }
        state.mark_tool_used("judge_verification");

        let ungrounded = verify_grounding(&state.draft_answer, state);
        let controller_correction = if state.controller_sensitive {
            verify_controller_logic(&state.user_question, &state.draft_answer, &state.card_evidence())
        } else {
            None
        };

        let mut issues: Vec<String> = ungrounded
            .iter()
            .map(|token| format!("draft mentions '{token}' which is not in the gathered evidence"))
            .collect();
        if let Some(correction) = &controller_correction {
            issues.push(format!("controller logic: {correction}"));
        }

        let originally_grounded = ungrounded.is_empty();
        if originally_grounded && controller_correction.is_none() {
            state.judge_report = Some(JudgeReport {
                grounded: true,
                controller_correction: None,
                issues,
            });
            log::info!("judge: draft accepted");
            return;
        }

        log::warn!("judge: draft rejected ({} issues), attempting rewrite", issues.len());
        let rewritten = self
            .rewrite(state, ctx, &ungrounded, controller_correction.as_deref())
            .await;

        match rewritten {
            Some(draft) if verify_grounding(&draft, state).is_empty() => {
                state.draft_answer = draft;
            }
            _ => {
                // The ungrounded claim could not be removed; refuse honestly.
                issues.push("rewrite could not be grounded; replaced with refusal".to_string());
                state.draft_answer = REFUSAL_ANSWER.to_string();
            }
        }

        for issue in &issues {
            state.add_issue(issue.clone());
        }
        state.judge_report = Some(JudgeReport {
            grounded: originally_grounded,
            controller_correction,
            issues,
        });
    }
}

impl JudgeAgent {
    /// Constrained rewrite: only cited evidence may appear, corrections are
    /// authoritative. Runs at temperature zero.
    async fn rewrite(
        &self,
        state: &AgentState,
        ctx: &SageContext,
        ungrounded: &[String],
        correction: Option<&str>,
    ) -> Option<String> {
        let handle = ctx.llm.get(PLANNER_TEMPERATURE).ok()?;

        let mut allowed: Vec<String> = state
            .card_evidence()
            .iter()
            .map(|card| card.name.clone())
            .collect();
        allowed.extend(state.rule_evidence().iter().map(|rule| rule.rule_id.clone()));

        let mut instructions = format!(
            "Allowed evidence: {}\n\nDraft to rewrite:\n{}\n",
            if allowed.is_empty() { "(none)".to_string() } else { allowed.join(", ") },
            state.draft_answer
        );
        if !ungrounded.is_empty() {
            instructions.push_str(&format!(
                "\nRemove these unsupported references: {}\n",
                ungrounded.join(", ")
            ));
        }
        if let Some(correction) = correction {
            instructions.push_str(&format!("\nCorrection to apply: {correction}\n"));
        }
        instructions.push_str(&format!("\nQuestion: {}\n", state.user_question));

        let messages = vec![
            Message::system(SystemPrompts::judge_rewrite()),
            Message::user(&instructions),
        ];

        match handle.complete(&messages).await {
            Ok(response) => {
                let content = response.content.trim().to_string();
                if content.is_empty() || content.contains("INSUFFICIENT EVIDENCE") {
                    None
                } else {
                    Some(content)
                }
            }
            Err(err) => {
                log::warn!("judge rewrite call failed: {err}");
                None
            }
        }
    }
}

/// Extract dotted rule ids from text.
pub fn extract_rule_ids(text: &str) -> Vec<String> {
    RULE_ID.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Extract title-cased multi-word tokens that look like card names.
pub fn extract_card_candidates(text: &str) -> Vec<String> {
    CARD_CANDIDATE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|candidate| !NAME_SKIP_LIST.contains(&candidate.to_lowercase().as_str()))
        .collect()
}

/// Return every card-like token and rule id in the draft that the gathered
/// evidence cannot account for. Empty means grounded.
pub fn verify_grounding(draft: &str, state: &AgentState) -> Vec<String> {
    // All evidence text the draft may legitimately draw names from.
    let mut corpus = String::new();
    for card in state.card_evidence() {
        corpus.push_str(&card.name);
        corpus.push(' ');
        corpus.push_str(&card.oracle_text);
        corpus.push(' ');
        corpus.push_str(&card.type_line);
        corpus.push(' ');
        for ruling in &card.rulings {
            corpus.push_str(ruling);
            corpus.push(' ');
        }
    }
    let rule_texts: Vec<&str> = state.rule_evidence().iter().map(|r| r.text.as_str()).collect();
    for text in &rule_texts {
        corpus.push_str(text);
        corpus.push(' ');
    }
    let corpus = corpus.to_lowercase();

    let mut missing: Vec<String> = Vec::new();

    for candidate in extract_card_candidates(draft) {
        if !corpus.contains(&candidate.to_lowercase()) {
            missing.push(candidate);
        }
    }

    let rule_ids: std::collections::HashSet<String> = state
        .rule_evidence()
        .iter()
        .map(|r| r.rule_id.clone())
        .collect();
    for id in extract_rule_ids(draft) {
        let in_evidence = rule_ids.contains(&id) || corpus.contains(&id.to_lowercase());
        if !in_evidence {
            missing.push(id);
        }
    }

    missing.sort();
    missing.dedup();
    missing
}

/// Who controls `card_name`, judged from the phrasing immediately before its
/// mention in the question.
pub fn controller_of(question: &str, card_name: &str) -> Controller {
    let lowered = question.to_lowercase();
    let needle = card_name.to_lowercase();
    let Some(position) = lowered.find(&needle) else {
        return Controller::Unknown;
    };

    let window_start = position.saturating_sub(40);
    let window = &lowered[window_start..position];
    if window.contains("opponent") || window.contains("their") || window.contains("they ") {
        Controller::Opponent
    } else if window.contains("my ") || window.contains("i control") || window.contains("i have") {
        Controller::User
    } else {
        Controller::Unknown
    }
}

/// Check the draft's life-change claims against the controllers parsed from
/// the question. A trigger from a permanent benefits its controller unless
/// the card text says otherwise; "you" on a card is always its controller.
/// Returns a correction message when a claim is inverted.
pub fn verify_controller_logic(
    question: &str,
    draft: &str,
    cards: &[&CardEvidence],
) -> Option<String> {
    for card in cards {
        if controller_of(question, &card.name) != Controller::Opponent {
            continue;
        }
        let oracle = card.oracle_text.to_lowercase();
        let controller_gains = oracle.contains("you gain") && oracle.contains("life");

        if controller_gains && USER_GAINS_LIFE.is_match(draft) {
            return Some(format!(
                "your opponent controls {}, so its controller gains the life; \"you\" on the card \
                 refers to the opponent, not you",
                card.name
            ));
        }
        if controller_gains && OPPONENT_LOSES_LIFE.is_match(draft) {
            return Some(format!(
                "{}'s controller (your opponent) chooses the target, so you lose the life, not \
                 your opponent",
                card.name
            ));
        }
    }
    None
}
