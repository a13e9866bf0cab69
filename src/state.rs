// Stack Sage: Agent State
// The typed record threaded through the multi-agent graph. One state per
// question; it lives for a single graph invocation and is then discarded.

use crate::deck::{Deck, DeckValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use uuid::Uuid;

/// Question categories the Planner routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CardInteraction,
    Rules,
    Meta,
    DeckValidation,
}

impl Intent {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card_interaction" => Some(Intent::CardInteraction),
            "rules" => Some(Intent::Rules),
            "meta" => Some(Intent::Meta),
            "deck_validation" => Some(Intent::DeckValidation),
            _ => None,
        }
    }
}

/// Nodes of the multi-agent graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    Planner,
    Cards,
    Rules,
    Meta,
    Deck,
    Interaction,
    Judge,
    Finalizer,
}

impl AgentId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Planner => "planner",
            AgentId::Cards => "cards",
            AgentId::Rules => "rules",
            AgentId::Meta => "meta",
            AgentId::Deck => "deck",
            AgentId::Interaction => "interaction",
            AgentId::Judge => "judge",
            AgentId::Finalizer => "finalizer",
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of evidence specialists contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Cards,
    Rules,
    Meta,
    Deck,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Cards => "cards",
            EvidenceKind::Rules => "rules",
            EvidenceKind::Meta => "meta",
            EvidenceKind::Deck => "deck",
        }
    }

    /// The specialist that can fill in this evidence kind.
    pub fn specialist(&self) -> AgentId {
        match self {
            EvidenceKind::Cards => AgentId::Cards,
            EvidenceKind::Rules => AgentId::Rules,
            EvidenceKind::Meta => AgentId::Meta,
            EvidenceKind::Deck => AgentId::Deck,
        }
    }
}

/// A card's status in a given format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalityStatus {
    Legal,
    Banned,
    Restricted,
    NotLegal,
    Unknown,
}

impl LegalityStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "legal" => LegalityStatus::Legal,
            "banned" => LegalityStatus::Banned,
            "restricted" => LegalityStatus::Restricted,
            "not_legal" => LegalityStatus::NotLegal,
            _ => LegalityStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LegalityStatus::Legal => "legal",
            LegalityStatus::Banned => "banned",
            LegalityStatus::Restricted => "restricted",
            LegalityStatus::NotLegal => "not_legal",
            LegalityStatus::Unknown => "unknown",
        }
    }
}

/// Normalized card data from the card service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CardEvidence {
    pub name: String,
    pub mana_cost: String,
    pub type_line: String,
    pub oracle_text: String,
    pub power: Option<String>,
    pub toughness: Option<String>,
    pub colors: Vec<String>,
    pub color_identity: Vec<String>,
    pub keywords: Vec<String>,
    pub legalities: HashMap<String, LegalityStatus>,
    pub rulings: Vec<String>,
    pub set_code: String,
    pub collector_number: String,
}

impl CardEvidence {
    pub fn legality_in(&self, format: &str) -> LegalityStatus {
        self.legalities
            .get(&format.to_lowercase())
            .copied()
            .unwrap_or(LegalityStatus::Unknown)
    }

    /// Render the card for LLM context. Rulings are capped; the full list
    /// rarely adds signal beyond the first few.
    pub fn to_context_block(&self) -> String {
        let mut block = format!("**{}**\n", self.name);
        block.push_str(&format!("Type: {}\n", self.type_line));
        if !self.mana_cost.is_empty() {
            block.push_str(&format!("Mana Cost: {}\n", self.mana_cost));
        }
        if let (Some(power), Some(toughness)) = (&self.power, &self.toughness) {
            block.push_str(&format!("Power/Toughness: {}/{}\n", power, toughness));
        }
        block.push_str(&format!("Oracle Text: {}\n", self.oracle_text));
        if !self.keywords.is_empty() {
            block.push_str(&format!("Keywords: {}\n", self.keywords.join(", ")));
        }
        if !self.rulings.is_empty() {
            block.push_str("Rulings:\n");
            for (i, ruling) in self.rulings.iter().take(3).enumerate() {
                block.push_str(&format!("  {}. {}\n", i + 1, ruling));
            }
        }
        block
    }
}

/// One retrieved chunk of the Comprehensive Rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvidence {
    /// Dotted numeric identifier, e.g. "601.2a". Stable across releases;
    /// propagates into citations verbatim.
    pub rule_id: String,
    pub text: String,
    /// Combined retrieval relevance in [0, 1].
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaSource {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A metagame snapshot for one format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEvidence {
    pub format: String,
    pub snapshot_date: DateTime<Utc>,
    pub summary: String,
    pub sources: Vec<MetaSource>,
    /// Set when the snapshot came from the cache past its fresh window.
    #[serde(default)]
    pub stale: bool,
}

/// A parsed deck plus its validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckEvidence {
    pub format: String,
    pub deck: Deck,
    pub validation: DeckValidationResult,
}

/// Tagged evidence record. Unknown kinds are unrepresentable by design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Card(CardEvidence),
    Rule(RuleEvidence),
    Meta(MetaEvidence),
    Deck(DeckEvidence),
}

/// A user-visible citation. Card names must exist in card evidence; rule ids
/// must exist in rules evidence. The Judge enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Citation {
    Card { name: String, set_code: String },
    Rule { rule_id: String, text: String },
}

impl Citation {
    pub fn label(&self) -> String {
        match self {
            Citation::Card { name, set_code } if !set_code.is_empty() => {
                format!("{} ({})", name, set_code.to_uppercase())
            }
            Citation::Card { name, .. } => name.clone(),
            Citation::Rule { rule_id, .. } => format!("Rule {}", rule_id),
        }
    }
}

/// Outcome of the Judge's verification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeReport {
    pub grounded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_correction: Option<String>,
    pub issues: Vec<String>,
}

/// Shared state threaded through the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub request_id: Uuid,
    pub user_question: String,
    pub extracted_cards: Vec<String>,
    pub intent: Intent,
    /// Set when the question distinguishes the asker's permanents from an
    /// opponent's. The Judge consults this for controller-logic checks.
    pub controller_sensitive: bool,
    /// Agents still to execute, consumed head-first by the dispatcher.
    pub task_plan: VecDeque<AgentId>,
    /// Evidence per kind; insertion order within a kind is preserved.
    pub context: HashMap<EvidenceKind, Vec<Evidence>>,
    pub citations: Vec<Citation>,
    /// Insertion-ordered set of tools/agents that ran.
    pub tools_used: Vec<String>,
    /// Wall-clock seconds per executed node.
    pub agent_timings: HashMap<String, f64>,
    /// Non-fatal problems accumulated along the way.
    pub issues: Vec<String>,
    /// Evidence kind the Interaction agent declared it needs.
    pub missing_context: Option<EvidenceKind>,
    /// How often each evidence kind has been re-fetched this request.
    pub refetches: HashMap<EvidenceKind, u32>,
    pub draft_answer: String,
    pub judge_report: Option<JudgeReport>,
    /// Set only by the Finalizer.
    pub final_answer: String,
}

impl AgentState {
    pub fn new(question: &str) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_question: question.to_string(),
            extracted_cards: Vec::new(),
            intent: Intent::Rules,
            controller_sensitive: false,
            task_plan: VecDeque::new(),
            context: HashMap::new(),
            citations: Vec::new(),
            tools_used: Vec::new(),
            agent_timings: HashMap::new(),
            issues: Vec::new(),
            missing_context: None,
            refetches: HashMap::new(),
            draft_answer: String::new(),
            judge_report: None,
            final_answer: String::new(),
        }
    }

    pub fn add_evidence(&mut self, kind: EvidenceKind, evidence: Evidence) {
        self.context.entry(kind).or_default().push(evidence);
    }

    pub fn evidence(&self, kind: EvidenceKind) -> &[Evidence] {
        self.context.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn card_evidence(&self) -> Vec<&CardEvidence> {
        self.evidence(EvidenceKind::Cards)
            .iter()
            .filter_map(|e| match e {
                Evidence::Card(card) => Some(card),
                _ => None,
            })
            .collect()
    }

    pub fn rule_evidence(&self) -> Vec<&RuleEvidence> {
        self.evidence(EvidenceKind::Rules)
            .iter()
            .filter_map(|e| match e {
                Evidence::Rule(rule) => Some(rule),
                _ => None,
            })
            .collect()
    }

    pub fn meta_evidence(&self) -> Option<&MetaEvidence> {
        self.evidence(EvidenceKind::Meta).iter().find_map(|e| match e {
            Evidence::Meta(meta) => Some(meta),
            _ => None,
        })
    }

    pub fn deck_evidence(&self) -> Option<&DeckEvidence> {
        self.evidence(EvidenceKind::Deck).iter().find_map(|e| match e {
            Evidence::Deck(deck) => Some(deck),
            _ => None,
        })
    }

    /// Record a citation, deduplicating exact repeats.
    pub fn add_citation(&mut self, citation: Citation) {
        if !self.citations.contains(&citation) {
            self.citations.push(citation);
        }
    }

    /// Track a tool or agent as used, preserving first-use order.
    pub fn mark_tool_used(&mut self, name: &str) {
        if !self.tools_used.iter().any(|t| t == name) {
            self.tools_used.push(name.to_string());
        }
    }

    pub fn add_issue(&mut self, message: impl Into<String>) {
        self.issues.push(message.into());
    }

    /// Whether the given kind may still be re-fetched this request.
    pub fn may_refetch(&self, kind: EvidenceKind) -> bool {
        self.refetches.get(&kind).copied().unwrap_or(0) < crate::config::MISSING_CONTEXT_RETRIES
    }

    pub fn note_refetch(&mut self, kind: EvidenceKind) {
        *self.refetches.entry(kind).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tools_used_is_an_ordered_set() {
        let mut state = AgentState::new("q");
        state.mark_tool_used("planner");
        state.mark_tool_used("lookup_card");
        state.mark_tool_used("planner");
        assert_eq!(state.tools_used, vec!["planner", "lookup_card"]);
    }

    #[test]
    fn test_evidence_order_within_kind() {
        let mut state = AgentState::new("q");
        for id in ["601.2a", "405.1", "704.5g"] {
            state.add_evidence(
                EvidenceKind::Rules,
                Evidence::Rule(RuleEvidence {
                    rule_id: id.to_string(),
                    text: String::new(),
                    score: 1.0,
                }),
            );
        }
        let ids: Vec<_> = state.rule_evidence().iter().map(|r| r.rule_id.clone()).collect();
        assert_eq!(ids, vec!["601.2a", "405.1", "704.5g"]);
    }

    #[test]
    fn test_citation_dedup() {
        let mut state = AgentState::new("q");
        let citation = Citation::Card {
            name: "Lightning Bolt".into(),
            set_code: "lea".into(),
        };
        state.add_citation(citation.clone());
        state.add_citation(citation);
        assert_eq!(state.citations.len(), 1);
    }

    #[test]
    fn test_refetch_budget() {
        let mut state = AgentState::new("q");
        assert!(state.may_refetch(EvidenceKind::Rules));
        state.note_refetch(EvidenceKind::Rules);
        assert!(!state.may_refetch(EvidenceKind::Rules));
        assert!(state.may_refetch(EvidenceKind::Cards));
    }

    #[test]
    fn test_legality_parse() {
        assert_eq!(LegalityStatus::parse("legal"), LegalityStatus::Legal);
        assert_eq!(LegalityStatus::parse("banned"), LegalityStatus::Banned);
        assert_eq!(LegalityStatus::parse("restricted"), LegalityStatus::Restricted);
        assert_eq!(LegalityStatus::parse("not_legal"), LegalityStatus::NotLegal);
        assert_eq!(LegalityStatus::parse("???"), LegalityStatus::Unknown);
    }
}
