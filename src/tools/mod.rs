// Stack Sage: Tool Surface
// Pure operations the agents invoke. Tools read shared components and return
// values; they never touch the agent state themselves. The registry receives
// its components by injection so tests can substitute fakes.

pub mod meta_search;

pub use meta_search::{MetaSearcher, TavilySearcher};

use crate::config::RETRIEVAL_K;
use crate::error::{SageError, SageResult};
use crate::retrieval::HybridRetriever;
use crate::scryfall::{fetch_cards_bounded, CardSearchFilters, CardSource};
use crate::state::{CardEvidence, LegalityStatus, MetaEvidence, RuleEvidence};
use std::sync::Arc;

/// Two rule topics retrieved side by side, plus a joint query over both.
#[derive(Debug, Clone)]
pub struct CrossReference {
    pub topic_a: Vec<RuleEvidence>,
    pub topic_b: Vec<RuleEvidence>,
    pub joint: Vec<RuleEvidence>,
}

/// The tools available to agents, bound to their backing components.
pub struct ToolRegistry {
    cards: Arc<dyn CardSource>,
    retriever: Option<Arc<HybridRetriever>>,
    meta: Arc<dyn MetaSearcher>,
}

impl ToolRegistry {
    pub fn new(
        cards: Arc<dyn CardSource>,
        retriever: Option<Arc<HybridRetriever>>,
        meta: Arc<dyn MetaSearcher>,
    ) -> Self {
        Self {
            cards,
            retriever,
            meta,
        }
    }

    fn retriever(&self) -> SageResult<&HybridRetriever> {
        self.retriever
            .as_deref()
            .ok_or_else(|| SageError::IndexUnavailable("rules index has not been built".into()))
    }

    pub fn has_rules_index(&self) -> bool {
        self.retriever.is_some()
    }

    /// Shared card source handle, for collaborators that manage their own
    /// fetch patterns (the deck validator).
    pub fn card_source(&self) -> Arc<dyn CardSource> {
        self.cards.clone()
    }

    /// Look up a single card by (fuzzy) name.
    pub async fn lookup_card(&self, name: &str) -> SageResult<CardEvidence> {
        self.cards.fetch_card(name).await
    }

    /// Fetch several cards for comparison, preserving input order. Each slot
    /// carries its own outcome so one miss does not sink the rest.
    pub async fn compare_multiple_cards(
        &self,
        names: &[String],
    ) -> Vec<(String, SageResult<CardEvidence>)> {
        fetch_cards_bounded(self.cards.as_ref(), names).await
    }

    /// A card's status in one format.
    pub async fn check_format_legality(
        &self,
        name: &str,
        format: &str,
    ) -> SageResult<LegalityStatus> {
        let card = self.cards.fetch_card(name).await?;
        Ok(card.legality_in(format))
    }

    /// Attribute search against the card service. Rejects an empty filter
    /// set before it reaches the wire.
    pub async fn search_cards_by_criteria(
        &self,
        filters: &CardSearchFilters,
    ) -> SageResult<Vec<CardEvidence>> {
        if filters.is_empty() {
            return Err(SageError::InvalidQuery(
                "at least one search criterion is required".into(),
            ));
        }
        self.cards.search_by_criteria(filters).await
    }

    /// Dense retrieval only.
    pub async fn search_rules(&self, query: &str, k: usize) -> SageResult<Vec<RuleEvidence>> {
        self.retriever()?.retrieve_vector(query, k).await
    }

    /// Keyword retrieval only.
    pub fn search_rules_bm25(&self, query: &str, k: usize) -> SageResult<Vec<RuleEvidence>> {
        Ok(self.retriever()?.retrieve_bm25(query, k))
    }

    /// Hybrid retrieval; the default for rules questions.
    pub async fn search_rules_hybrid(
        &self,
        query: &str,
        k: usize,
        min_score: f64,
    ) -> SageResult<Vec<RuleEvidence>> {
        self.retriever()?.retrieve(query, k, min_score).await
    }

    /// Web metagame search. `ToolMisconfigured` when no credential is set.
    pub async fn search_mtg_meta(
        &self,
        query: &str,
        max_results: usize,
    ) -> SageResult<MetaEvidence> {
        self.meta.search(query, max_results).await
    }

    /// Retrieve two rule topics and a joint query over both, for questions
    /// about how two mechanics interact.
    pub async fn cross_reference_rules(
        &self,
        topic_a: &str,
        topic_b: &str,
    ) -> SageResult<CrossReference> {
        let retriever = self.retriever()?;
        let a = retriever.retrieve(topic_a, RETRIEVAL_K, 0.0).await?;
        let b = retriever.retrieve(topic_b, RETRIEVAL_K, 0.0).await?;
        let joint = retriever
            .retrieve(&format!("{topic_a} and {topic_b} interaction"), RETRIEVAL_K, 0.0)
            .await?;
        Ok(CrossReference {
            topic_a: a,
            topic_b: b,
            joint,
        })
    }
}
