// The tool surface against scripted components: legality checks, aligned
// comparisons, criteria validation, and rules-index degradation.

use async_trait::async_trait;
use stack_sage::error::{SageError, SageResult};
use stack_sage::retrieval::{chunk_rules, HybridRetriever, LocalHashEmbedder, VectorIndex};
use stack_sage::scryfall::{CardSearchFilters, CardSource};
use stack_sage::state::{CardEvidence, LegalityStatus, MetaEvidence};
use stack_sage::tools::{MetaSearcher, ToolRegistry};
use std::collections::HashMap;
use std::sync::Arc;

const RULES_SOURCE: &str = "\
603.1. Triggered abilities begin with the word when, whenever, or at.

614.1. Some continuous effects are replacement effects.

614.6. A replacement effect replaces the event entirely.
";

struct FakeCards {
    cards: HashMap<String, CardEvidence>,
}

impl FakeCards {
    fn new() -> Self {
        let mut cards = HashMap::new();
        cards.insert(
            "black lotus".to_string(),
            CardEvidence {
                name: "Black Lotus".to_string(),
                legalities: [
                    ("commander".to_string(), LegalityStatus::Banned),
                    ("vintage".to_string(), LegalityStatus::Restricted),
                ]
                .into_iter()
                .collect(),
                ..Default::default()
            },
        );
        cards.insert(
            "lightning bolt".to_string(),
            CardEvidence {
                name: "Lightning Bolt".to_string(),
                legalities: [("modern".to_string(), LegalityStatus::Legal)]
                    .into_iter()
                    .collect(),
                ..Default::default()
            },
        );
        Self { cards }
    }
}

#[async_trait]
impl CardSource for FakeCards {
    async fn fetch_card(&self, name: &str) -> SageResult<CardEvidence> {
        self.cards
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| SageError::NotFound(format!("card '{name}'")))
    }

    async fn search_by_criteria(
        &self,
        _filters: &CardSearchFilters,
    ) -> SageResult<Vec<CardEvidence>> {
        Ok(vec![self.cards["lightning bolt"].clone()])
    }
}

struct NoMeta;

#[async_trait]
impl MetaSearcher for NoMeta {
    async fn search(&self, _query: &str, _max: usize) -> SageResult<MetaEvidence> {
        Err(SageError::ToolMisconfigured("no credential".into()))
    }
}

async fn registry_with_index() -> ToolRegistry {
    let chunks = chunk_rules(RULES_SOURCE);
    let index = VectorIndex::build(chunks, &LocalHashEmbedder, "test".to_string())
        .await
        .unwrap();
    let retriever = Arc::new(HybridRetriever::new(index, Arc::new(LocalHashEmbedder)));
    ToolRegistry::new(Arc::new(FakeCards::new()), Some(retriever), Arc::new(NoMeta))
}

fn registry_without_index() -> ToolRegistry {
    ToolRegistry::new(Arc::new(FakeCards::new()), None, Arc::new(NoMeta))
}

#[tokio::test]
async fn test_format_legality() {
    let registry = registry_with_index().await;

    let status = registry
        .check_format_legality("Black Lotus", "commander")
        .await
        .unwrap();
    assert_eq!(status, LegalityStatus::Banned);

    let status = registry
        .check_format_legality("Black Lotus", "standard")
        .await
        .unwrap();
    assert_eq!(status, LegalityStatus::Unknown);

    let err = registry
        .check_format_legality("No Such Card", "modern")
        .await
        .unwrap_err();
    assert!(matches!(err, SageError::NotFound(_)));
}

#[tokio::test]
async fn test_compare_cards_preserves_order_and_misses() {
    let registry = registry_with_index().await;
    let names = vec![
        "Lightning Bolt".to_string(),
        "No Such Card".to_string(),
        "Black Lotus".to_string(),
    ];

    let results = registry.compare_multiple_cards(&names).await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].0, "Lightning Bolt");
    assert!(results[0].1.is_ok());
    assert!(matches!(results[1].1, Err(SageError::NotFound(_))));
    assert_eq!(results[2].1.as_ref().unwrap().name, "Black Lotus");
}

#[tokio::test]
async fn test_empty_criteria_rejected() {
    let registry = registry_with_index().await;
    let err = registry
        .search_cards_by_criteria(&CardSearchFilters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SageError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_rules_search_modes() {
    let registry = registry_with_index().await;

    let hybrid = registry
        .search_rules_hybrid("replacement effects", 3, 0.0)
        .await
        .unwrap();
    assert!(hybrid.iter().any(|r| r.rule_id.starts_with("614")));

    let bm25 = registry.search_rules_bm25("triggered abilities", 3).unwrap();
    assert!(bm25.iter().any(|r| r.rule_id == "603.1"));

    let vector = registry.search_rules("replacement effects", 3).await.unwrap();
    assert!(!vector.is_empty());
}

#[tokio::test]
async fn test_cross_reference_runs_three_searches() {
    let registry = registry_with_index().await;
    let result = registry
        .cross_reference_rules("triggered abilities", "replacement effects")
        .await
        .unwrap();
    assert!(!result.topic_a.is_empty());
    assert!(!result.topic_b.is_empty());
    assert!(!result.joint.is_empty());
}

#[tokio::test]
async fn test_missing_index_degrades_to_error() {
    let registry = registry_without_index();
    assert!(!registry.has_rules_index());

    let err = registry
        .search_rules_hybrid("anything", 3, 0.0)
        .await
        .unwrap_err();
    assert!(matches!(err, SageError::IndexUnavailable(_)));

    let err = registry.search_rules_bm25("anything", 3).unwrap_err();
    assert!(matches!(err, SageError::IndexUnavailable(_)));
}

#[tokio::test]
async fn test_meta_tool_reports_misconfiguration() {
    let registry = registry_with_index().await;
    let err = registry.search_mtg_meta("best decks", 5).await.unwrap_err();
    assert!(matches!(err, SageError::ToolMisconfigured(_)));
}
