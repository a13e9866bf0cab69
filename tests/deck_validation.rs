// Deck validation against a scripted card source: format sizes, copy
// limits, banned/restricted handling, and commander color identity.

use async_trait::async_trait;
use stack_sage::deck::{parse_decklist, serialize_decklist, Deck, DeckEntry, DeckValidator};
use stack_sage::error::{SageError, SageResult};
use stack_sage::scryfall::{CardSearchFilters, CardSource};
use stack_sage::state::{CardEvidence, LegalityStatus};
use std::collections::HashMap;
use std::sync::Arc;

struct FakeCards {
    cards: HashMap<String, CardEvidence>,
}

impl FakeCards {
    fn new() -> Self {
        let mut cards = HashMap::new();
        for card in [
            card("Lightning Bolt", &["R"], &[("modern", "legal"), ("commander", "legal"), ("vintage", "legal")]),
            card("Mountain", &[], &[("modern", "legal"), ("commander", "legal"), ("vintage", "legal")]),
            card("Island", &[], &[("modern", "legal"), ("commander", "legal"), ("vintage", "legal")]),
            card("Sol Ring", &[], &[("commander", "legal"), ("vintage", "restricted")]),
            card("Urza, Lord High Artificer", &["U"], &[("commander", "legal")]),
            card("Black Lotus", &[], &[("vintage", "restricted"), ("commander", "banned")]),
            card("Counterspell", &["U"], &[("modern", "legal"), ("commander", "legal"), ("vintage", "legal")]),
        ] {
            cards.insert(card.name.to_lowercase(), card);
        }
        Self { cards }
    }
}

fn card(name: &str, identity: &[&str], legalities: &[(&str, &str)]) -> CardEvidence {
    CardEvidence {
        name: name.to_string(),
        color_identity: identity.iter().map(|c| c.to_string()).collect(),
        legalities: legalities
            .iter()
            .map(|(format, status)| (format.to_string(), LegalityStatus::parse(status)))
            .collect(),
        ..Default::default()
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
        Ok(Vec::new())
    }
}

fn validator() -> DeckValidator {
    DeckValidator::new(Arc::new(FakeCards::new()))
}

fn deck(format: &str, mainboard: &[(&str, u32)]) -> Deck {
    Deck {
        format: format.to_string(),
        mainboard: mainboard
            .iter()
            .map(|(name, count)| DeckEntry {
                name: name.to_string(),
                count: *count,
            })
            .collect(),
        sideboard: Vec::new(),
        commander: None,
    }
}

#[tokio::test]
async fn test_modern_copy_limit_violation() {
    let deck = deck("modern", &[("Lightning Bolt", 5), ("Mountain", 55)]);
    let result = validator().validate(&deck).await;

    assert!(!result.is_legal);
    assert_eq!(result.total_cards, 60);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("too many copies of Lightning Bolt (5 > 4)")));
}

#[tokio::test]
async fn test_commander_deck_is_legal() {
    let mut deck = deck("commander", &[("Sol Ring", 1), ("Island", 99)]);
    deck.commander = Some("Urza, Lord High Artificer".to_string());

    let result = validator().validate(&deck).await;
    assert!(result.is_legal, "errors: {:?}", result.errors);
    assert_eq!(result.total_cards, 100);
}

#[tokio::test]
async fn test_commander_requires_commander_and_exact_size() {
    let deck = deck("commander", &[("Island", 99)]);
    let result = validator().validate(&deck).await;

    assert!(!result.is_legal);
    assert!(result.errors.iter().any(|e| e.contains("exactly 100")));
    assert!(result.errors.iter().any(|e| e.contains("commander")));
}

#[tokio::test]
async fn test_commander_color_identity_enforced() {
    let mut deck = deck(
        "commander",
        &[("Lightning Bolt", 1), ("Sol Ring", 1), ("Island", 97)],
    );
    deck.commander = Some("Urza, Lord High Artificer".to_string());

    let result = validator().validate(&deck).await;
    assert!(!result.is_legal);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("Lightning Bolt") && e.contains("color identity")));
}

#[tokio::test]
async fn test_vintage_restricted_counts() {
    // Two copies of a restricted card is an error.
    let two = deck("vintage", &[("Black Lotus", 2), ("Island", 58)]);
    let result = validator().validate(&two).await;
    assert!(!result.is_legal);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("Black Lotus") && e.contains("restricted")));

    // A single copy is only a warning.
    let one = deck("vintage", &[("Black Lotus", 1), ("Island", 59)]);
    let result = validator().validate(&one).await;
    assert!(result.is_legal, "errors: {:?}", result.errors);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("Black Lotus") && w.contains("restricted")));
}

#[tokio::test]
async fn test_banned_card_is_an_error() {
    let mut deck = deck("commander", &[("Black Lotus", 1), ("Island", 98)]);
    deck.commander = Some("Urza, Lord High Artificer".to_string());

    let result = validator().validate(&deck).await;
    assert!(!result.is_legal);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("Black Lotus") && e.contains("banned")));
}

#[tokio::test]
async fn test_unknown_card_is_a_warning() {
    let deck = deck("modern", &[("Totally Made Up Card", 4), ("Mountain", 56)]);
    let result = validator().validate(&deck).await;

    assert!(result.is_legal, "errors: {:?}", result.errors);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("Totally Made Up Card")));
}

#[tokio::test]
async fn test_sideboard_limit() {
    let mut deck = deck("modern", &[("Mountain", 60)]);
    deck.sideboard = vec![DeckEntry {
        name: "Counterspell".to_string(),
        count: 16,
    }];

    let result = validator().validate(&deck).await;
    assert!(!result.is_legal);
    assert!(result.errors.iter().any(|e| e.contains("sideboard")));
}

#[tokio::test]
async fn test_short_deck_is_an_error() {
    let deck = deck("modern", &[("Mountain", 40)]);
    let result = validator().validate(&deck).await;
    assert!(!result.is_legal);
    assert!(result.errors.iter().any(|e| e.contains("at least 60")));
}

#[test]
fn test_decklist_roundtrip() {
    let deck = Deck {
        format: "modern".to_string(),
        mainboard: vec![
            DeckEntry { name: "Lightning Bolt".to_string(), count: 4 },
            DeckEntry { name: "Mountain".to_string(), count: 20 },
        ],
        sideboard: vec![DeckEntry { name: "Counterspell".to_string(), count: 3 }],
        commander: None,
    };

    let (mainboard, sideboard, warnings) = parse_decklist(&serialize_decklist(&deck));
    assert!(warnings.is_empty());
    assert_eq!(mainboard, deck.mainboard);
    assert_eq!(sideboard, deck.sideboard);
}
