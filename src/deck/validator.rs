// Stack Sage: Deck Validator
// Format-rule enforcement over a parsed deck. The validator always returns a
// result; upstream hiccups become warnings, never failures.

use crate::deck::{format_rules, is_basic_land, Deck, DeckValidationResult, CONSTRUCTED_60};
use crate::error::SageError;
use crate::scryfall::{fetch_cards_bounded, CardSource};
use crate::state::{CardEvidence, LegalityStatus};
use std::collections::HashMap;
use std::sync::Arc;

pub struct DeckValidator {
    cards: Arc<dyn CardSource>,
}

impl DeckValidator {
    pub fn new(cards: Arc<dyn CardSource>) -> Self {
        Self { cards }
    }

    pub async fn validate(&self, deck: &Deck) -> DeckValidationResult {
        let format = deck.format.to_lowercase();
        let rules = match format_rules(&format) {
            Some(rules) => rules,
            None => {
                // Unknown format: size and copy limits only; there is no
                // legality map to check against.
                let mut result = DeckValidationResult::new(&format, deck.total_mainboard());
                result.add_warning(format!(
                    "unknown format '{format}', performing basic validation only"
                ));
                if deck.total_mainboard() < CONSTRUCTED_60.min_mainboard {
                    result.add_error(format!(
                        "decks must have at least {} cards (found {})",
                        CONSTRUCTED_60.min_mainboard,
                        deck.total_mainboard()
                    ));
                }
                self.check_copy_limits(deck, &CONSTRUCTED_60, &mut result);
                self.check_sideboard(deck, &CONSTRUCTED_60, &mut result);
                return result;
            }
        };

        // The commander occupies a real deck slot in singleton formats.
        let commander_slot = u32::from(rules.requires_commander && deck.commander.is_some());
        let total = deck.total_mainboard() + commander_slot;
        let mut result = DeckValidationResult::new(rules.name, total);

        if let Some(exact) = rules.max_mainboard {
            if total != exact {
                result.add_error(format!(
                    "{} decks must have exactly {exact} cards (found {total})",
                    rules.name
                ));
            }
        } else if total < rules.min_mainboard {
            result.add_error(format!(
                "{} decks must have at least {} cards (found {total})",
                rules.name, rules.min_mainboard
            ));
        }

        if rules.requires_commander && deck.commander.is_none() {
            result.add_error(format!("{} decks must specify a commander", rules.name));
        }
        if !rules.requires_commander && deck.commander.is_some() {
            result.add_warning(format!("{} does not use a commander slot", rules.name));
        }

        self.validate_with_rules(deck, rules, &mut result).await;
        result
    }

    async fn validate_with_rules(
        &self,
        deck: &Deck,
        rules: &crate::deck::FormatRules,
        result: &mut DeckValidationResult,
    ) {
        self.check_copy_limits(deck, rules, result);
        self.check_sideboard(deck, rules, result);

        let evidence = self.fetch_evidence(deck).await;
        self.check_legality(deck, rules, &evidence, result);
        if rules.enforces_color_identity {
            self.check_color_identity(deck, &evidence, result);
        }
    }

    fn check_copy_limits(
        &self,
        deck: &Deck,
        rules: &crate::deck::FormatRules,
        result: &mut DeckValidationResult,
    ) {
        let mut counts: HashMap<String, (String, u32)> = HashMap::new();
        let mut bump = |name: &str, count: u32| {
            let entry = counts
                .entry(name.to_lowercase())
                .or_insert_with(|| (name.to_string(), 0));
            entry.1 += count;
        };

        for entry in deck.mainboard.iter().chain(deck.sideboard.iter()) {
            if !is_basic_land(&entry.name) {
                bump(&entry.name, entry.count);
            }
        }
        if rules.singleton {
            if let Some(commander) = &deck.commander {
                bump(commander, 1);
            }
        }

        for (name, count) in counts.into_values() {
            if count > rules.max_copies {
                result.add_error(format!(
                    "too many copies of {name} ({count} > {})",
                    rules.max_copies
                ));
            }
        }
    }

    fn check_sideboard(
        &self,
        deck: &Deck,
        rules: &crate::deck::FormatRules,
        result: &mut DeckValidationResult,
    ) {
        let sideboard = deck.total_sideboard();
        if sideboard == 0 {
            return;
        }
        if rules.max_sideboard == 0 {
            result.add_warning(format!("{} does not use sideboards", rules.name));
        } else if sideboard > rules.max_sideboard {
            result.add_error(format!(
                "sideboard has {sideboard} cards, maximum is {}",
                rules.max_sideboard
            ));
        }
    }

    /// Look up every distinct mainboard card plus the commander.
    async fn fetch_evidence(
        &self,
        deck: &Deck,
    ) -> HashMap<String, Result<CardEvidence, SageError>> {
        let mut names: Vec<String> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for entry in &deck.mainboard {
            if seen.insert(entry.name.to_lowercase()) {
                names.push(entry.name.clone());
            }
        }
        if let Some(commander) = &deck.commander {
            if seen.insert(commander.to_lowercase()) {
                names.push(commander.clone());
            }
        }

        fetch_cards_bounded(self.cards.as_ref(), &names)
            .await
            .into_iter()
            .map(|(name, outcome)| (name.to_lowercase(), outcome))
            .collect()
    }

    fn check_legality(
        &self,
        deck: &Deck,
        rules: &crate::deck::FormatRules,
        evidence: &HashMap<String, Result<CardEvidence, SageError>>,
        result: &mut DeckValidationResult,
    ) {
        let mut checked = std::collections::HashSet::new();
        for entry in &deck.mainboard {
            if !checked.insert(entry.name.to_lowercase()) {
                continue;
            }
            let count = deck.card_count(&entry.name);

            match evidence.get(&entry.name.to_lowercase()) {
                Some(Ok(card)) => match card.legality_in(rules.name) {
                    LegalityStatus::Banned => {
                        result.add_error(format!("{} is banned in {}", card.name, rules.name));
                    }
                    LegalityStatus::Restricted => {
                        if count > 1 {
                            result.add_error(format!(
                                "{} is restricted in {} (limit 1, found {count})",
                                card.name, rules.name
                            ));
                        } else {
                            result.add_warning(format!(
                                "{} is restricted in {} (limited to 1 copy)",
                                card.name, rules.name
                            ));
                        }
                    }
                    LegalityStatus::NotLegal => {
                        result.add_error(format!("{} is not legal in {}", card.name, rules.name));
                    }
                    LegalityStatus::Legal => {}
                    LegalityStatus::Unknown => {
                        result.add_warning(format!(
                            "legality of {} in {} is unknown",
                            card.name, rules.name
                        ));
                    }
                },
                Some(Err(SageError::NotFound(_))) => {
                    result.add_warning(format!(
                        "could not find card '{}', cannot validate legality",
                        entry.name
                    ));
                }
                Some(Err(err)) => {
                    result.add_warning(format!(
                        "card service unavailable for '{}': {err}",
                        entry.name
                    ));
                }
                None => {}
            }
        }
    }

    fn check_color_identity(
        &self,
        deck: &Deck,
        evidence: &HashMap<String, Result<CardEvidence, SageError>>,
        result: &mut DeckValidationResult,
    ) {
        let Some(commander_name) = &deck.commander else {
            return;
        };
        let commander_identity = match evidence.get(&commander_name.to_lowercase()) {
            Some(Ok(card)) => card
                .color_identity
                .iter()
                .map(|c| c.to_uppercase())
                .collect::<std::collections::HashSet<_>>(),
            _ => {
                result.add_warning(format!(
                    "could not fetch commander '{commander_name}', color identity not verified"
                ));
                return;
            }
        };

        let mut flagged = std::collections::HashSet::new();
        for entry in &deck.mainboard {
            if !flagged.insert(entry.name.to_lowercase()) {
                continue;
            }
            if let Some(Ok(card)) = evidence.get(&entry.name.to_lowercase()) {
                let outside: Vec<&String> = card
                    .color_identity
                    .iter()
                    .filter(|c| !commander_identity.contains(&c.to_uppercase()))
                    .collect();
                if !outside.is_empty() {
                    result.add_error(format!(
                        "{} is outside the commander's color identity",
                        card.name
                    ));
                }
            }
        }
    }
}
