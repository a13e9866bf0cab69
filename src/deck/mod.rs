// Stack Sage: Deck Models
// Decklist parsing, serialization, and the per-format rule catalog.

pub mod validator;

pub use validator::DeckValidator;

use serde::{Deserialize, Serialize};

/// A named card with a copy count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckEntry {
    pub name: String,
    pub count: u32,
}

/// A Magic: The Gathering deck.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Deck {
    pub format: String,
    pub mainboard: Vec<DeckEntry>,
    pub sideboard: Vec<DeckEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commander: Option<String>,
}

impl Deck {
    pub fn total_mainboard(&self) -> u32 {
        self.mainboard.iter().map(|e| e.count).sum()
    }

    pub fn total_sideboard(&self) -> u32 {
        self.sideboard.iter().map(|e| e.count).sum()
    }

    /// Copies of a card across mainboard and sideboard, case-insensitive.
    pub fn card_count(&self, name: &str) -> u32 {
        let needle = name.to_lowercase();
        self.mainboard
            .iter()
            .chain(self.sideboard.iter())
            .filter(|e| e.name.to_lowercase() == needle)
            .map(|e| e.count)
            .sum()
    }
}

/// Validation outcome. The validator never fails; problems land in `errors`
/// and `warnings`, and `is_legal` reflects the absence of errors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeckValidationResult {
    pub is_legal: bool,
    pub format: String,
    pub total_cards: u32,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl DeckValidationResult {
    pub fn new(format: &str, total_cards: u32) -> Self {
        Self {
            is_legal: true,
            format: format.to_string(),
            total_cards,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.is_legal = false;
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Deck-construction rules for one format.
#[derive(Debug, Clone, Copy)]
pub struct FormatRules {
    pub name: &'static str,
    pub min_mainboard: u32,
    /// Exact-size formats set this equal to the minimum.
    pub max_mainboard: Option<u32>,
    /// Copy limit for non-basic cards.
    pub max_copies: u32,
    pub singleton: bool,
    pub requires_commander: bool,
    pub enforces_color_identity: bool,
    pub max_sideboard: u32,
}

pub(crate) const CONSTRUCTED_60: FormatRules = FormatRules {
    name: "",
    min_mainboard: 60,
    max_mainboard: None,
    max_copies: 4,
    singleton: false,
    requires_commander: false,
    enforces_color_identity: false,
    max_sideboard: 15,
};

static FORMATS: &[FormatRules] = &[
    FormatRules { name: "standard", ..CONSTRUCTED_60 },
    FormatRules { name: "modern", ..CONSTRUCTED_60 },
    FormatRules { name: "pioneer", ..CONSTRUCTED_60 },
    FormatRules { name: "legacy", ..CONSTRUCTED_60 },
    FormatRules { name: "vintage", ..CONSTRUCTED_60 },
    FormatRules { name: "pauper", ..CONSTRUCTED_60 },
    FormatRules {
        name: "commander",
        min_mainboard: 100,
        max_mainboard: Some(100),
        max_copies: 1,
        singleton: true,
        requires_commander: true,
        enforces_color_identity: true,
        max_sideboard: 0,
    },
    FormatRules {
        name: "brawl",
        min_mainboard: 60,
        max_mainboard: Some(60),
        max_copies: 1,
        singleton: true,
        requires_commander: true,
        enforces_color_identity: true,
        max_sideboard: 0,
    },
];

/// Look up the rule set for a format. "edh" is an alias for commander.
pub fn format_rules(format: &str) -> Option<&'static FormatRules> {
    let normalized = match format.to_lowercase().as_str() {
        "edh" | "cedh" => "commander".to_string(),
        other => other.to_string(),
    };
    FORMATS.iter().find(|f| f.name == normalized)
}

/// Detect a format mention in free text.
pub fn detect_format(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    for rules in FORMATS {
        if lowered.contains(rules.name) {
            return Some(rules.name);
        }
    }
    if lowered.contains("edh") || lowered.contains("cedh") {
        return Some("commander");
    }
    None
}

static BASIC_LANDS: &[&str] = &[
    "plains",
    "island",
    "swamp",
    "mountain",
    "forest",
    "wastes",
    "snow-covered plains",
    "snow-covered island",
    "snow-covered swamp",
    "snow-covered mountain",
    "snow-covered forest",
    "snow-covered wastes",
];

/// Basic lands are exempt from copy limits in every format.
pub fn is_basic_land(name: &str) -> bool {
    BASIC_LANDS.contains(&name.to_lowercase().as_str())
}

/// Parse a decklist. Lines are `<count> <name>`, optionally prefixed with
/// `SB:` for sideboard entries; a bare `Sideboard` header switches every
/// following line to the sideboard. Blank lines and `#`/`//` comments are
/// skipped; anything else produces a warning.
pub fn parse_decklist(text: &str) -> (Vec<DeckEntry>, Vec<DeckEntry>, Vec<String>) {
    let mut mainboard: Vec<DeckEntry> = Vec::new();
    let mut sideboard: Vec<DeckEntry> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut in_sideboard = false;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        if line.eq_ignore_ascii_case("sideboard") || line.eq_ignore_ascii_case("sideboard:") {
            in_sideboard = true;
            continue;
        }

        let (target_is_sideboard, card_line) = match line
            .strip_prefix("SB:")
            .or_else(|| line.strip_prefix("sb:"))
        {
            Some(rest) => (true, rest.trim()),
            None => (in_sideboard, line),
        };

        match parse_card_line(card_line) {
            Some(entry) => {
                if target_is_sideboard {
                    sideboard.push(entry);
                } else {
                    mainboard.push(entry);
                }
            }
            None => warnings.push(format!("could not parse decklist line: '{line}'")),
        }
    }

    (mainboard, sideboard, warnings)
}

fn parse_card_line(line: &str) -> Option<DeckEntry> {
    let mut parts = line.splitn(2, char::is_whitespace);
    let first = parts.next()?;
    let count: u32 = first.trim_end_matches('x').parse().ok()?;
    let name = parts.next()?.trim();
    if count == 0 || name.is_empty() {
        return None;
    }
    Some(DeckEntry {
        name: name.to_string(),
        count,
    })
}

/// Render a deck back into decklist text. Inverse of `parse_decklist` for
/// any valid deck.
pub fn serialize_decklist(deck: &Deck) -> String {
    let mut out = String::new();
    for entry in &deck.mainboard {
        out.push_str(&format!("{} {}\n", entry.count, entry.name));
    }
    for entry in &deck.sideboard {
        out.push_str(&format!("SB: {} {}\n", entry.count, entry.name));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_decklist() {
        let (mainboard, sideboard, warnings) =
            parse_decklist("4 Lightning Bolt\n20 Mountain\n\n# burn\nSB: 2 Smash to Smithereens\n");
        assert_eq!(mainboard.len(), 2);
        assert_eq!(mainboard[0], DeckEntry { name: "Lightning Bolt".into(), count: 4 });
        assert_eq!(sideboard, vec![DeckEntry { name: "Smash to Smithereens".into(), count: 2 }]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_sideboard_header() {
        let (mainboard, sideboard, _) = parse_decklist("4 Ponder\nSideboard\n3 Flusterstorm");
        assert_eq!(mainboard.len(), 1);
        assert_eq!(sideboard.len(), 1);
        assert_eq!(sideboard[0].name, "Flusterstorm");
    }

    #[test]
    fn test_invalid_lines_warn() {
        let (mainboard, _, warnings) = parse_decklist("4 Lightning Bolt\nnot a card line");
        assert_eq!(mainboard.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("not a card line"));
    }

    #[test]
    fn test_parse_serialize_roundtrip() {
        let deck = Deck {
            format: "modern".into(),
            mainboard: vec![
                DeckEntry { name: "Lightning Bolt".into(), count: 4 },
                DeckEntry { name: "Mountain".into(), count: 20 },
            ],
            sideboard: vec![DeckEntry { name: "Blood Moon".into(), count: 2 }],
            commander: None,
        };

        let (mainboard, sideboard, warnings) = parse_decklist(&serialize_decklist(&deck));
        assert!(warnings.is_empty());
        assert_eq!(mainboard, deck.mainboard);
        assert_eq!(sideboard, deck.sideboard);
    }

    #[test]
    fn test_format_catalog() {
        let commander = format_rules("Commander").unwrap();
        assert!(commander.singleton);
        assert_eq!(commander.max_mainboard, Some(100));
        assert_eq!(commander.max_sideboard, 0);

        let modern = format_rules("modern").unwrap();
        assert_eq!(modern.max_copies, 4);
        assert!(modern.max_mainboard.is_none());

        assert!(format_rules("edh").unwrap().singleton);
        assert!(format_rules("penny-dreadful").is_none());
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("what wins in Modern right now?"), Some("modern"));
        assert_eq!(detect_format("best cEDH staples"), Some("commander"));
        assert_eq!(detect_format("what should I play?"), None);
    }

    #[test]
    fn test_basic_land_exemption_list() {
        assert!(is_basic_land("Mountain"));
        assert!(is_basic_land("Snow-Covered Island"));
        assert!(!is_basic_land("Steam Vents"));
    }
}
