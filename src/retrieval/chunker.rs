// Stack Sage: Rules Chunker
// Splits the Comprehensive Rules document along its numbered hierarchy. Each
// chunk is one rule paragraph carrying its dotted identifier.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One indexable chunk of the Comprehensive Rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleChunk {
    /// Dotted numeric identifier: "100", "100.1", "601.2a".
    pub rule_id: String,
    /// Rule text including the identifier prefix.
    pub text: String,
}

static RULE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{3}(?:\.\d+[a-z]?)?)\.?\s+(.+)$").unwrap());

/// Chunk the rules source text. Lines that open a numbered paragraph start a
/// new chunk; continuation lines attach to the current one. Front matter
/// before the first numbered rule is dropped.
pub fn chunk_rules(source: &str) -> Vec<RuleChunk> {
    let mut chunks: Vec<RuleChunk> = Vec::new();
    let mut current: Option<RuleChunk> = None;

    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(captures) = RULE_LINE.captures(trimmed) {
            if let Some(chunk) = current.take() {
                chunks.push(chunk);
            }
            let rule_id = captures[1].to_string();
            current = Some(RuleChunk {
                text: format!("{} {}", rule_id, &captures[2]),
                rule_id,
            });
        } else if let Some(chunk) = current.as_mut() {
            chunk.text.push(' ');
            chunk.text.push_str(trimmed);
        }
    }

    if let Some(chunk) = current {
        chunks.push(chunk);
    }
    chunks
}
