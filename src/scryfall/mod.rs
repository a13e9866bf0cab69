// Stack Sage: Card Source Adapter
// Live card lookup against the Scryfall API, with fuzzy name matching and a
// bounded LRU cache in front of it.

use crate::cache::LruCache;
use crate::config::{CARD_CACHE_CAPACITY, CRITERIA_RESULT_CAP};
use crate::error::{SageError, SageResult};
use crate::state::{CardEvidence, LegalityStatus};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Recognized attribute filters for a criteria search. At least one filter
/// must be non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardSearchFilters {
    /// Color letters, e.g. "r" or "ur".
    #[serde(default)]
    pub colors: String,
    /// Mana value, either a number or a comparison like "<=2".
    #[serde(default)]
    pub mana_value: String,
    #[serde(default)]
    pub power: String,
    #[serde(default)]
    pub toughness: String,
    #[serde(default)]
    pub format_legal: String,
    #[serde(default)]
    pub card_type: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rarity: String,
}

impl CardSearchFilters {
    pub fn is_empty(&self) -> bool {
        [
            &self.colors,
            &self.mana_value,
            &self.power,
            &self.toughness,
            &self.format_legal,
            &self.card_type,
            &self.keywords,
            &self.text,
            &self.rarity,
        ]
        .iter()
        .all(|f| f.trim().is_empty())
    }

    /// Build the upstream search expression.
    pub fn to_search_query(&self) -> String {
        fn comparison(field: &str, value: &str) -> String {
            if value.contains(|c| matches!(c, '<' | '>' | '=')) {
                format!("{field}{value}")
            } else {
                format!("{field}={value}")
            }
        }

        let mut parts = Vec::new();
        if !self.colors.trim().is_empty() {
            parts.push(format!("c:{}", self.colors.trim()));
        }
        if !self.mana_value.trim().is_empty() {
            parts.push(comparison("mv", self.mana_value.trim()));
        }
        if !self.power.trim().is_empty() {
            parts.push(comparison("pow", self.power.trim()));
        }
        if !self.toughness.trim().is_empty() {
            parts.push(comparison("tou", self.toughness.trim()));
        }
        if !self.format_legal.trim().is_empty() {
            parts.push(format!("f:{}", self.format_legal.trim().to_lowercase()));
        }
        if !self.card_type.trim().is_empty() {
            parts.push(format!("t:{}", self.card_type.trim()));
        }
        if !self.keywords.trim().is_empty() {
            parts.push(format!("o:{}", self.keywords.trim()));
        }
        if !self.text.trim().is_empty() {
            parts.push(format!("o:\"{}\"", self.text.trim()));
        }
        if !self.rarity.trim().is_empty() {
            parts.push(format!("r:{}", self.rarity.trim()));
        }
        parts.join(" ")
    }
}

/// Live card lookup. Production talks to Scryfall; tests substitute fakes.
#[async_trait]
pub trait CardSource: Send + Sync {
    /// Fuzzy lookup by name. `NotFound` for unknown names,
    /// `UpstreamUnavailable` for transient failures. Ambiguous fuzzy matches
    /// resolve to whatever best match the service reports.
    async fn fetch_card(&self, name: &str) -> SageResult<CardEvidence>;

    /// Attribute search ordered by popularity, capped at ten results.
    /// Never cached; the query space is open-ended.
    async fn search_by_criteria(&self, filters: &CardSearchFilters) -> SageResult<Vec<CardEvidence>>;
}

/// Direct Scryfall client.
pub struct ScryfallClient {
    client: reqwest::Client,
    base_url: String,
}

impl ScryfallClient {
    pub fn new(base_url: &str) -> SageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("stack-sage/0.1 (MTG rules assistant)")
            .build()
            .map_err(|e| SageError::UpstreamUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Best-effort rulings fetch; failures degrade to an empty list.
    async fn fetch_rulings(&self, card_id: &str) -> Vec<String> {
        if card_id.is_empty() {
            return Vec::new();
        }
        let url = format!("{}/cards/{}/rulings", self.base_url, card_id);
        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                log::debug!("rulings fetch for {card_id} returned {}", r.status());
                return Vec::new();
            }
            Err(e) => {
                log::debug!("rulings fetch for {card_id} failed: {e}");
                return Vec::new();
            }
        };
        let payload: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };
        payload["data"]
            .as_array()
            .map(|rulings| {
                rulings
                    .iter()
                    .filter_map(|r| r["comment"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn string_list(value: &serde_json::Value) -> Vec<String> {
        value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Normalize a raw card payload into the evidence shape. Double-faced
    /// cards collapse their faces into a single oracle text.
    fn card_from_json(data: &serde_json::Value) -> CardEvidence {
        let oracle_text = match data["oracle_text"].as_str() {
            Some(text) => text.to_string(),
            None => data["card_faces"]
                .as_array()
                .map(|faces| {
                    faces
                        .iter()
                        .filter_map(|f| f["oracle_text"].as_str())
                        .collect::<Vec<_>>()
                        .join("\n//\n")
                })
                .unwrap_or_default(),
        };

        let legalities: HashMap<String, LegalityStatus> = data["legalities"]
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(format, status)| {
                        (
                            format.clone(),
                            LegalityStatus::parse(status.as_str().unwrap_or("")),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        CardEvidence {
            name: data["name"].as_str().unwrap_or_default().to_string(),
            mana_cost: data["mana_cost"].as_str().unwrap_or_default().to_string(),
            type_line: data["type_line"].as_str().unwrap_or_default().to_string(),
            oracle_text,
            power: data["power"].as_str().map(str::to_string),
            toughness: data["toughness"].as_str().map(str::to_string),
            colors: Self::string_list(&data["colors"]),
            color_identity: Self::string_list(&data["color_identity"]),
            keywords: Self::string_list(&data["keywords"]),
            legalities,
            rulings: Vec::new(),
            set_code: data["set"].as_str().unwrap_or_default().to_string(),
            collector_number: data["collector_number"].as_str().unwrap_or_default().to_string(),
        }
    }
}

#[async_trait]
impl CardSource for ScryfallClient {
    async fn fetch_card(&self, name: &str) -> SageResult<CardEvidence> {
        let url = format!("{}/cards/named", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("fuzzy", name)])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(SageError::NotFound(format!("card '{name}'")));
        }
        if !status.is_success() {
            return Err(SageError::UpstreamUnavailable(format!(
                "card service returned {status} for '{name}'"
            )));
        }

        let data: serde_json::Value = response.json().await?;
        let mut card = Self::card_from_json(&data);
        card.rulings = self
            .fetch_rulings(data["id"].as_str().unwrap_or_default())
            .await;
        Ok(card)
    }

    async fn search_by_criteria(&self, filters: &CardSearchFilters) -> SageResult<Vec<CardEvidence>> {
        if filters.is_empty() {
            return Err(SageError::InvalidQuery(
                "at least one search criterion is required".into(),
            ));
        }

        let url = format!("{}/cards/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", filters.to_search_query().as_str()),
                ("order", "edhrec"),
                ("unique", "cards"),
                ("dir", "desc"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            // Scryfall reports an empty result set as 404.
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(SageError::UpstreamUnavailable(format!(
                "card search returned {status}"
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        let cards = payload["data"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .take(CRITERIA_RESULT_CAP)
                    .map(Self::card_from_json)
                    .collect()
            })
            .unwrap_or_default();
        Ok(cards)
    }
}

/// Case-folded LRU in front of any card source. Name lookups hit the cache;
/// criteria searches pass through untouched.
pub struct CachedCardSource<S> {
    inner: S,
    cache: LruCache<String, CardEvidence>,
}

impl<S: CardSource> CachedCardSource<S> {
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, CARD_CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            cache: LruCache::new(capacity),
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl<S: CardSource> CardSource for CachedCardSource<S> {
    async fn fetch_card(&self, name: &str) -> SageResult<CardEvidence> {
        let key = name.trim().to_lowercase();
        if let Some(card) = self.cache.get(&key) {
            log::debug!("card cache hit for '{key}'");
            return Ok(card);
        }

        let card = self.inner.fetch_card(name).await?;
        // Index under both the requested and the canonical name so a fuzzy
        // lookup and an exact one share the entry.
        let canonical = card.name.to_lowercase();
        if canonical != key {
            self.cache.insert(canonical, card.clone());
        }
        self.cache.insert(key, card.clone());
        Ok(card)
    }

    async fn search_by_criteria(&self, filters: &CardSearchFilters) -> SageResult<Vec<CardEvidence>> {
        self.inner.search_by_criteria(filters).await
    }
}

/// Fetch several cards concurrently in waves, preserving request order.
/// The wave size bounds how many upstream requests are in flight at once.
pub async fn fetch_cards_bounded(
    source: &dyn CardSource,
    names: &[String],
) -> Vec<(String, SageResult<CardEvidence>)> {
    let mut results = Vec::with_capacity(names.len());
    for wave in names.chunks(crate::config::CARD_FETCH_PARALLELISM) {
        let futures: Vec<_> = wave
            .iter()
            .map(|name| async move { (name.clone(), source.fetch_card(name).await) })
            .collect();
        results.extend(futures::future::join_all(futures).await);
    }
    results
}

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)""#).unwrap());
static CAPITALIZED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z][a-z]+(?:\s+(?:of|the|in|from|to|with|and|or)?\s*[A-Z][a-z]+)+\b").unwrap()
});

/// Conservative card-name extraction used when the Planner produced none.
/// Quoted strings are taken as-is; capitalized multi-word runs are candidates
/// minus a short list of known game terms.
pub fn extract_card_names(query: &str) -> Vec<String> {
    let false_positives = [
        "Magic The Gathering",
        "The Stack",
        "The Battlefield",
        "Comprehensive Rules",
        "Stack Sage",
    ];

    let mut names: Vec<String> = Vec::new();
    for capture in QUOTED.captures_iter(query) {
        names.push(capture[1].to_string());
    }
    for m in CAPITALIZED.find_iter(query) {
        let candidate = m.as_str().to_string();
        if !false_positives.contains(&candidate.as_str()) {
            names.push(candidate);
        }
    }

    // Dedupe case-insensitively, keeping first-seen order.
    let mut seen = std::collections::HashSet::new();
    names.retain(|name| seen.insert(name.to_lowercase()));
    names
}
