// Stack Sage: Configuration
// Environment-driven settings plus the tuning constants shared across the
// retrieval subsystem and the multi-agent graph.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Number of chunks the hybrid retriever returns by default.
pub const RETRIEVAL_K: usize = 8;

/// Weight of the vector score in the hybrid combination; BM25 gets the rest.
pub const HYBRID_VECTOR_WEIGHT: f64 = 0.6;

/// Result count the Rules agent treats as full coverage.
pub const COVERAGE_EXPECTED: usize = 6;

/// Coverage below this marks rules context as missing.
pub const COVERAGE_THRESHOLD: f64 = 0.3;

/// Capacity of the card lookup cache.
pub const CARD_CACHE_CAPACITY: usize = 1000;

/// Capacity of the rules query cache.
pub const QUERY_CACHE_CAPACITY: usize = 100;

/// Meta snapshots younger than this are served as-is.
pub const META_FRESH_TTL_SECS: i64 = 24 * 3600;

/// Meta snapshots older than this force a refetch; in between they are
/// served with a staleness flag.
pub const META_STALE_HORIZON_SECS: i64 = 7 * 24 * 3600;

/// Hard cap on node executions per request.
pub const RECURSION_LIMIT: usize = 15;

/// How often a missing evidence kind may be re-fetched per request.
pub const MISSING_CONTEXT_RETRIES: u32 = 1;

/// Soft timeout for a single agent node.
pub const NODE_TIMEOUT_SECS: u64 = 30;

/// Soft budget for a whole request.
pub const REQUEST_BUDGET_SECS: u64 = 60;

/// Concurrent upstream lookups issued by a single agent.
pub const CARD_FETCH_PARALLELISM: usize = 4;

/// Maximum results returned by a criteria search.
pub const CRITERIA_RESULT_CAP: usize = 10;

/// Temperature for the Planner's JSON extraction call. Deterministic on
/// purpose; the task plan must not vary between runs.
pub const PLANNER_TEMPERATURE: f32 = 0.0;

/// Default temperature for answer drafting.
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.1;

/// Which embedding backend the rules index uses. The choice only affects
/// vector dimensionality; the on-disk index records it and load verifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    /// Hosted OpenAI-compatible embedding endpoint (1536 dimensions).
    Hosted,
    /// Local deterministic sentence embedder (384 dimensions).
    Local,
}

impl EmbeddingMode {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "local" => EmbeddingMode::Local,
            _ => EmbeddingMode::Hosted,
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct SageConfig {
    /// Chat model identifier, e.g. "gpt-4o-mini".
    pub llm_model: String,
    /// Default generation temperature; the Planner overrides this to 0.
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_api_key: Option<String>,
    /// OpenAI-compatible API base, without the trailing path segment.
    pub llm_base_url: String,
    pub embedding_mode: EmbeddingMode,
    pub embedding_model: String,
    /// Credential for the web meta search; absent means the meta tool
    /// reports itself as not configured instead of failing.
    pub meta_search_credential: Option<String>,
    pub verbose: bool,
    pub scryfall_base_url: String,
    /// Where the built rules index lives on disk.
    pub index_path: PathBuf,
}

impl Default for SageConfig {
    fn default() -> Self {
        Self {
            llm_model: "gpt-4o-mini".to_string(),
            llm_temperature: DEFAULT_LLM_TEMPERATURE,
            llm_max_tokens: 2000,
            llm_api_key: None,
            llm_base_url: "https://api.openai.com/v1".to_string(),
            embedding_mode: EmbeddingMode::Hosted,
            embedding_model: "text-embedding-3-small".to_string(),
            meta_search_credential: None,
            verbose: false,
            scryfall_base_url: "https://api.scryfall.com".to_string(),
            index_path: PathBuf::from("data/rules_index.json"),
        }
    }
}

impl SageConfig {
    /// Read configuration from the process environment. Unset variables fall
    /// back to the defaults above.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            llm_model: env::var("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_temperature: env::var("LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.llm_temperature),
            llm_max_tokens: env::var("LLM_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.llm_max_tokens),
            llm_api_key: env::var("OPENAI_API_KEY").ok(),
            llm_base_url: env::var("LLM_BASE_URL").unwrap_or(defaults.llm_base_url),
            embedding_mode: env::var("EMBEDDING_MODE")
                .map(|v| EmbeddingMode::parse(&v))
                .unwrap_or(defaults.embedding_mode),
            embedding_model: env::var("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            meta_search_credential: env::var("META_SEARCH_CREDENTIAL")
                .ok()
                .filter(|v| !v.is_empty()),
            verbose: env::var("VERBOSE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
            scryfall_base_url: env::var("SCRYFALL_BASE_URL").unwrap_or(defaults.scryfall_base_url),
            index_path: env::var("RULES_INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_mode_parse() {
        assert_eq!(EmbeddingMode::parse("local"), EmbeddingMode::Local);
        assert_eq!(EmbeddingMode::parse("LOCAL"), EmbeddingMode::Local);
        assert_eq!(EmbeddingMode::parse("hosted"), EmbeddingMode::Hosted);
        assert_eq!(EmbeddingMode::parse("anything-else"), EmbeddingMode::Hosted);
    }

    #[test]
    fn test_defaults() {
        let config = SageConfig::default();
        assert_eq!(config.llm_model, "gpt-4o-mini");
        assert_eq!(config.llm_temperature, DEFAULT_LLM_TEMPERATURE);
        assert!(config.meta_search_credential.is_none());
    }
}
