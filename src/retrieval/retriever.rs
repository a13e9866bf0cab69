// Stack Sage: Hybrid Retriever
// Dense and keyword retrieval fused into one ranking, with a small LRU cache
// keyed by the normalized query.

use crate::cache::LruCache;
use crate::config::{HYBRID_VECTOR_WEIGHT, QUERY_CACHE_CAPACITY};
use crate::error::{SageError, SageResult};
use crate::retrieval::bm25::Bm25Index;
use crate::retrieval::chunker::{chunk_rules, RuleChunk};
use crate::retrieval::embedding::Embedder;
use crate::retrieval::vector_store::{normalize, source_fingerprint, IndexMetadata, VectorIndex};
use crate::state::RuleEvidence;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Synonyms and rule numbers appended to queries that mention well-known
/// concepts. Keyword search benefits the most; the list mirrors the section
/// numbering of the Comprehensive Rules.
static QUERY_EXPANSIONS: &[(&str, &str)] = &[
    ("stack", "405 resolve resolution last in first out"),
    ("priority", "117 passing priority holding priority"),
    ("state-based action", "704 state based check"),
    ("combat", "506 507 508 509 510 declare attackers blockers combat damage"),
    ("mana", "106 mana pool mana ability mana cost"),
    ("triggered ability", "603 trigger when whenever at"),
    ("activated ability", "602 activation cost colon"),
    ("static ability", "604 continuous effect"),
    ("replacement effect", "614 instead enters"),
    ("phase", "500 beginning precombat combat postcombat ending"),
    ("damage", "120 deal damage prevent"),
    ("counter", "122 countering loyalty"),
];

static RULE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}(?:\.\d+[a-z]?)?\b").unwrap());

/// Vector + BM25 retrieval over the rules index.
pub struct HybridRetriever {
    index: VectorIndex,
    bm25: Bm25Index,
    embedder: Arc<dyn Embedder>,
    query_cache: LruCache<(String, usize), Vec<RuleEvidence>>,
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever").finish()
    }
}

impl HybridRetriever {
    /// The keyword index is rebuilt from the persisted chunks; only the
    /// dense half is stored on disk.
    pub fn new(index: VectorIndex, embedder: Arc<dyn Embedder>) -> Self {
        let bm25 = Bm25Index::new(index.chunks());
        Self {
            index,
            bm25,
            embedder,
            query_cache: LruCache::new(QUERY_CACHE_CAPACITY),
        }
    }

    pub fn load(path: &Path, embedder: Arc<dyn Embedder>) -> SageResult<Self> {
        let index = VectorIndex::load(path, embedder.as_ref())?;
        Ok(Self::new(index, embedder))
    }

    pub fn chunk_count(&self) -> usize {
        self.index.chunks().len()
    }

    /// Hybrid retrieval: k candidates from each retriever, scores
    /// max-normalized and combined, deduplicated on rule id keeping the
    /// highest score. Results below `min_score` are dropped. An empty result
    /// is not an error.
    pub async fn retrieve(&self, query: &str, k: usize, min_score: f64) -> SageResult<Vec<RuleEvidence>> {
        let cache_key = (normalize_query(query), k);
        if cache_key.0.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(cached) = self.query_cache.get(&cache_key) {
            log::debug!("query cache hit for '{}'", cache_key.0);
            return Ok(apply_min_score(cached, min_score));
        }

        let expanded = expand_query(query);
        let vector_hits = self.vector_hits(&expanded, k).await?;
        let bm25_hits = self.bm25.search(&expanded, k);

        let combined = combine_scores(&vector_hits, &bm25_hits);
        let mut best: HashMap<&str, (usize, f64)> = HashMap::new();
        for (idx, score) in combined {
            let Some(chunk) = self.index.chunk(idx) else {
                continue;
            };
            let entry = best.entry(chunk.rule_id.as_str()).or_insert((idx, score));
            if score > entry.1 {
                *entry = (idx, score);
            }
        }

        let mut results: Vec<RuleEvidence> = best
            .into_values()
            .filter_map(|(idx, score)| {
                self.index.chunk(idx).map(|chunk| RuleEvidence {
                    rule_id: chunk.rule_id.clone(),
                    text: chunk.text.clone(),
                    score,
                })
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);

        self.query_cache.insert(cache_key, results.clone());
        Ok(apply_min_score(results, min_score))
    }

    /// Dense retrieval only.
    pub async fn retrieve_vector(&self, query: &str, k: usize) -> SageResult<Vec<RuleEvidence>> {
        let hits = self.vector_hits(&expand_query(query), k).await?;
        Ok(self.to_evidence(&hits))
    }

    /// Keyword retrieval only.
    pub fn retrieve_bm25(&self, query: &str, k: usize) -> Vec<RuleEvidence> {
        let hits = self.bm25.search(&expand_query(query), k);
        self.to_evidence(&hits)
    }

    async fn vector_hits(&self, query: &str, k: usize) -> SageResult<Vec<(usize, f64)>> {
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let mut query_vector = vectors
            .pop()
            .ok_or_else(|| SageError::UpstreamUnavailable("embedder returned no vector".into()))?;
        normalize(&mut query_vector);
        Ok(self.index.search_vector(&query_vector, k))
    }

    fn to_evidence(&self, hits: &[(usize, f64)]) -> Vec<RuleEvidence> {
        hits.iter()
            .filter_map(|&(idx, score)| {
                self.index.chunk(idx).map(|chunk| RuleEvidence {
                    rule_id: chunk.rule_id.clone(),
                    text: chunk.text.clone(),
                    score,
                })
            })
            .collect()
    }
}

/// Lowercase, strip punctuation, collapse whitespace. Cache keys and nothing
/// else; the retrievers see the expanded original.
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append expansion terms for recognized concepts and explicit rule numbers.
pub fn expand_query(query: &str) -> String {
    let normalized = normalize_query(query);
    let mut expanded = query.to_string();

    for (concept, terms) in QUERY_EXPANSIONS {
        if normalized.contains(concept) {
            expanded.push(' ');
            expanded.push_str(terms);
        }
    }
    for number in RULE_NUMBER.find_iter(query) {
        expanded.push_str(&format!(" rule {}", number.as_str()));
    }
    expanded
}

fn apply_min_score(results: Vec<RuleEvidence>, min_score: f64) -> Vec<RuleEvidence> {
    if min_score <= 0.0 {
        return results;
    }
    results.into_iter().filter(|r| r.score >= min_score).collect()
}

/// Max-normalize each hit list and fuse them. A document found by both
/// retrievers gets the weighted sum of its normalized scores.
fn combine_scores(vector_hits: &[(usize, f64)], bm25_hits: &[(usize, f64)]) -> Vec<(usize, f64)> {
    let vector_max = vector_hits.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
    let bm25_max = bm25_hits.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);

    let mut combined: HashMap<usize, f64> = HashMap::new();
    for &(idx, score) in vector_hits {
        let normalized = if vector_max > 0.0 { score / vector_max } else { 0.0 };
        *combined.entry(idx).or_insert(0.0) += HYBRID_VECTOR_WEIGHT * normalized.max(0.0);
    }
    for &(idx, score) in bm25_hits {
        let normalized = if bm25_max > 0.0 { score / bm25_max } else { 0.0 };
        *combined.entry(idx).or_insert(0.0) += (1.0 - HYBRID_VECTOR_WEIGHT) * normalized.max(0.0);
    }
    combined.into_iter().collect()
}

/// Offline index build: chunk the rules source, embed, and persist. Returns
/// the metadata of the freshly built index.
pub async fn build_index(
    source_text: &str,
    out_path: &Path,
    embedder: &dyn Embedder,
) -> SageResult<IndexMetadata> {
    let chunks: Vec<RuleChunk> = chunk_rules(source_text);
    if chunks.is_empty() {
        return Err(SageError::InvalidQuery(
            "rules source produced no chunks".into(),
        ));
    }
    log::info!("chunked rules source into {} chunks", chunks.len());

    let fingerprint = source_fingerprint(source_text);
    let index = VectorIndex::build(chunks, embedder, fingerprint).await?;
    index.save(out_path)?;
    Ok(index.metadata.clone())
}

/// Convenience wrapper over `build_index` that reads the rules source from
/// disk first.
pub async fn build_index_from_file(
    source_path: &Path,
    out_path: &Path,
    embedder: &dyn Embedder,
) -> SageResult<IndexMetadata> {
    let source = std::fs::read_to_string(source_path).map_err(|e| {
        SageError::NotFound(format!("rules source {}: {e}", source_path.display()))
    })?;
    build_index(&source, out_path, embedder).await
}
