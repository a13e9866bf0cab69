// Stack Sage: Rules Vector Store
// Embedded rule chunks with cosine scoring, persisted to disk as JSON. The
// metadata records the embedding dimensionality so a load against the wrong
// embedder fails loudly instead of silently returning garbage.

use crate::config::EmbeddingMode;
use crate::error::{SageError, SageResult};
use crate::retrieval::chunker::RuleChunk;
use crate::retrieval::embedding::Embedder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

const EMBED_BATCH_SIZE: usize = 64;

/// Build provenance for a persisted index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub dimension: usize,
    pub mode: EmbeddingMode,
    /// Fingerprint of the rules source the index was built from.
    pub source_sha256: String,
    pub built_at: DateTime<Utc>,
    pub chunk_count: usize,
}

/// The dense half of the rules index.
#[derive(Debug, Serialize, Deserialize)]
pub struct VectorIndex {
    pub metadata: IndexMetadata,
    chunks: Vec<RuleChunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Embed all chunks and assemble the index. Vectors are L2-normalized at
    /// build time so search reduces to a dot product.
    pub async fn build(
        chunks: Vec<RuleChunk>,
        embedder: &dyn Embedder,
        source_sha256: String,
    ) -> SageResult<Self> {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let mut embedded = embedder.embed(batch).await?;
            for vector in &mut embedded {
                normalize(vector);
            }
            vectors.extend(embedded);
        }

        Ok(Self {
            metadata: IndexMetadata {
                dimension: embedder.dimension(),
                mode: embedder.mode(),
                source_sha256,
                built_at: Utc::now(),
                chunk_count: chunks.len(),
            },
            chunks,
            vectors,
        })
    }

    pub fn save(&self, path: &Path) -> SageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SageError::IndexUnavailable(format!("cannot create index directory: {e}"))
            })?;
        }
        let content = serde_json::to_string(self)
            .map_err(|e| SageError::IndexUnavailable(format!("cannot serialize index: {e}")))?;
        fs::write(path, content)
            .map_err(|e| SageError::IndexUnavailable(format!("cannot write index: {e}")))?;
        log::info!(
            "saved rules index: {} chunks, {} dims",
            self.metadata.chunk_count,
            self.metadata.dimension
        );
        Ok(())
    }

    /// Load a persisted index, verifying it matches the configured embedder.
    pub fn load(path: &Path, embedder: &dyn Embedder) -> SageResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| SageError::IndexUnavailable(format!("cannot read {}: {e}", path.display())))?;
        let index: VectorIndex = serde_json::from_str(&content)
            .map_err(|e| SageError::IndexUnavailable(format!("cannot parse index: {e}")))?;

        if index.metadata.dimension != embedder.dimension() {
            return Err(SageError::IndexUnavailable(format!(
                "index was built with {}-dimensional embeddings but the configured embedder produces {}; rebuild the index",
                index.metadata.dimension,
                embedder.dimension()
            )));
        }
        if index.metadata.mode != embedder.mode() {
            return Err(SageError::IndexUnavailable(format!(
                "index was built in {:?} embedding mode but {:?} is configured; rebuild the index",
                index.metadata.mode,
                embedder.mode()
            )));
        }
        Ok(index)
    }

    /// Cosine top-k against a normalized query vector, as (chunk index,
    /// score) pairs.
    pub fn search_vector(&self, query: &[f32], k: usize) -> Vec<(usize, f64)> {
        if query.len() != self.metadata.dimension {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| {
                let dot: f32 = vector.iter().zip(query).map(|(a, b)| a * b).sum();
                (idx, dot as f64)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    pub fn chunks(&self) -> &[RuleChunk] {
        &self.chunks
    }

    pub fn chunk(&self, idx: usize) -> Option<&RuleChunk> {
        self.chunks.get(idx)
    }
}

pub(crate) fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Fingerprint of a rules source document.
pub fn source_fingerprint(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::embedding::{LocalHashEmbedder, LOCAL_DIMENSION};

    fn sample_chunks() -> Vec<RuleChunk> {
        vec![
            RuleChunk {
                rule_id: "405.1".into(),
                text: "405.1 The stack holds spells and abilities awaiting resolution.".into(),
            },
            RuleChunk {
                rule_id: "106.1".into(),
                text: "106.1 Mana is produced by lands and spent to cast spells.".into(),
            },
        ]
    }

    #[tokio::test]
    async fn test_build_and_search() {
        let index = VectorIndex::build(sample_chunks(), &LocalHashEmbedder, "abc".into())
            .await
            .unwrap();
        assert_eq!(index.metadata.dimension, LOCAL_DIMENSION);
        assert_eq!(index.metadata.chunk_count, 2);

        let query = LocalHashEmbedder
            .embed(&["stack resolution of spells".to_string()])
            .await
            .unwrap()
            .remove(0);
        let results = index.search_vector(&query, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(index.chunk(results[0].0).unwrap().rule_id, "405.1");
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules_index.json");

        let index = VectorIndex::build(sample_chunks(), &LocalHashEmbedder, "abc".into())
            .await
            .unwrap();
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path, &LocalHashEmbedder).unwrap();
        assert_eq!(loaded.metadata, index.metadata);
        assert_eq!(loaded.chunks(), index.chunks());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules_index.json");

        let mut index = VectorIndex::build(sample_chunks(), &LocalHashEmbedder, "abc".into())
            .await
            .unwrap();
        index.metadata.dimension = 1536;
        index.save(&path).unwrap();

        let err = VectorIndex::load(&path, &LocalHashEmbedder).unwrap_err();
        assert!(matches!(err, SageError::IndexUnavailable(_)));
    }

    #[test]
    fn test_missing_index_is_unavailable() {
        let err = VectorIndex::load(Path::new("/nonexistent/index.json"), &LocalHashEmbedder)
            .unwrap_err();
        assert!(matches!(err, SageError::IndexUnavailable(_)));
    }
}
