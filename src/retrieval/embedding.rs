// Stack Sage: Embedding Backends
// Hosted embeddings come from an OpenAI-compatible endpoint; local mode is a
// deterministic hashing embedder that trades quality for zero dependencies
// on external services. The two differ only in dimensionality, which the
// index metadata records and verifies.

use crate::config::EmbeddingMode;
use crate::error::{SageError, SageResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

pub const HOSTED_DIMENSION: usize = 1536;
pub const LOCAL_DIMENSION: usize = 384;

/// Sentence embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> SageResult<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    fn mode(&self) -> EmbeddingMode;
}

/// OpenAI-compatible /embeddings client.
pub struct HostedEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HostedEmbedder {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> SageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("stack-sage/0.1")
            .build()
            .map_err(|e| SageError::UpstreamUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for HostedEmbedder {
    async fn embed(&self, texts: &[String]) -> SageResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SageError::UpstreamUnavailable(format!(
                "embedding endpoint returned {status}"
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        let embeddings = payload["data"]
            .as_array()
            .ok_or_else(|| {
                SageError::UpstreamUnavailable("embedding response missing data array".into())
            })?
            .iter()
            .map(|item| {
                item["embedding"]
                    .as_array()
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.as_f64().map(|f| f as f32))
                            .collect::<Vec<f32>>()
                    })
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>();

        if embeddings.len() != texts.len() {
            return Err(SageError::UpstreamUnavailable(format!(
                "embedding endpoint returned {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        HOSTED_DIMENSION
    }

    fn mode(&self) -> EmbeddingMode {
        EmbeddingMode::Hosted
    }
}

/// Deterministic token-hashing embedder. Each unigram and bigram hashes to a
/// signed slot; the result is L2-normalized. Not a semantic model, but it is
/// stable, offline, and good enough to pair with BM25 in hybrid retrieval.
pub struct LocalHashEmbedder;

impl LocalHashEmbedder {
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() > 1)
            .map(str::to_string)
            .collect()
    }

    fn add_feature(vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let slot = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % vector.len();
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        vector[slot] += sign * weight;
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; LOCAL_DIMENSION];
        let tokens = Self::tokenize(text);
        for token in &tokens {
            Self::add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            Self::add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for LocalHashEmbedder {
    async fn embed(&self, texts: &[String]) -> SageResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        LOCAL_DIMENSION
    }

    fn mode(&self) -> EmbeddingMode {
        EmbeddingMode::Local
    }
}
