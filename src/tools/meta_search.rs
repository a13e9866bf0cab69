// Stack Sage: Web Meta Search
// Optional metagame lookup against a web search API. Without a credential
// the tool reports itself as not configured rather than failing the request.

use crate::error::{SageError, SageResult};
use crate::state::{MetaEvidence, MetaSource};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

/// Web search over metagame content.
#[async_trait]
pub trait MetaSearcher: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> SageResult<MetaEvidence>;
}

/// Tavily-backed searcher. Queries are prefixed with game context so the
/// search engine stays on topic.
pub struct TavilySearcher {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl TavilySearcher {
    pub fn new(api_key: Option<String>) -> SageResult<Self> {
        Self::with_base_url(api_key, "https://api.tavily.com")
    }

    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> SageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("stack-sage/0.1")
            .build()
            .map_err(|e| SageError::UpstreamUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MetaSearcher for TavilySearcher {
    async fn search(&self, query: &str, max_results: usize) -> SageResult<MetaEvidence> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            SageError::ToolMisconfigured("web meta search has no credential configured".into())
        })?;

        let body = serde_json::json!({
            "api_key": api_key,
            "query": format!("Magic the Gathering MTG {query}"),
            "max_results": max_results,
            "search_depth": "advanced",
            "include_answer": true,
        });

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SageError::UpstreamUnavailable(format!(
                "meta search returned {status}"
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        let sources = payload["results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .map(|item| MetaSource {
                        title: item["title"].as_str().unwrap_or_default().to_string(),
                        url: item["url"].as_str().unwrap_or_default().to_string(),
                        snippet: item["content"]
                            .as_str()
                            .map(|c| c.chars().take(200).collect())
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(MetaEvidence {
            format: String::new(),
            snapshot_date: Utc::now(),
            summary: payload["answer"].as_str().unwrap_or("No summary available").to_string(),
            sources,
            stale: false,
        })
    }
}
