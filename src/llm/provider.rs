// Stack Sage: Chat Model Client
// A single OpenAI-compatible chat endpoint serves every agent; handles differ
// only in temperature. Transient failures are retried with backoff.

use crate::config::SageConfig;
use crate::error::{SageError, SageResult};
use crate::llm::retry::RetryConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

/// Completion result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: Option<u32>,
    pub finish_reason: Option<String>,
}

/// Connection settings for one chat handle.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl LlmConfig {
    pub fn from_sage(config: &SageConfig, temperature: f32) -> Self {
        Self {
            model: config.llm_model.clone(),
            temperature,
            max_tokens: config.llm_max_tokens,
            api_key: config.llm_api_key.clone(),
            base_url: config.llm_base_url.clone(),
        }
    }
}

/// Anything that can complete a chat conversation. The HTTP client below is
/// the production implementation; tests substitute scripted fakes.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> SageResult<LlmResponse>;

    fn model(&self) -> &str;
}

/// OpenAI-compatible chat client over reqwest.
pub struct HttpChatModel {
    client: reqwest::Client,
    config: LlmConfig,
    retry: RetryConfig,
}

impl HttpChatModel {
    pub fn new(config: LlmConfig) -> SageResult<Self> {
        if config.api_key.is_none() {
            return Err(SageError::ToolMisconfigured(format!(
                "no API key configured for model {}",
                config.model
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("stack-sage/0.1")
            .build()
            .map_err(|e| SageError::UpstreamUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn call_once(&self, messages: &[Message]) -> SageResult<LlmResponse> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| SageError::ToolMisconfigured("missing API key".into()))?;

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SageError::ToolMisconfigured(format!(
                "chat endpoint rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            return Err(SageError::UpstreamUnavailable(format!(
                "chat endpoint returned {status}"
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if content.is_empty() {
            return Err(SageError::UpstreamUnavailable(
                "chat endpoint returned an empty completion".into(),
            ));
        }

        Ok(LlmResponse {
            content,
            model: self.config.model.clone(),
            tokens_used: payload["usage"]["total_tokens"].as_u64().map(|t| t as u32),
            finish_reason: payload["choices"][0]["finish_reason"]
                .as_str()
                .map(str::to_string),
        })
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, messages: &[Message]) -> SageResult<LlmResponse> {
        let mut attempt = 0u32;
        loop {
            match self.call_once(messages).await {
                Ok(response) => {
                    if attempt > 0 {
                        log::info!("chat call succeeded after {attempt} retries");
                    }
                    return Ok(response);
                }
                Err(err) if self.retry.should_retry(&err, attempt) => {
                    let delay = self.retry.calculate_delay(attempt);
                    log::warn!(
                        "chat call failed ({err}), retrying in {:?} ({}/{})",
                        delay,
                        attempt + 1,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
