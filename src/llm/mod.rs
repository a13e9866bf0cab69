// Stack Sage: LLM Layer
// Shared chat handles keyed by (model, temperature). The cardinality is tiny
// (one model, a handful of temperatures), so the handle cache is unbounded.

pub mod prompts;
pub mod provider;
pub mod retry;

pub use prompts::SystemPrompts;
pub use provider::{ChatModel, HttpChatModel, LlmConfig, LlmResponse, Message, Role};
pub use retry::RetryConfig;

use crate::config::SageConfig;
use crate::error::SageResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type HandleFactory = Box<dyn Fn(f32) -> SageResult<Arc<dyn ChatModel>> + Send + Sync>;

/// Process-wide cache of chat handles. Built at startup, torn down at
/// shutdown; requests share the handles through `Arc`.
pub struct LlmHandles {
    handles: Mutex<HashMap<(String, u32), Arc<dyn ChatModel>>>,
    model: String,
    factory: HandleFactory,
}

impl LlmHandles {
    /// Production wiring: HTTP handles against the configured endpoint.
    pub fn over_http(config: &SageConfig) -> Self {
        let config = config.clone();
        let model = config.llm_model.clone();
        Self {
            handles: Mutex::new(HashMap::new()),
            model,
            factory: Box::new(move |temperature| {
                let llm_config = LlmConfig::from_sage(&config, temperature);
                Ok(Arc::new(HttpChatModel::new(llm_config)?) as Arc<dyn ChatModel>)
            }),
        }
    }

    /// Test wiring: every temperature resolves to the same injected handle.
    pub fn with_shared(model: &str, handle: Arc<dyn ChatModel>) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            model: model.to_string(),
            factory: Box::new(move |_| Ok(handle.clone())),
        }
    }

    /// Fetch (or build) the handle for the given temperature.
    pub fn get(&self, temperature: f32) -> SageResult<Arc<dyn ChatModel>> {
        let key = (self.model.clone(), temperature.to_bits());
        {
            let handles = self.handles.lock().unwrap();
            if let Some(handle) = handles.get(&key) {
                return Ok(handle.clone());
            }
        }
        let handle = (self.factory)(temperature)?;
        self.handles.lock().unwrap().insert(key, handle.clone());
        Ok(handle)
    }

    pub fn cached_handle_count(&self) -> usize {
        self.handles.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SageResult;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ChatModel for Echo {
        async fn complete(&self, messages: &[Message]) -> SageResult<LlmResponse> {
            Ok(LlmResponse {
                content: messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                model: "echo".into(),
                tokens_used: None,
                finish_reason: None,
            })
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn test_handles_are_cached_per_temperature() {
        let handles = LlmHandles::with_shared("echo", Arc::new(Echo));
        handles.get(0.0).unwrap();
        handles.get(0.0).unwrap();
        handles.get(0.1).unwrap();
        assert_eq!(handles.cached_handle_count(), 2);
    }
}
