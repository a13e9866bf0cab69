// Stack Sage: Shared Components
// Process-wide collaborators handed to every agent: built at startup, torn
// down at shutdown, individually guarded for concurrent use.

use crate::config::SageConfig;
use crate::llm::LlmHandles;
use crate::meta_cache::MetaCache;
use crate::tools::ToolRegistry;

pub struct SageContext {
    pub config: SageConfig,
    pub llm: LlmHandles,
    pub tools: ToolRegistry,
    pub meta_cache: MetaCache,
}

impl SageContext {
    pub fn new(config: SageConfig, llm: LlmHandles, tools: ToolRegistry) -> Self {
        Self {
            config,
            llm,
            tools,
            meta_cache: MetaCache::new(),
        }
    }
}
