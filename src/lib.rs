// Stack Sage: Multi-Agent MTG Rules Assistant
// Answers Magic: The Gathering questions by routing them through specialist
// agents over two knowledge sources: the Comprehensive Rules (hybrid
// retrieval) and the Scryfall card database (live lookups). This crate is
// the orchestration core; HTTP serving and UI live elsewhere.

pub mod agents;
pub mod cache;
pub mod config;
pub mod context;
pub mod deck;
pub mod error;
pub mod graph;
pub mod llm;
pub mod meta_cache;
pub mod retrieval;
pub mod scryfall;
pub mod state;
pub mod tools;

pub use config::{EmbeddingMode, SageConfig};
pub use context::SageContext;
pub use error::{SageError, SageResult};
pub use graph::{AskOutcome, Diagnostics, MultiAgentGraph};
pub use retrieval::build_index;
pub use scryfall::CardSearchFilters;
pub use state::{AgentState, CardEvidence, Citation, Evidence, Intent, MetaEvidence, RuleEvidence};

use crate::deck::{parse_decklist, Deck, DeckValidationResult, DeckValidator};
use crate::llm::LlmHandles;
use crate::meta_cache::Freshness;
use crate::retrieval::{Embedder, HostedEmbedder, HybridRetriever, LocalHashEmbedder};
use crate::scryfall::{CachedCardSource, CardSource, ScryfallClient};
use crate::tools::{MetaSearcher, TavilySearcher, ToolRegistry};
use serde::Serialize;
use std::sync::Arc;

/// Result of a criteria search, shaped for the serving layer.
#[derive(Debug, Clone, Serialize)]
pub struct CardSearchResponse {
    pub total_cards: usize,
    pub query: String,
    pub cards: Vec<CardEvidence>,
    pub success: bool,
}

/// The assembled system: shared components plus the agent graph. Build one
/// per process and share it across requests; each request gets its own
/// `AgentState` internally.
pub struct StackSage {
    ctx: SageContext,
    graph: MultiAgentGraph,
}

impl StackSage {
    /// Production wiring from configuration: live Scryfall, live chat
    /// endpoint, rules index loaded from disk when present.
    pub fn new(config: SageConfig) -> SageResult<Self> {
        let cards: Arc<dyn CardSource> = Arc::new(CachedCardSource::new(ScryfallClient::new(
            &config.scryfall_base_url,
        )?));

        let retriever = match HybridRetriever::load(&config.index_path, embedder_from_config(&config)?)
        {
            Ok(retriever) => {
                log::info!("loaded rules index with {} chunks", retriever.chunk_count());
                Some(Arc::new(retriever))
            }
            Err(err) => {
                log::warn!("rules index unavailable: {err}");
                None
            }
        };

        let meta: Arc<dyn MetaSearcher> =
            Arc::new(TavilySearcher::new(config.meta_search_credential.clone())?);

        let llm = LlmHandles::over_http(&config);
        let tools = ToolRegistry::new(cards, retriever, meta);
        Ok(Self {
            ctx: SageContext::new(config, llm, tools),
            graph: MultiAgentGraph::new(),
        })
    }

    /// Assembly from injected components; the seam tests use for fakes.
    pub fn with_components(
        config: SageConfig,
        llm: LlmHandles,
        cards: Arc<dyn CardSource>,
        retriever: Option<Arc<HybridRetriever>>,
        meta: Arc<dyn MetaSearcher>,
    ) -> Self {
        let tools = ToolRegistry::new(cards, retriever, meta);
        Self {
            ctx: SageContext::new(config, llm, tools),
            graph: MultiAgentGraph::new(),
        }
    }

    pub fn context(&self) -> &SageContext {
        &self.ctx
    }

    /// Answer a question through the multi-agent graph.
    pub async fn ask(&self, question: &str) -> AskOutcome {
        self.graph.run(&self.ctx, question).await
    }

    /// Parse and validate a decklist against a format's rules. Parse
    /// problems surface as warnings on the result.
    pub async fn validate_deck(
        &self,
        decklist: &str,
        format: &str,
        commander: Option<&str>,
    ) -> DeckValidationResult {
        let (mainboard, sideboard, warnings) = parse_decklist(decklist);
        let deck = Deck {
            format: format.to_string(),
            mainboard,
            sideboard,
            commander: commander.map(str::to_string),
        };

        let mut result = DeckValidator::new(self.ctx.tools.card_source())
            .validate(&deck)
            .await;
        for warning in warnings {
            result.add_warning(warning);
        }
        result
    }

    /// Attribute search against the card service.
    pub async fn search_cards(&self, filters: &CardSearchFilters) -> SageResult<CardSearchResponse> {
        let cards = self.ctx.tools.search_cards_by_criteria(filters).await?;
        Ok(CardSearchResponse {
            total_cards: cards.len(),
            query: filters.to_search_query(),
            cards,
            success: true,
        })
    }

    /// Cached metagame snapshot for a format, if one is present and not past
    /// the refetch horizon. Snapshots in the stale band carry the flag.
    pub fn meta_snapshot(&self, format: &str) -> Option<MetaEvidence> {
        match self.ctx.meta_cache.get(format) {
            Some((snapshot, Freshness::Fresh)) => Some(snapshot),
            Some((mut snapshot, Freshness::Stale)) => {
                snapshot.stale = true;
                Some(snapshot)
            }
            Some((_, Freshness::Expired)) | None => None,
        }
    }

    /// Force-refresh the metagame snapshot for a format.
    pub async fn refresh_meta(&self, format: &str) -> SageResult<MetaEvidence> {
        let mut snapshot = self
            .ctx
            .tools
            .search_mtg_meta(&format!("{format} metagame decks tier list"), 5)
            .await?;
        snapshot.format = format.to_lowercase();
        self.ctx.meta_cache.insert(format, snapshot.clone());
        Ok(snapshot)
    }
}

/// Select the embedding backend for the configured mode.
pub fn embedder_from_config(config: &SageConfig) -> SageResult<Arc<dyn Embedder>> {
    match config.embedding_mode {
        EmbeddingMode::Local => Ok(Arc::new(LocalHashEmbedder)),
        EmbeddingMode::Hosted => {
            let api_key = config.llm_api_key.clone().unwrap_or_default();
            Ok(Arc::new(HostedEmbedder::new(
                &config.llm_base_url,
                &api_key,
                &config.embedding_model,
            )?))
        }
    }
}
