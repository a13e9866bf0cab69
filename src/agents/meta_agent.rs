// Stack Sage: Meta Agent
// Metagame snapshots, cache-first. Snapshots in the stale band are served
// with a flag; expired ones are refetched.

use crate::agents::Agent;
use crate::context::SageContext;
use crate::deck::detect_format;
use crate::error::SageError;
use crate::meta_cache::Freshness;
use crate::state::{AgentId, AgentState, Evidence, EvidenceKind, MetaEvidence};
use async_trait::async_trait;
use chrono::Utc;

const META_RESULTS: usize = 5;

pub struct MetaAgent;

#[async_trait]
impl Agent for MetaAgent {
    fn id(&self) -> AgentId {
        AgentId::Meta
    }

    async fn run(&self, state: &mut AgentState, ctx: &SageContext) {
        let format = detect_format(&state.user_question).unwrap_or("standard");

        match ctx.meta_cache.get(format) {
            Some((snapshot, Freshness::Fresh)) => {
                log::info!("meta agent: fresh cache hit for {format}");
                state.mark_tool_used("meta_cache");
                state.add_evidence(EvidenceKind::Meta, Evidence::Meta(snapshot));
                return;
            }
            Some((mut snapshot, Freshness::Stale)) => {
                log::info!("meta agent: stale cache hit for {format}");
                state.mark_tool_used("meta_cache");
                snapshot.stale = true;
                state.add_issue(format!(
                    "metagame data for {format} is more than a day old and may be outdated"
                ));
                state.add_evidence(EvidenceKind::Meta, Evidence::Meta(snapshot));
                return;
            }
            Some((_, Freshness::Expired)) | None => {}
        }

        state.mark_tool_used("search_mtg_meta");
        match ctx.tools.search_mtg_meta(&state.user_question, META_RESULTS).await {
            Ok(mut snapshot) => {
                snapshot.format = format.to_string();
                ctx.meta_cache.insert(format, snapshot.clone());
                state.add_evidence(EvidenceKind::Meta, Evidence::Meta(snapshot));
            }
            Err(SageError::ToolMisconfigured(reason)) => {
                state.add_issue(format!("metagame search is not configured: {reason}"));
                state.add_evidence(
                    EvidenceKind::Meta,
                    Evidence::Meta(not_configured_snapshot(format)),
                );
            }
            Err(err) => {
                state.add_issue(format!("metagame search failed: {err}"));
            }
        }
    }
}

/// Structured notice used in place of a snapshot when the web search
/// credential is absent.
fn not_configured_snapshot(format: &str) -> MetaEvidence {
    MetaEvidence {
        format: format.to_string(),
        snapshot_date: Utc::now(),
        summary: "Metagame data is not configured; no web search credential is set.".to_string(),
        sources: Vec::new(),
        stale: false,
    }
}
