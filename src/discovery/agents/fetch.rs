//! Fetch agent: one named ranked-list source in, raw candidates out.

use std::sync::Arc;

use tracing::{debug, warn};

use super::PageFetcher;
use crate::config::DiscoverySource;
use crate::discovery::parsers::{ParserKind, parse_document};
use crate::discovery::protocol::{AgentKind, AgentReport};
use crate::models::Candidate;
use crate::services::cache::{CacheKey, FetchCache};

const AGENT_NAME: &str = "fetch_movies";

/// Confidence assigned to chart entries decays slightly with rank; unranked
/// entries get the flat default the search path also uses.
const RANKED_BASE_CONFIDENCE: f64 = 0.9;
const UNRANKED_CONFIDENCE: f64 = 0.8;

pub struct FetchAgent {
    fetcher: Arc<dyn PageFetcher>,
    cache: Arc<FetchCache>,
    sources: Vec<DiscoverySource>,
}

impl FetchAgent {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        cache: Arc<FetchCache>,
        sources: Vec<DiscoverySource>,
    ) -> Self {
        Self {
            fetcher,
            cache,
            sources,
        }
    }

    pub async fn run(&self, source: &str, count: usize) -> AgentReport {
        let Some(config) = self.sources.iter().find(|s| s.name == source) else {
            return AgentReport::failure(
                AgentKind::Fetch,
                AGENT_NAME,
                format!("unknown source '{source}'"),
            );
        };

        let cache_key = CacheKey::for_source(&config.name);
        let document = match self.cache.get(&cache_key) {
            Some(cached) => cached,
            None => match self.fetcher.fetch(&config.url).await {
                Ok(document) => {
                    self.cache.insert(cache_key, document.clone());
                    document
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "source fetch failed");
                    return AgentReport::failure(
                        AgentKind::Fetch,
                        AGENT_NAME,
                        format!("source '{source}' unavailable: {e}"),
                    );
                }
            },
        };

        let parser = ParserKind::from_name(&config.parser);
        let entries = parse_document(parser, &document, &config.name);
        debug!(source = %source, parsed = entries.len(), "source parsed");

        if entries.is_empty() {
            // Layout drift parses to nothing rather than erroring; surface it
            // as a recoverable failure so the orchestrator falls back.
            return AgentReport::failure(
                AgentKind::Fetch,
                AGENT_NAME,
                format!("source '{source}' yielded no entries (layout drift or empty page)"),
            );
        }

        let total_parsed = entries.len();
        let candidates: Vec<Candidate> = entries
            .into_iter()
            .take(count)
            .map(|entry| {
                let mut candidate = Candidate::new(entry.title);
                candidate.year = entry.year;
                candidate.confidence = match entry.rank {
                    Some(rank) => {
                        (RANKED_BASE_CONFIDENCE - (rank.saturating_sub(1) as f64) * 0.01).max(0.5)
                    }
                    None => UNRANKED_CONFIDENCE,
                };
                candidate.sources.push(config.name.clone());
                candidate
            })
            .collect();

        let mut report = AgentReport::success(
            AgentKind::Fetch,
            AGENT_NAME,
            format!("{} entries from {source}", candidates.len()),
        );
        report.stat("parsed", total_parsed as u64);
        report.stat("returned", candidates.len() as u64);
        report.candidates = candidates;
        report
    }
}
