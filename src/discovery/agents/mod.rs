//! Specialized discovery agents
//!
//! Four narrow roles behind one dispatch point: fetch a ranked list, search
//! the web, validate candidates, rank the survivors. Every call is bounded
//! by a timeout and answers with an `AgentReport`; a failed call produces a
//! failure report and leaves no partial state behind.

pub mod fetch;
pub mod ranker;
pub mod search;
pub mod validator;

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

pub use fetch::FetchAgent;
pub use ranker::RankerAgent;
pub use search::SearchAgent;
pub use validator::ValidatorAgent;

use super::protocol::{AgentKind, AgentReport, AgentRequest};
use crate::services::rate_limiter::RateLimitedClient;

/// Raw page retrieval boundary, substituted by a double in tests.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Rate-limited HTTP page fetcher.
pub struct HttpPageFetcher {
    client: RateLimitedClient,
}

impl HttpPageFetcher {
    pub fn new() -> Self {
        Self {
            client: RateLimitedClient::for_source_pages(),
        }
    }
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).await?;
        if !response.status().is_success() {
            anyhow::bail!("source returned status {}", response.status());
        }
        Ok(response.text().await?)
    }
}

/// The model-facing tool name for each capability.
pub fn tool_name(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Fetch => "fetch_movies",
        AgentKind::Search => "search_movies",
        AgentKind::Validate => "validate_movies",
        AgentKind::Rank => "rank_movies",
    }
}

/// The full agent set with its single dispatch point.
pub struct AgentSet {
    fetch: FetchAgent,
    search: SearchAgent,
    validator: ValidatorAgent,
    ranker: RankerAgent,
    timeout: Duration,
}

impl AgentSet {
    pub fn new(
        fetch: FetchAgent,
        search: SearchAgent,
        validator: ValidatorAgent,
        ranker: RankerAgent,
        timeout: Duration,
    ) -> Self {
        Self {
            fetch,
            search,
            validator,
            ranker,
            timeout,
        }
    }

    /// Map a request's declared capability to its handler, bounded by the
    /// per-call timeout. A timeout is a recoverable failure for this one
    /// operation, never the whole run.
    pub async fn dispatch(&self, request: AgentRequest) -> AgentReport {
        let kind = request.kind();
        let agent = tool_name(kind);
        debug!(agent = %agent, request = %request.describe(), "dispatching agent");

        let started = Instant::now();
        let handler = async {
            match request {
                AgentRequest::Fetch { source, count } => self.fetch.run(&source, count).await,
                AgentRequest::Search {
                    query,
                    recency_hint,
                    max_results,
                    region,
                } => {
                    self.search
                        .run(&query, recency_hint.as_deref(), max_results, &region)
                        .await
                }
                AgentRequest::Validate {
                    candidates,
                    min_confidence,
                } => self.validator.run(candidates, min_confidence).await,
                AgentRequest::Rank {
                    candidates,
                    criteria,
                    limit,
                } => self.ranker.run(candidates, &criteria, limit).await,
            }
        };

        let mut report = match tokio::time::timeout(self.timeout, handler).await {
            Ok(report) => report,
            Err(_) => {
                warn!(agent = %agent, timeout_s = self.timeout.as_secs(), "agent call timed out");
                AgentReport::failure(
                    kind,
                    agent,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            }
        };
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report
    }
}
