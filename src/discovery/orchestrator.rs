//! Discovery orchestrator
//!
//! Translates one discovery intent into a final ranked candidate list,
//! coordinating agents adaptively. With a language model configured it runs
//! a bounded tool-calling reasoning loop; without one (or when the model
//! boundary fails) it runs a deterministic fetch -> search -> validate ->
//! rank plan. Either way the orchestrator keeps an explicit plan it revises
//! after each report: a failed or thin ranked-list fetch queues the next
//! source instead of aborting.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Result, ensure};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::agents::AgentSet;
use super::protocol::{AgentKind, AgentRequest, tool_definitions};
use crate::error::ErrorCode;
use crate::models::{Candidate, dedup_candidates};
use crate::services::openai::{ChatBackend, ChatMessage, ChatRequest};

/// Validation confidence floor applied during discovery runs.
const MIN_CONFIDENCE: f64 = 0.3;

/// Entries requested from each ranked-list source.
const FETCH_COUNT: usize = 30;

/// One discovery request.
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub prompt: String,
    /// Result-count limit, 1-50.
    pub limit: usize,
    pub region: Option<String>,
}

impl DiscoveryRequest {
    pub fn new(prompt: impl Into<String>, limit: usize) -> Self {
        Self {
            prompt: prompt.into(),
            limit,
            region: None,
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            (1..=50).contains(&self.limit),
            "limit must be between 1 and 50, got {}",
            self.limit
        );
        ensure!(!self.prompt.trim().is_empty(), "discovery prompt is empty");
        Ok(())
    }
}

/// What happened to one source or search attempt during a run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceAttempt {
    pub source: String,
    pub succeeded: bool,
    pub detail: String,
    /// `source_unavailable` for failed attempts; absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl SourceAttempt {
    fn from_report(source: &str, report: &super::protocol::AgentReport) -> Self {
        Self {
            source: source.to_string(),
            succeeded: !report.is_failure(),
            detail: report.summary.clone(),
            code: report
                .is_failure()
                .then_some(ErrorCode::SourceUnavailable),
        }
    }
}

/// Final result of one discovery run. An empty candidate list is not an
/// error: `attempts` and `diagnostics` explain which sources were tried and
/// why each failed.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryOutcome {
    pub candidates: Vec<Candidate>,
    pub attempts: Vec<SourceAttempt>,
    pub diagnostics: Vec<String>,
}

impl DiscoveryOutcome {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

pub struct Orchestrator {
    agents: AgentSet,
    llm: Option<Arc<dyn ChatBackend>>,
    model: String,
    max_iterations: usize,
    source_names: Vec<String>,
    default_region: String,
}

impl Orchestrator {
    pub fn new(
        agents: AgentSet,
        llm: Option<Arc<dyn ChatBackend>>,
        model: impl Into<String>,
        max_iterations: usize,
        source_names: Vec<String>,
        default_region: impl Into<String>,
    ) -> Self {
        Self {
            agents,
            llm,
            model: model.into(),
            max_iterations,
            source_names,
            default_region: default_region.into(),
        }
    }

    /// Run one discovery request to completion. Source failures are folded
    /// into the outcome; only a malformed request errors.
    pub async fn discover(&self, request: &DiscoveryRequest) -> Result<DiscoveryOutcome> {
        request.validate()?;
        let region = request
            .region
            .clone()
            .unwrap_or_else(|| self.default_region.clone());

        info!(prompt = %request.prompt, limit = request.limit, "starting discovery");

        if self.llm.is_some() {
            match self.reasoning_loop(request, &region).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!(error = %e, "reasoning loop unavailable, using deterministic plan");
                }
            }
        }
        Ok(self.deterministic_plan(request, &region).await)
    }

    /// Fixed plan with adaptive source fallback: fetch the primary source
    /// and search in the first pass, queue the next source whenever a fetch
    /// fails or leaves the pool thin, then validate and rank.
    async fn deterministic_plan(&self, request: &DiscoveryRequest, region: &str) -> DiscoveryOutcome {
        let mut remaining_sources: VecDeque<String> = self.source_names.iter().cloned().collect();
        let mut plan: VecDeque<AgentRequest> = VecDeque::new();
        if let Some(primary) = remaining_sources.pop_front() {
            plan.push_back(AgentRequest::Fetch {
                source: primary,
                count: FETCH_COUNT,
            });
        }
        plan.push_back(AgentRequest::Search {
            query: request.prompt.clone(),
            recency_hint: Some("currently in theaters".to_string()),
            max_results: FETCH_COUNT,
            region: region.to_string(),
        });

        let desired_raw = (request.limit * 2).max(10);
        let mut pool: Vec<Candidate> = Vec::new();
        let mut attempts: Vec<SourceAttempt> = Vec::new();
        let mut diagnostics: Vec<String> = Vec::new();

        while let Some(step) = plan.pop_front() {
            let fetch_source = match &step {
                AgentRequest::Fetch { source, .. } => Some(source.clone()),
                _ => None,
            };
            let label = fetch_source
                .clone()
                .unwrap_or_else(|| "web_search".to_string());

            let report = self.agents.dispatch(step).await;
            attempts.push(SourceAttempt::from_report(&label, &report));

            if report.is_failure() {
                diagnostics.push(format!("{label}: {}", report.summary));
            } else {
                pool.extend(report.candidates);
                let (deduped, _) = dedup_candidates(std::mem::take(&mut pool));
                pool = deduped;
            }

            // Plan revision: a dead or thin ranked-list source queues the
            // next one rather than aborting the run.
            if fetch_source.is_some() && pool.len() < desired_raw {
                if let Some(next) = remaining_sources.pop_front() {
                    plan.push_front(AgentRequest::Fetch {
                        source: next,
                        count: FETCH_COUNT,
                    });
                }
            }
        }

        if pool.is_empty() {
            diagnostics.push(format!(
                "no usable candidates from {} attempted source(s)",
                attempts.len()
            ));
            return DiscoveryOutcome {
                candidates: Vec::new(),
                attempts,
                diagnostics,
            };
        }

        let (candidates, mut diag) = self
            .validate_and_rank(pool, &request.prompt, request.limit, true)
            .await;
        diagnostics.append(&mut diag);

        DiscoveryOutcome {
            candidates,
            attempts,
            diagnostics,
        }
    }

    /// Bounded tool-calling loop: the model plans, reads each report's
    /// markdown, and adapts. The typed reports remain authoritative - the
    /// candidate pool is maintained here, not parsed back out of the model's
    /// text.
    async fn reasoning_loop(
        &self,
        request: &DiscoveryRequest,
        region: &str,
    ) -> Result<DiscoveryOutcome> {
        let llm = self.llm.as_ref().expect("reasoning loop requires a model");
        let tools = tool_definitions(&self.source_names);

        let today = Utc::now().format("%B %d, %Y");
        let mut messages = vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(format!(
                "Today's date: {today}\n\nUser request: {}\n\nLimit: {} movies\nRegion: {region}",
                request.prompt, request.limit
            )),
        ];

        let mut pool: Vec<Candidate> = Vec::new();
        let mut ranked: Option<Vec<Candidate>> = None;
        let mut attempts: Vec<SourceAttempt> = Vec::new();
        let mut diagnostics: Vec<String> = Vec::new();

        for iteration in 1..=self.max_iterations {
            let mut chat_request = ChatRequest::new(&self.model, messages.clone());
            chat_request.tools = tools.clone();

            let reply = llm.chat(&chat_request).await?;
            if reply.tool_calls.is_empty() {
                debug!(iteration, "orchestrator model finished reasoning");
                break;
            }

            let tool_calls = reply.tool_calls.clone();
            messages.push(reply);

            for call in tool_calls {
                let arguments: Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                let outcome = AgentRequest::from_tool_call(&call.function.name, &arguments, &pool);

                let rendered = match outcome {
                    Ok(agent_request) => {
                        let kind = agent_request.kind();
                        let fetch_label = match &agent_request {
                            AgentRequest::Fetch { source, .. } => Some(source.clone()),
                            AgentRequest::Search { .. } => Some("web_search".to_string()),
                            _ => None,
                        };
                        let report = self.agents.dispatch(agent_request).await;

                        if let Some(label) = fetch_label {
                            attempts.push(SourceAttempt::from_report(&label, &report));
                            if report.is_failure() {
                                diagnostics.push(format!("{label}: {}", report.summary));
                            }
                        }

                        if !report.is_failure() {
                            match kind {
                                AgentKind::Fetch | AgentKind::Search => {
                                    pool.extend(report.candidates.clone());
                                    let (deduped, _) = dedup_candidates(std::mem::take(&mut pool));
                                    pool = deduped;
                                }
                                AgentKind::Validate => pool = report.candidates.clone(),
                                AgentKind::Rank => ranked = Some(report.candidates.clone()),
                            }
                        }
                        report.to_markdown()
                    }
                    Err(e) => format!("## Tool Error: {}\n\n**Error**: {e}", call.function.name),
                };

                messages.push(ChatMessage::tool_result(
                    &call.id,
                    &call.function.name,
                    rendered,
                ));
            }
        }

        let working = ranked.clone().unwrap_or_else(|| pool.clone());
        if working.is_empty() {
            diagnostics.push(format!(
                "no usable candidates from {} attempted source(s)",
                attempts.len()
            ));
            return Ok(DiscoveryOutcome {
                candidates: Vec::new(),
                attempts,
                diagnostics,
            });
        }

        // Enforce the output contract regardless of what the model chose to
        // call: everything returned is validated, deduplicated, and bounded.
        let (candidates, mut diag) = self
            .validate_and_rank(working, &request.prompt, request.limit, ranked.is_none())
            .await;
        diagnostics.append(&mut diag);

        Ok(DiscoveryOutcome {
            candidates,
            attempts,
            diagnostics,
        })
    }

    /// Shared tail of both modes: a validate pass (order-preserving) and,
    /// when no ranking has happened yet, a rank pass; always bounded to the
    /// limit.
    async fn validate_and_rank(
        &self,
        pool: Vec<Candidate>,
        prompt: &str,
        limit: usize,
        need_rank: bool,
    ) -> (Vec<Candidate>, Vec<String>) {
        let mut diagnostics = Vec::new();

        let validate_report = self
            .agents
            .dispatch(AgentRequest::Validate {
                candidates: pool,
                min_confidence: MIN_CONFIDENCE,
            })
            .await;
        if validate_report.is_failure() {
            diagnostics.push(format!("validation: {}", validate_report.summary));
            return (Vec::new(), diagnostics);
        }
        let validated = validate_report.candidates;
        if validated.is_empty() {
            diagnostics.push("validation excluded every candidate".to_string());
            return (Vec::new(), diagnostics);
        }

        if !need_rank {
            return (validated.into_iter().take(limit).collect(), diagnostics);
        }

        let rank_report = self
            .agents
            .dispatch(AgentRequest::Rank {
                candidates: validated.clone(),
                criteria: prompt.to_string(),
                limit,
            })
            .await;
        if rank_report.is_failure() {
            diagnostics.push(format!("ranking: {}", rank_report.summary));
            return (validated.into_iter().take(limit).collect(), diagnostics);
        }
        (
            rank_report.candidates.into_iter().take(limit).collect(),
            diagnostics,
        )
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a movie discovery orchestrator. Coordinate the available \
tools to find HIGH-QUALITY, wide theatrical releases matching the user's \
request.\n\n\
Process:\n\
1. fetch_movies from a ranked-list source (available: {sources}); if a \
source fails, fetch from the next one\n\
2. search_movies for current trending context\n\
3. validate_movies to drop concerts, compilations, re-releases, duplicates\n\
4. rank_movies last, with the user's criteria and limit\n\n\
Never invent movies yourself; only work with tool results.",
            sources = self.source_names.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation_bounds() {
        assert!(DiscoveryRequest::new("find movies", 0).validate().is_err());
        assert!(DiscoveryRequest::new("find movies", 51).validate().is_err());
        assert!(DiscoveryRequest::new("   ", 10).validate().is_err());
        assert!(DiscoveryRequest::new("find movies", 50).validate().is_ok());
    }
}
