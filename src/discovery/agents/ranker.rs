//! Ranker agent: orders validated candidates by mainstream appeal and
//! quality, bounded to the requested limit.
//!
//! Uses the language model when one is configured, matching returned titles
//! back to the input candidates by identity rather than trusting the model's
//! payload. Without a model (or when the model's output is unusable) it
//! falls back to a deterministic composite of recency, confidence, and any
//! quality signal already collected.

use std::sync::Arc;

use chrono::Datelike;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::discovery::protocol::{AgentKind, AgentReport};
use crate::models::Candidate;
use crate::services::openai::{ChatBackend, ChatMessage, ChatRequest, extract_json};

const AGENT_NAME: &str = "rank_movies";

const SYSTEM_PROMPT: &str = "\
You are a movie ranking assistant. Given a JSON list of movies and ranking \
criteria, rank them from most to least worth adding to a personal library.

- Prefer wide theatrical releases with mainstream appeal
- Use provided ratings when present: a 7.0+ score with many votes is a strong signal
- Exclude anything that does not fit the criteria at all

Answer with ONLY a JSON object, no markdown:
{\"ranked\": [{\"title\": \"...\", \"year\": 2025, \"reasoning\": \"...\"}],
 \"excluded\": [{\"title\": \"...\", \"reason\": \"...\"}]}";

#[derive(Debug, Deserialize)]
struct RankPayload {
    #[serde(default)]
    ranked: Vec<RankedEntry>,
    #[serde(default)]
    excluded: Vec<ExcludedEntry>,
}

#[derive(Debug, Deserialize)]
struct RankedEntry {
    title: String,
    #[serde(default)]
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ExcludedEntry {
    title: String,
    #[serde(default)]
    reason: Option<String>,
}

pub struct RankerAgent {
    llm: Option<Arc<dyn ChatBackend>>,
    model: String,
    current_year: i32,
}

impl RankerAgent {
    pub fn new(llm: Option<Arc<dyn ChatBackend>>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            current_year: chrono::Utc::now().year(),
        }
    }

    pub fn with_current_year(
        llm: Option<Arc<dyn ChatBackend>>,
        model: impl Into<String>,
        current_year: i32,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            current_year,
        }
    }

    pub async fn run(&self, candidates: Vec<Candidate>, criteria: &str, limit: usize) -> AgentReport {
        if candidates.is_empty() {
            return AgentReport::failure(AgentKind::Rank, AGENT_NAME, "no candidates to rank");
        }

        let (ordered, method, issues) = match &self.llm {
            Some(llm) => match self.rank_with_model(llm.as_ref(), &candidates, criteria).await {
                Ok((ordered, issues)) => (ordered, "llm", issues),
                Err(detail) => {
                    warn!(error = %detail, "model ranking unusable, using deterministic order");
                    (
                        deterministic_order(&candidates, self.current_year),
                        "deterministic",
                        vec![format!("model ranking unavailable: {detail}")],
                    )
                }
            },
            None => (
                deterministic_order(&candidates, self.current_year),
                "deterministic",
                Vec::new(),
            ),
        };

        let total = ordered.len();
        let ranked: Vec<Candidate> = ordered.into_iter().take(limit).collect();
        debug!(method = method, input = candidates.len(), returned = ranked.len(), "ranking complete");

        let mut report = AgentReport::success(
            AgentKind::Rank,
            AGENT_NAME,
            format!("ranked {total} candidates, returning top {}", ranked.len()),
        );
        report.issues = issues;
        report.stat("method", method);
        report.stat("input", candidates.len() as u64);
        report.candidates = ranked;
        report
    }

    /// Ask the model for an ordering, then resolve each returned entry back
    /// to an input candidate by title/year identity. Returns an error string
    /// when the output is unusable.
    async fn rank_with_model(
        &self,
        llm: &dyn ChatBackend,
        candidates: &[Candidate],
        criteria: &str,
    ) -> Result<(Vec<Candidate>, Vec<String>), String> {
        let listing = serde_json::to_string_pretty(candidates).map_err(|e| e.to_string())?;
        let user_prompt = format!("Criteria: {criteria}\n\nMovies:\n{listing}");

        let request = ChatRequest::new(
            &self.model,
            vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user_prompt)],
        );

        let message = llm.chat(&request).await.map_err(|e| e.to_string())?;
        let payload: RankPayload = extract_json(message.text())
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str(&json).map_err(|e| e.to_string()))?;

        if payload.ranked.is_empty() {
            return Err("model returned an empty ranking".to_string());
        }

        let mut ordered: Vec<Candidate> = Vec::with_capacity(payload.ranked.len());
        for entry in &payload.ranked {
            let mut probe = Candidate::new(entry.title.clone());
            probe.year = entry.year;
            if let Some(found) = candidates
                .iter()
                .find(|c| c.same_release(&probe) && !ordered.iter().any(|o| o.same_release(c)))
            {
                ordered.push(found.clone());
            }
        }
        if ordered.is_empty() {
            return Err("model ranking matched none of the input candidates".to_string());
        }

        let issues = payload
            .excluded
            .iter()
            .map(|e| {
                format!(
                    "excluded '{}': {}",
                    e.title,
                    e.reason.as_deref().unwrap_or("no reason given")
                )
            })
            .collect();

        Ok((ordered, issues))
    }
}

/// Composite of recency, mainstream-appeal proxy (confidence), and any
/// quality signal collected during enrichment.
fn deterministic_order(candidates: &[Candidate], current_year: i32) -> Vec<Candidate> {
    let mut scored: Vec<(f64, Candidate)> = candidates
        .iter()
        .map(|candidate| (rank_score(candidate, current_year), candidate.clone()))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, c)| c).collect()
}

fn rank_score(candidate: &Candidate, current_year: i32) -> f64 {
    let quality = candidate
        .ratings
        .numeric
        .map(|n| n.value / 10.0)
        .or(candidate.ratings.critic_percent.map(|c| c / 100.0))
        .unwrap_or(0.5);
    let recency = match candidate.year {
        Some(year) => (1.0 - (current_year - year).max(0) as f64 * 0.3).clamp(0.0, 1.0),
        None => 0.3,
    };
    0.5 * candidate.confidence + 0.3 * recency + 0.2 * quality
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NumericRating;
    use crate::services::openai::LlmError;
    use async_trait::async_trait;

    struct FixedChat(String);

    #[async_trait]
    impl ChatBackend for FixedChat {
        async fn chat(&self, _request: &ChatRequest) -> Result<ChatMessage, LlmError> {
            Ok(ChatMessage::system(self.0.clone()))
        }
    }

    fn candidate(title: &str, year: i32, confidence: f64) -> Candidate {
        let mut c = Candidate::new(title);
        c.year = Some(year);
        c.confidence = confidence;
        c
    }

    #[tokio::test]
    async fn test_deterministic_order_without_model() {
        let mut strong = candidate("Strong", 2026, 0.9);
        strong.ratings.numeric = Some(NumericRating {
            value: 8.1,
            votes: 50_000,
        });
        let weak = candidate("Weak", 2020, 0.4);

        let agent = RankerAgent::with_current_year(None, "m", 2026);
        let report = agent.run(vec![weak, strong], "mainstream", 5).await;
        assert_eq!(report.candidates[0].title, "Strong");
        assert_eq!(report.stats["method"], "deterministic");
    }

    #[tokio::test]
    async fn test_limit_enforced() {
        let agent = RankerAgent::with_current_year(None, "m", 2026);
        let input: Vec<Candidate> = (0..8)
            .map(|i| candidate(&format!("Movie {i}"), 2026, 0.8))
            .collect();
        let report = agent.run(input, "", 3).await;
        assert_eq!(report.candidates.len(), 3);
    }

    #[tokio::test]
    async fn test_model_order_matched_by_identity() {
        let body = r#"{"ranked": [{"title": "second", "year": 2026},
                                  {"title": "First", "year": 2026},
                                  {"title": "Hallucinated", "year": 2030}],
                       "excluded": [{"title": "Third", "reason": "concert film"}]}"#;
        let agent =
            RankerAgent::with_current_year(Some(Arc::new(FixedChat(body.to_string()))), "m", 2026);
        let report = agent
            .run(
                vec![
                    candidate("First", 2026, 0.9),
                    candidate("Second", 2026, 0.8),
                    candidate("Third", 2026, 0.7),
                ],
                "",
                10,
            )
            .await;

        // Model order wins, hallucinated titles are dropped, exclusions are
        // surfaced as issues.
        let titles: Vec<&str> = report.candidates.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Second", "First"]);
        assert_eq!(report.stats["method"], "llm");
        assert!(report.issues[0].contains("concert film"));
    }

    #[tokio::test]
    async fn test_unusable_model_output_falls_back() {
        let agent = RankerAgent::with_current_year(
            Some(Arc::new(FixedChat("sorry, I cannot help".to_string()))),
            "m",
            2026,
        );
        let report = agent.run(vec![candidate("Only", 2026, 0.9)], "", 5).await;
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.stats["method"], "deterministic");
        assert!(!report.issues.is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_is_failure() {
        let agent = RankerAgent::with_current_year(None, "m", 2026);
        assert!(agent.run(Vec::new(), "", 5).await.is_failure());
    }
}
