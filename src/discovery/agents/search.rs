//! Search agent: free-text movie lookup through the language model's live
//! web search.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::discovery::protocol::{AgentKind, AgentReport};
use crate::discovery::validation::{clean_title, is_plausible_title};
use crate::models::Candidate;
use crate::services::openai::{ChatBackend, ChatMessage, ChatRequest, LlmError, extract_json};

const AGENT_NAME: &str = "search_movies";

const SYSTEM_PROMPT: &str = "\
You are a movie research assistant. Search the web for movies matching the \
request and answer with a short narrative followed by one fenced JSON block:

```json
{\"movies\": [{\"title\": \"Exact Title\", \"year\": 2025, \"confidence\": 0.9, \"overview\": \"one line\"}]}
```

Rules:
- Use EXACT official movie titles, no suffixes like \"(2025)\" or \"(remake)\"
- year: integer or null if unknown
- confidence: 0.0-1.0 relevance to the request
- Only wide theatrical releases; skip concerts, compilations, re-releases
- The JSON block MUST be valid and parseable";

/// Shape of the structured payload the model is asked to emit.
#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    movies: Vec<SearchMovie>,
}

#[derive(Debug, Deserialize)]
struct SearchMovie {
    title: String,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    overview: Option<String>,
}

pub struct SearchAgent {
    llm: Option<Arc<dyn ChatBackend>>,
    model: String,
}

impl SearchAgent {
    pub fn new(llm: Option<Arc<dyn ChatBackend>>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    pub async fn run(
        &self,
        query: &str,
        recency_hint: Option<&str>,
        max_results: usize,
        region: &str,
    ) -> AgentReport {
        if query.trim().is_empty() {
            return AgentReport::failure(AgentKind::Search, AGENT_NAME, "no search query provided");
        }
        let Some(llm) = &self.llm else {
            return AgentReport::failure(
                AgentKind::Search,
                AGENT_NAME,
                "no language model configured for search",
            );
        };

        let mut user_prompt = format!("Find up to {max_results} movies: {query}\nRegion: {region}");
        if let Some(hint) = recency_hint {
            user_prompt.push_str(&format!("\nFocus on: {hint}"));
        }

        let mut request = ChatRequest::new(
            &self.model,
            vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user_prompt)],
        );
        request.web_search = true;

        let message = match llm.chat(&request).await {
            Ok(message) => message,
            Err(LlmError::UnusableContent(detail)) => {
                return AgentReport::failure(
                    AgentKind::Search,
                    AGENT_NAME,
                    format!("search produced unusable content: {detail}"),
                );
            }
            Err(e) => {
                warn!(error = %e, "search request failed");
                return AgentReport::failure(
                    AgentKind::Search,
                    AGENT_NAME,
                    format!("search request failed: {e}"),
                );
            }
        };

        let payload: SearchPayload = match extract_json(message.text())
            .and_then(|json| {
                serde_json::from_str(&json)
                    .map_err(|e| LlmError::UnusableContent(format!("bad movies payload: {e}")))
            }) {
            Ok(payload) => payload,
            Err(e) => {
                return AgentReport::failure(
                    AgentKind::Search,
                    AGENT_NAME,
                    format!("search produced unusable content: {e}"),
                );
            }
        };

        let candidates: Vec<Candidate> = payload
            .movies
            .into_iter()
            .filter_map(|movie| {
                let title = clean_title(&movie.title);
                if !is_plausible_title(&title) {
                    return None;
                }
                let mut candidate = Candidate::new(title);
                candidate.year = movie.year;
                candidate.confidence = movie.confidence.unwrap_or(0.7).clamp(0.0, 1.0);
                candidate.overview = movie.overview;
                candidate.sources.push("web_search".to_string());
                Some(candidate)
            })
            .take(max_results)
            .collect();

        let mut report = AgentReport::success(
            AgentKind::Search,
            AGENT_NAME,
            format!("{} movies for '{query}'", candidates.len()),
        );
        report.stat("query", query);
        report.candidates = candidates;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::protocol::ReportStatus;
    use async_trait::async_trait;

    struct FixedChat(Result<String, fn() -> LlmError>);

    #[async_trait]
    impl ChatBackend for FixedChat {
        async fn chat(&self, _request: &ChatRequest) -> Result<ChatMessage, LlmError> {
            match &self.0 {
                Ok(text) => Ok(ChatMessage::system(text.clone())),
                Err(make) => Err(make()),
            }
        }
    }

    #[tokio::test]
    async fn test_search_parses_json_block() {
        let body = "Found a few strong openings.\n```json\n{\"movies\": [\
                    {\"title\": \"Weapons\", \"year\": 2025, \"confidence\": 0.92},\
                    {\"title\": \"Sign In\", \"year\": null}]}\n```";
        let agent = SearchAgent::new(Some(Arc::new(FixedChat(Ok(body.to_string())))), "test-model");
        let report = agent.run("new horror", None, 10, "US").await;
        assert_eq!(report.status, ReportStatus::Success);
        // The junk entry is filtered, the real one survives.
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].title, "Weapons");
        assert_eq!(report.candidates[0].sources, vec!["web_search".to_string()]);
    }

    #[tokio::test]
    async fn test_unusable_content_is_failure_not_panic() {
        let agent = SearchAgent::new(
            Some(Arc::new(FixedChat(Ok("I could not find anything.".to_string())))),
            "test-model",
        );
        let report = agent.run("anything", None, 10, "US").await;
        assert!(report.is_failure());
        assert!(report.summary.contains("unusable content"));
    }

    #[tokio::test]
    async fn test_request_failure_distinct_from_unusable() {
        let agent = SearchAgent::new(
            Some(Arc::new(FixedChat(Err(|| LlmError::Status {
                status: 503,
                body: "overloaded".to_string(),
            })))),
            "test-model",
        );
        let report = agent.run("anything", None, 10, "US").await;
        assert!(report.is_failure());
        assert!(report.summary.contains("request failed"));
    }

    #[tokio::test]
    async fn test_no_llm_configured() {
        let agent = SearchAgent::new(None, "test-model");
        let report = agent.run("anything", None, 10, "US").await;
        assert!(report.is_failure());
    }
}
