//! Agent request/report contract
//!
//! Agents accept a tagged `AgentRequest` and answer with an `AgentReport`.
//! The typed, schema-validated report is authoritative; the markdown
//! rendering exists so the orchestrator's language model can read results,
//! and the parser recovering a report from text trusts only the embedded
//! JSON block, tolerating a mangled narrative around it.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Candidate;

/// The capability a request targets; one dispatch point maps it to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Fetch,
    Search,
    Validate,
    Rank,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentKind::Fetch => "fetch",
            AgentKind::Search => "search",
            AgentKind::Validate => "validate",
            AgentKind::Rank => "rank",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Partial,
    Failure,
}

/// A structured request from the orchestrator to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AgentRequest {
    Fetch {
        /// Named ranked-list source from the configured source set.
        source: String,
        count: usize,
    },
    Search {
        query: String,
        #[serde(default)]
        recency_hint: Option<String>,
        max_results: usize,
        region: String,
    },
    Validate {
        candidates: Vec<Candidate>,
        min_confidence: f64,
    },
    Rank {
        candidates: Vec<Candidate>,
        criteria: String,
        limit: usize,
    },
}

impl AgentRequest {
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentRequest::Fetch { .. } => AgentKind::Fetch,
            AgentRequest::Search { .. } => AgentKind::Search,
            AgentRequest::Validate { .. } => AgentKind::Validate,
            AgentRequest::Rank { .. } => AgentKind::Rank,
        }
    }

    /// Short description for log lines and plan display.
    pub fn describe(&self) -> String {
        match self {
            AgentRequest::Fetch { source, count } => format!("fetch {count} from {source}"),
            AgentRequest::Search { query, .. } => format!("search '{query}'"),
            AgentRequest::Validate { candidates, .. } => {
                format!("validate {} candidates", candidates.len())
            }
            AgentRequest::Rank {
                candidates, limit, ..
            } => format!("rank {} candidates, limit {limit}", candidates.len()),
        }
    }

    /// Translate a model tool call into a request. Validate/rank operate on
    /// the orchestrator's accumulated candidate pool rather than arrays
    /// round-tripped through the model.
    pub fn from_tool_call(name: &str, arguments: &Value, pool: &[Candidate]) -> Result<Self> {
        let str_arg = |key: &str| {
            arguments
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let usize_arg =
            |key: &str, default: usize| arguments.get(key).and_then(Value::as_u64).map_or(default, |n| n as usize);

        match name {
            "fetch_movies" => Ok(AgentRequest::Fetch {
                source: str_arg("source").context("fetch_movies requires a source")?,
                count: usize_arg("count", 30),
            }),
            "search_movies" => Ok(AgentRequest::Search {
                query: str_arg("query").context("search_movies requires a query")?,
                recency_hint: str_arg("recency_hint"),
                max_results: usize_arg("max_results", 20),
                region: str_arg("region").unwrap_or_else(|| "US".to_string()),
            }),
            "validate_movies" => Ok(AgentRequest::Validate {
                candidates: pool.to_vec(),
                min_confidence: arguments
                    .get("min_confidence")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
            }),
            "rank_movies" => Ok(AgentRequest::Rank {
                candidates: pool.to_vec(),
                criteria: str_arg("criteria").unwrap_or_default(),
                limit: usize_arg("limit", 10),
            }),
            other => anyhow::bail!("unknown tool: {other}"),
        }
    }
}

/// Tool definitions handed to the orchestrator's language model. Mirrors
/// `from_tool_call` above.
pub fn tool_definitions(source_names: &[String]) -> Vec<Value> {
    vec![
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "fetch_movies",
                "description": "Fetch a ranked movie list from one named source. Falls back cleanly if the source is unavailable.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "source": {"type": "string", "enum": source_names, "description": "Ranked-list source to fetch"},
                        "count": {"type": "integer", "description": "Maximum entries to return", "default": 30}
                    },
                    "required": ["source"]
                }
            }
        }),
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "search_movies",
                "description": "Search the web for movies matching criteria (current releases, trends, genres).",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "recency_hint": {"type": "string", "description": "Time frame to focus on, e.g. 'this month'"},
                        "max_results": {"type": "integer", "default": 20},
                        "region": {"type": "string", "default": "US"}
                    },
                    "required": ["query"]
                }
            }
        }),
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "validate_movies",
                "description": "Validate the candidates gathered so far: drop concert films, compilations, re-releases, limited releases, and duplicates.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "min_confidence": {"type": "number", "description": "Drop candidates below this confidence", "default": 0.0}
                    }
                }
            }
        }),
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "rank_movies",
                "description": "Rank the validated candidates by mainstream appeal and quality; call last.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "criteria": {"type": "string"},
                        "limit": {"type": "integer"}
                    },
                    "required": ["limit"]
                }
            }
        }),
    ]
}

/// Structured report from one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    pub kind: AgentKind,
    pub agent: String,
    pub status: ReportStatus,
    pub summary: String,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub stats: BTreeMap<String, Value>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl AgentReport {
    pub fn success(kind: AgentKind, agent: &str, summary: impl Into<String>) -> Self {
        Self::with_status(kind, agent, ReportStatus::Success, summary)
    }

    /// A failed call reports an explicit failure marker and carries no
    /// candidates - there is no partially-filled success state.
    pub fn failure(kind: AgentKind, agent: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        let mut report = Self::with_status(
            kind,
            agent,
            ReportStatus::Failure,
            format!("Failed: {error}"),
        );
        report.issues.push(error);
        report
    }

    pub fn partial(
        kind: AgentKind,
        agent: &str,
        summary: impl Into<String>,
        issues: Vec<String>,
    ) -> Self {
        let mut report = Self::with_status(kind, agent, ReportStatus::Partial, summary);
        report.issues = issues;
        report
    }

    fn with_status(
        kind: AgentKind,
        agent: &str,
        status: ReportStatus,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            agent: agent.to_string(),
            status,
            summary: summary.into(),
            candidates: Vec::new(),
            issues: Vec::new(),
            stats: BTreeMap::new(),
            elapsed_ms: 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == ReportStatus::Failure
    }

    pub fn stat(&mut self, key: &str, value: impl Into<Value>) {
        self.stats.insert(key.to_string(), value.into());
    }

    /// Render the report as markdown for the orchestrator model: a readable
    /// narrative followed by the authoritative JSON block.
    pub fn to_markdown(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        lines.push(format!("## Agent Report: {}", self.agent));
        lines.push(String::new());
        lines.push(format!(
            "**Status**: {}",
            serde_json::to_value(self.status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        ));
        lines.push(format!("**Summary**: {}", self.summary));
        lines.push(String::new());

        if !self.candidates.is_empty() {
            lines.push("### Movies Found".to_string());
            lines.push(String::new());
            lines.push("| Title | Year | Confidence | Sources |".to_string());
            lines.push("|-------|------|------------|---------|".to_string());
            for candidate in self.candidates.iter().take(20) {
                let year = candidate
                    .year
                    .map(|y| y.to_string())
                    .unwrap_or_else(|| "TBA".to_string());
                lines.push(format!(
                    "| {} | {} | {:.2} | {} |",
                    candidate.title,
                    year,
                    candidate.confidence,
                    candidate.sources.join(", ")
                ));
            }
            if self.candidates.len() > 20 {
                lines.push(format!(
                    "| ... | | | ({} more) |",
                    self.candidates.len() - 20
                ));
            }
            lines.push(String::new());
        }

        if !self.issues.is_empty() {
            lines.push("### Issues".to_string());
            for issue in &self.issues {
                lines.push(format!("- {issue}"));
            }
            lines.push(String::new());
        }

        lines.push("### Stats".to_string());
        lines.push(format!("- Execution time: {}ms", self.elapsed_ms));
        lines.push(format!("- Candidates: {}", self.candidates.len()));
        for (key, value) in &self.stats {
            lines.push(format!("- {key}: {value}"));
        }
        lines.push(String::new());

        lines.push("### Data (JSON)".to_string());
        lines.push("```json".to_string());
        lines.push(serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string()));
        lines.push("```".to_string());

        lines.join("\n")
    }

    /// Recover a report from markdown. The fenced JSON block is
    /// authoritative; a malformed narrative around it parses fine, and a
    /// missing block is an error.
    pub fn from_markdown(markdown: &str) -> Result<Self> {
        static JSON_BLOCK: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"(?s)```json\s*\n(.+?)\n```").unwrap());

        let block = JSON_BLOCK
            .captures(markdown)
            .and_then(|c| c.get(1))
            .context("no JSON data block found in report")?;

        serde_json::from_str(block.as_str()).context("report JSON block is not a valid report")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_roundtrip() {
        let mut report = AgentReport::success(AgentKind::Fetch, "fetch_movies", "12 entries");
        let mut candidate = Candidate::new("Weapons");
        candidate.year = Some(2025);
        candidate.sources.push("rt_theaters".to_string());
        report.candidates.push(candidate);
        report.stat("parsed", 12);
        report.elapsed_ms = 84;

        let rendered = report.to_markdown();
        let parsed = AgentReport::from_markdown(&rendered).unwrap();
        assert_eq!(parsed.kind, AgentKind::Fetch);
        assert_eq!(parsed.status, ReportStatus::Success);
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.candidates[0].title, "Weapons");
        assert_eq!(parsed.stats["parsed"], 12);
    }

    #[test]
    fn test_parse_tolerates_mangled_narrative() {
        let report = AgentReport::success(AgentKind::Search, "search_movies", "ok");
        let rendered = report.to_markdown();
        // Corrupt everything before the JSON block.
        let mangled = format!(
            "$$$ garbage || not markdown\n{}",
            &rendered[rendered.find("### Data").unwrap()..]
        );
        let parsed = AgentReport::from_markdown(&mangled).unwrap();
        assert_eq!(parsed.agent, "search_movies");
    }

    #[test]
    fn test_parse_without_json_block_fails() {
        assert!(AgentReport::from_markdown("## Agent Report: x\nno data").is_err());
    }

    #[test]
    fn test_failure_report_carries_marker_and_no_candidates() {
        let report = AgentReport::failure(AgentKind::Fetch, "fetch_movies", "timeout");
        assert!(report.is_failure());
        assert!(report.candidates.is_empty());
        assert_eq!(report.issues, vec!["timeout".to_string()]);
    }

    #[test]
    fn test_from_tool_call_fetch() {
        let args = serde_json::json!({"source": "imdb_meter", "count": 25});
        let request = AgentRequest::from_tool_call("fetch_movies", &args, &[]).unwrap();
        match request {
            AgentRequest::Fetch { source, count } => {
                assert_eq!(source, "imdb_meter");
                assert_eq!(count, 25);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_from_tool_call_uses_pool_for_rank() {
        let pool = vec![Candidate::new("A"), Candidate::new("B")];
        let args = serde_json::json!({"limit": 5});
        let request = AgentRequest::from_tool_call("rank_movies", &args, &pool).unwrap();
        match request {
            AgentRequest::Rank {
                candidates, limit, ..
            } => {
                assert_eq!(candidates.len(), 2);
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_from_tool_call_unknown_tool() {
        assert!(AgentRequest::from_tool_call("drop_tables", &Value::Null, &[]).is_err());
    }
}
