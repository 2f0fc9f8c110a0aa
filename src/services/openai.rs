//! OpenAI API client (language-model boundary)
//!
//! Chat-completion interface used by the orchestrator's reasoning loop and
//! by the search/rank agents, with optional tool definitions and live web
//! search. Two failure modes are kept distinct: the request failing, and the
//! request succeeding but returning content no parser can use.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::rate_limiter::RateLimitedClient;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Language-model boundary errors. `UnusableContent` means the request
/// itself succeeded - retrying it verbatim is unlikely to help, while a
/// `RequestFailed`/`Status` error may be transient.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model request failed: {0}")]
    RequestFailed(#[from] anyhow::Error),
    #[error("language model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("language model returned unusable content: {0}")]
    UnusableContent(String),
}

/// One message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    /// A tool result message answering one tool call.
    pub fn tool_result(call_id: &str, tool_name: &str, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.to_string()),
            name: Some(tool_name.to_string()),
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments; may be truncated or malformed, callers parse
    /// defensively.
    #[serde(default)]
    pub arguments: String,
}

/// One chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Tool definitions (function schemas); empty disables tool calling.
    pub tools: Vec<Value>,
    /// Ask the provider to ground the response with live web search.
    pub web_search: bool,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            web_search: false,
            temperature: 0.3,
        }
    }
}

/// The request/response boundary the orchestrator and agents depend on.
/// Tests substitute a fixed-response double.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage, LlmError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI chat-completions client.
pub struct OpenAiClient {
    client: RateLimitedClient,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: RateLimitedClient::for_language_model(),
            api_key,
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage, LlmError> {
        let mut payload = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
        });
        if !request.tools.is_empty() {
            payload["tools"] = Value::Array(request.tools.clone());
            payload["tool_choice"] = Value::String("auto".to_string());
        }
        if request.web_search {
            payload["web_search_options"] = serde_json::json!({});
        }

        debug!(model = %request.model, messages = request.messages.len(), "chat request");

        let auth = format!("Bearer {}", self.api_key);
        let response = self
            .client
            .post_json(CHAT_COMPLETIONS_URL, &[("Authorization", auth.as_str())], &payload)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::UnusableContent(format!("undecodable response body: {e}")))?;

        let message = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::UnusableContent("response carried no choices".to_string()))?;

        if message.content.is_none() && message.tool_calls.is_empty() {
            return Err(LlmError::UnusableContent(
                "response carried neither content nor tool calls".to_string(),
            ));
        }

        Ok(message)
    }
}

/// Extract a JSON payload from model output that may be wrapped in markdown
/// code fences or surrounded by prose.
pub fn extract_json(response: &str) -> Result<String, LlmError> {
    let trimmed = response.trim();

    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() >= 3 {
            // Skip the opening ```json line and the closing fence.
            let json_lines: Vec<&str> = lines[1..lines.len() - 1]
                .iter()
                .filter(|l| !l.trim().is_empty())
                .copied()
                .collect();
            return Ok(json_lines.join("\n"));
        }
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed.to_string());
    }

    if let Some(start) = trimmed.find('{')
        && let Some(end) = trimmed.rfind('}')
        && start < end
    {
        return Ok(trimmed[start..=end].to_string());
    }

    warn!("no JSON payload found in model output");
    Err(LlmError::UnusableContent(
        "no JSON payload found in model output".to_string(),
    ))
}
