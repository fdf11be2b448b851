//! Completion service seam and the bundled OpenAI-compatible client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::SearchConfig;
use crate::error::SearchError;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// What the service answered, short of a transport or protocol failure.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionReply {
    /// Candidate completions in service order. May be empty.
    Candidates(Vec<String>),
    /// The service reported an error in an otherwise successful response.
    Error { message: String },
}

/// A language-model completion backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionReply, SearchError>;
}

// ============================================================================
// OpenRouterClient
// ============================================================================

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

/// Chat-completions client (OpenRouter by default) using bearer auth.
pub struct OpenRouterClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenRouterClient {
    /// Fails with a configuration error when no API key is configured.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let api_key = config.require_api_key()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.completion.timeout_secs))
            .build()
            .map_err(|e| SearchError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.completion.endpoint.clone(),
            model: config.completion.model.clone(),
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionService for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionReply, SearchError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.user },
            ],
            max_tokens: request.max_tokens,
        };

        tracing::info!(model = %self.model, "Sending completion request");

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let json = decode_body(status, &text)?;
        tracing::debug!(response = %json, "Completion response");

        interpret_response(&json)
    }
}

/// Reject non-success statuses, then parse the body as JSON.
fn decode_body(status: reqwest::StatusCode, text: &str) -> Result<Value, SearchError> {
    if !status.is_success() {
        tracing::error!(status = %status, body = %text, "Completion service returned an error status");
        return Err(SearchError::Service(text.to_string()));
    }

    serde_json::from_str(text).map_err(|e| {
        tracing::error!(error = %e, "Completion response is not JSON");
        SearchError::Service(format!("Invalid response from AI service: {e}"))
    })
}

/// Classify a decoded chat-completions body.
pub fn interpret_response(body: &Value) -> Result<CompletionReply, SearchError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .unwrap_or("Unknown API error")
            .to_string();
        tracing::error!(%message, "Completion service reported an error");
        return Ok(CompletionReply::Error { message });
    }

    let Some(choices) = body.get("choices").and_then(Value::as_array) else {
        tracing::error!(response = %body, "Completion response has no choices");
        return Err(SearchError::Service(
            "Invalid response from AI service. Please try again later.".into(),
        ));
    };

    let candidates = choices
        .iter()
        .filter_map(|c| {
            c.pointer("/message/content")
                .or_else(|| c.get("text"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
        .collect::<Vec<_>>();

    // Choices without text content (e.g. tool calls only) carry nothing to parse.
    let dropped = choices.len() - candidates.len();
    if dropped > 0 {
        tracing::warn!(dropped, "Ignoring completion choices without text content");
    }
    if candidates.is_empty() {
        tracing::warn!(choices = choices.len(), "Completion service returned no candidates");
    }
    Ok(CompletionReply::Candidates(candidates))
}
