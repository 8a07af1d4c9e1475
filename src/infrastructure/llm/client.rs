//! HTTP generative client (messages API).
//!
//! Implements the `GenerativeClient` port over a messages-style HTTP
//! API with connection pooling, retry with backoff for transient
//! failures, and cancellation via `tokio::select!`. Structured output
//! is obtained by forcing a single tool call whose input schema is the
//! requested schema.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::models::LlmConfig;
use crate::domain::ports::{
    GenerativeClient, GenerativeError, RequestedCall, ToolCallRequest, ToolCallResponse,
    ToolChoice, TranscriptEntry,
};

use super::errors::LlmApiError;
use super::retry::RetryPolicy;

const API_VERSION: &str = "2023-06-01";
const STRUCTURED_TOOL: &str = "structured_output";

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Value,
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { name: String, input: Value },
    #[serde(other)]
    Other,
}

/// Production client for the generative API.
pub struct HttpGenerativeClient {
    http: reqwest::Client,
    config: LlmConfig,
    retry: RetryPolicy,
}

impl HttpGenerativeClient {
    pub fn new(config: LlmConfig, retry: RetryPolicy) -> Result<Self, LlmApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| LlmApiError::NetworkError(e.to_string()))?;

        Ok(Self {
            http,
            config,
            retry,
        })
    }

    async fn send(&self, request: &WireRequest) -> Result<WireResponse, LlmApiError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| LlmApiError::AuthFailed("no api key configured".to_string()))?;

        let response = self
            .http
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmApiError::Timeout(self.config.timeout_secs)
                } else {
                    LlmApiError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmApiError::from_status(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| LlmApiError::UnexpectedResponse(e.to_string()))
    }

    async fn send_cancellable(
        &self,
        request: WireRequest,
        cancel: &CancellationToken,
    ) -> Result<WireResponse, LlmApiError> {
        tokio::select! {
            result = self.retry.execute(|| self.send(&request)) => result,
            _ = cancel.cancelled() => Err(LlmApiError::Cancelled),
        }
    }
}

fn to_generative_error(e: LlmApiError) -> GenerativeError {
    match e {
        LlmApiError::RateLimited(detail) => GenerativeError::RateLimit(detail),
        LlmApiError::Timeout(secs) => GenerativeError::Timeout(secs),
        LlmApiError::Cancelled => GenerativeError::Cancelled,
        LlmApiError::UnexpectedResponse(detail) => GenerativeError::InvalidOutput(detail),
        other => GenerativeError::Network(other.to_string()),
    }
}

fn render_transcript(transcript: &[TranscriptEntry]) -> Vec<WireMessage> {
    transcript
        .iter()
        .map(|entry| match entry {
            TranscriptEntry::User(text) => WireMessage { role: "user", content: json!(text) },
            TranscriptEntry::Assistant(text) => {
                WireMessage { role: "assistant", content: json!(text) }
            }
            TranscriptEntry::ToolResult(tool, result) => WireMessage {
                role: "user",
                content: json!(format!("[{tool} result]\n{result}")),
            },
        })
        .collect()
}

#[async_trait]
impl GenerativeClient for HttpGenerativeClient {
    async fn structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
        temperature: f32,
        cancel: &CancellationToken,
    ) -> Result<Value, GenerativeError> {
        let request = WireRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature,
            system: system_prompt.to_string(),
            messages: vec![WireMessage { role: "user", content: json!(user_prompt) }],
            tools: vec![WireTool {
                name: STRUCTURED_TOOL.to_string(),
                description: "Emit the final structured result.".to_string(),
                input_schema: schema.clone(),
            }],
            tool_choice: Some(json!({"type": "tool", "name": STRUCTURED_TOOL})),
        };

        let response = self
            .send_cancellable(request, cancel)
            .await
            .map_err(to_generative_error)?;

        response
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::ToolUse { name, input } if name == STRUCTURED_TOOL => Some(input),
                _ => None,
            })
            .ok_or_else(|| {
                GenerativeError::InvalidOutput("no structured output in response".to_string())
            })
    }

    async fn tool_call(
        &self,
        request: ToolCallRequest,
        cancel: &CancellationToken,
    ) -> Result<ToolCallResponse, GenerativeError> {
        let tool_choice = match &request.tool_choice {
            ToolChoice::Required => Some(json!({"type": "any"})),
            ToolChoice::Auto => Some(json!({"type": "auto"})),
            ToolChoice::Specific(name) => Some(json!({"type": "tool", "name": name})),
        };

        let wire = WireRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: request.temperature,
            system: request.system_prompt.clone(),
            messages: render_transcript(&request.transcript),
            tools: request
                .tools
                .iter()
                .map(|t| WireTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
            tool_choice,
        };

        let response = self
            .send_cancellable(wire, cancel)
            .await
            .map_err(to_generative_error)?;

        let mut calls = Vec::new();
        let mut text = String::new();
        for block in response.content {
            match block {
                ContentBlock::ToolUse { name, input } => {
                    calls.push(RequestedCall { tool: name, args: input });
                }
                ContentBlock::Text { text: t } => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&t);
                }
                ContentBlock::Other => {}
            }
        }

        if calls.is_empty() {
            Ok(ToolCallResponse::Final(text))
        } else {
            Ok(ToolCallResponse::Calls(calls))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_block_parsing() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "thinking..."},
                {"type": "tool_use", "id": "tu_1", "name": "write_file", "input": {"path": "a.rs"}}
            ]
        });
        let response: WireResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.content.len(), 2);
        assert!(matches!(
            &response.content[1],
            ContentBlock::ToolUse { name, .. } if name == "write_file"
        ));
    }

    #[test]
    fn test_transcript_rendering() {
        let messages = render_transcript(&[
            TranscriptEntry::User("do it".to_string()),
            TranscriptEntry::Assistant("on it".to_string()),
            TranscriptEntry::ToolResult("read_file".to_string(), "contents".to_string()),
        ]);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].role, "user");
    }
}
