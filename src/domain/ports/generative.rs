//! Generative client port.
//!
//! The orchestrator consumes an opaque generative backend through this
//! trait. Two calling conventions are required: structured output
//! against a JSON schema, and a tool-call round that returns either a
//! final text or a batch of requested tool invocations. Both must
//! honor cancellation.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors a generative backend can surface.
#[derive(Debug, Clone, Error)]
pub enum GenerativeError {
    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("output did not match the requested schema: {0}")]
    InvalidOutput(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("request cancelled")]
    Cancelled,
}

impl GenerativeError {
    /// Transient errors are retried with backoff; the rest are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimit(_) | Self::Network(_) | Self::Timeout(_))
    }
}

/// Tool selection policy for a tool-call round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model must call at least one tool.
    Required,
    /// The model decides whether to call tools.
    Auto,
    /// The model must call the named tool.
    Specific(String),
}

/// Description of a callable tool, as presented to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object.
    pub parameters: Value,
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestedCall {
    pub tool: String,
    pub args: Value,
}

/// Outcome of one tool-call round.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallResponse {
    /// The model produced a final answer instead of calling tools.
    Final(String),
    /// The model requested these tool invocations.
    Calls(Vec<RequestedCall>),
}

/// Request for a tool-call round.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub system_prompt: String,
    /// Conversation so far: alternating user/assistant/tool-result turns,
    /// already rendered into transcript entries.
    pub transcript: Vec<TranscriptEntry>,
    pub tools: Vec<ToolDescriptor>,
    pub tool_choice: ToolChoice,
    pub temperature: f32,
}

/// One entry in a running agent transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEntry {
    User(String),
    Assistant(String),
    /// Result fed back for a requested call: (tool name, rendered result).
    ToolResult(String, String),
}

/// Opaque generative backend consumed by the agent runtime.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Ask for a value matching `schema`.
    async fn structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
        temperature: f32,
        cancel: &CancellationToken,
    ) -> Result<Value, GenerativeError>;

    /// Run one tool-call round.
    async fn tool_call(
        &self,
        request: ToolCallRequest,
        cancel: &CancellationToken,
    ) -> Result<ToolCallResponse, GenerativeError>;
}
