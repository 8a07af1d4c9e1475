//! Scripted generative client for tests.
//!
//! Responses are queued per method and popped in order; an exhausted
//! queue yields an `InvalidOutput` error so a test that under-scripts
//! fails loudly instead of hanging.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::ports::{
    GenerativeClient, GenerativeError, ToolCallRequest, ToolCallResponse,
};

#[derive(Default)]
pub struct MockGenerativeClient {
    structured: Mutex<VecDeque<Result<Value, GenerativeError>>>,
    tool_calls: Mutex<VecDeque<Result<ToolCallResponse, GenerativeError>>>,
    seen_tool_requests: Mutex<Vec<ToolCallRequest>>,
}

impl MockGenerativeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_structured(&self, response: Result<Value, GenerativeError>) {
        self.structured.lock().unwrap().push_back(response);
    }

    pub fn push_tool_call(&self, response: Result<ToolCallResponse, GenerativeError>) {
        self.tool_calls.lock().unwrap().push_back(response);
    }

    /// Tool-call requests the runtime actually issued, for assertions.
    pub fn seen_tool_requests(&self) -> Vec<ToolCallRequest> {
        self.seen_tool_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeClient for MockGenerativeClient {
    async fn structured(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _schema: &Value,
        _temperature: f32,
        cancel: &CancellationToken,
    ) -> Result<Value, GenerativeError> {
        if cancel.is_cancelled() {
            return Err(GenerativeError::Cancelled);
        }
        self.structured
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(GenerativeError::InvalidOutput(
                    "mock structured queue exhausted".to_string(),
                ))
            })
    }

    async fn tool_call(
        &self,
        request: ToolCallRequest,
        cancel: &CancellationToken,
    ) -> Result<ToolCallResponse, GenerativeError> {
        if cancel.is_cancelled() {
            return Err(GenerativeError::Cancelled);
        }
        self.seen_tool_requests.lock().unwrap().push(request);
        self.tool_calls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(GenerativeError::InvalidOutput(
                    "mock tool-call queue exhausted".to_string(),
                ))
            })
    }
}
