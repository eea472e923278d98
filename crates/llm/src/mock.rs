//! Mock Provider
//!
//! Scripted LlmProvider for tests. Responses are queued up front and popped
//! in order; every call is recorded so tests can assert on what the engine
//! sent (messages, system prompt, tool set, options).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, LlmStreamEvent, Message, StopReason,
    ToolCall, ToolDefinition, UsageStats,
};

/// One recorded provider invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub tool_names: Vec<String>,
    pub options: LlmRequestOptions,
    pub streaming: bool,
}

/// Scripted mock provider.
pub struct MockProvider {
    responses: Mutex<VecDeque<LlmResult<LlmResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
    model: String,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            model: "mock-model".to_string(),
        }
    }

    /// Queue a response to return on the next call.
    pub fn push_response(&self, response: LlmResult<LlmResponse>) {
        self.responses
            .lock()
            .expect("mock responses lock")
            .push_back(response);
    }

    /// Queue a plain text response.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push_response(Ok(Self::text_response(text)));
    }

    /// Queue a response containing a single tool call.
    pub fn push_tool_call(&self, name: impl Into<String>, arguments: serde_json::Value) {
        self.push_response(Ok(Self::tool_call_response(name, arguments)));
    }

    /// Queue an error.
    pub fn push_error(&self, error: LlmError) {
        self.push_response(Err(error));
    }

    /// Build a final text response.
    pub fn text_response(text: impl Into<String>) -> LlmResponse {
        LlmResponse {
            content: Some(text.into()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: UsageStats::default(),
            model: "mock-model".to_string(),
        }
    }

    /// Build a response requesting a single tool call.
    pub fn tool_call_response(name: impl Into<String>, arguments: serde_json::Value) -> LlmResponse {
        let name = name.into();
        LlmResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: format!("call_{}", name),
                name,
                arguments,
            }],
            stop_reason: StopReason::ToolUse,
            usage: UsageStats::default(),
            model: "mock-model".to_string(),
        }
    }

    /// All calls recorded so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("mock calls lock").clone()
    }

    /// Number of responses left in the script.
    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("mock responses lock").len()
    }

    fn record(
        &self,
        messages: &[Message],
        system: &Option<String>,
        tools: &[ToolDefinition],
        options: &LlmRequestOptions,
        streaming: bool,
    ) {
        self.calls.lock().expect("mock calls lock").push(RecordedCall {
            messages: messages.to_vec(),
            system: system.clone(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            options: options.clone(),
            streaming,
        });
    }

    fn pop(&self) -> LlmResult<LlmResponse> {
        self.responses
            .lock()
            .expect("mock responses lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Other {
                    message: "mock provider script exhausted".to_string(),
                })
            })
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        self.record(&messages, &system, &tools, &options, false);
        self.pop()
    }

    async fn stream_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        options: LlmRequestOptions,
        tx: mpsc::Sender<LlmStreamEvent>,
    ) -> LlmResult<LlmResponse> {
        self.record(&messages, &system, &tools, &options, true);
        let response = self.pop();
        match &response {
            Ok(resp) => {
                if let Some(content) = &resp.content {
                    // Replay in small chunks so consumers see multiple deltas
                    for chunk in content.as_bytes().chunks(8) {
                        let delta = String::from_utf8_lossy(chunk).to_string();
                        let _ = tx.send(LlmStreamEvent::TextDelta { delta }).await;
                    }
                }
                let _ = tx.send(LlmStreamEvent::Complete).await;
            }
            Err(err) => {
                let _ = tx
                    .send(LlmStreamEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
            }
        }
        response
    }
}
