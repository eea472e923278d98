//! OpenAI-Compatible Provider
//!
//! Implementation of the LlmProvider trait against the chat-completions API
//! shape. The base URL is injected through `ProviderConfig`, so the same
//! provider serves any OpenAI-compatible endpoint; the engine itself never
//! names a vendor.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::provider::{parse_http_error, LlmProvider};
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, LlmStreamEvent, Message, MessageContent,
    MessageRole, ProviderConfig, StopReason, ToolCall, ToolCallMode, ToolDefinition, UsageStats,
};

/// Default chat-completions endpoint
const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Request timeout; tool-call rounds bound total latency, not this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// OpenAI-compatible chat-completions provider
pub struct OpenAiCompatProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn endpoint(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        messages: &[Message],
        system: Option<&str>,
        tools: &[ToolDefinition],
        stream: bool,
        options: &LlmRequestOptions,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": options.temperature_override.unwrap_or(self.config.temperature),
            "stream": stream,
        });

        let mut wire_messages: Vec<serde_json::Value> = Vec::new();
        if let Some(sys) = system {
            wire_messages.push(serde_json::json!({"role": "system", "content": sys}));
        }
        for msg in messages {
            wire_messages.extend(message_to_wire(msg));
        }
        body["messages"] = serde_json::json!(wire_messages);

        if !tools.is_empty() && options.tool_call_mode != ToolCallMode::None {
            let wire_tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(wire_tools);
            if options.tool_call_mode == ToolCallMode::Required {
                body["tool_choice"] = serde_json::json!("required");
            }
        }

        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }

        body
    }

    async fn post(&self, body: &serde_json::Value) -> LlmResult<reqwest::Response> {
        let mut request = self.client.post(self.endpoint()).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status.as_u16(), &text, self.name()));
        }
        Ok(response)
    }
}

/// Convert a Message to wire format. Tool results become separate
/// `role: tool` messages; everything else is one message.
fn message_to_wire(message: &Message) -> Vec<serde_json::Value> {
    let role = match message.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    };

    let mut out = Vec::new();
    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<serde_json::Value> = Vec::new();

    for content in &message.content {
        match content {
            MessageContent::Text { text } => text_parts.push(text),
            MessageContent::ToolUse { id, name, input } => {
                tool_calls.push(serde_json::json!({
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": input.to_string(),
                    }
                }));
            }
            MessageContent::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                out.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                }));
            }
        }
    }

    if !text_parts.is_empty() || !tool_calls.is_empty() {
        let mut msg = serde_json::json!({
            "role": role,
            "content": text_parts.join("\n"),
        });
        if !tool_calls.is_empty() {
            msg["tool_calls"] = serde_json::json!(tool_calls);
        }
        // Tool results were already emitted as their own messages
        out.insert(0, msg);
    }

    out
}

// Wire response shapes

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn tool_calls_from_wire(calls: Vec<WireToolCall>) -> LlmResult<Vec<ToolCall>> {
    calls
        .into_iter()
        .map(|tc| {
            let arguments: serde_json::Value = if tc.function.arguments.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&tc.function.arguments).map_err(|e| LlmError::ParseError {
                    message: format!("tool call arguments: {}", e),
                })?
            };
            Ok(ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments,
            })
        })
        .collect()
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &'static str {
        "openai-compat"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let body = self.build_request_body(&messages, system.as_deref(), &tools, false, &options);
        let response = self.post(&body).await?;

        let wire: WireResponse = response.json().await.map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })?;
        let choice = wire.choices.into_iter().next().ok_or(LlmError::ParseError {
            message: "response contained no choices".to_string(),
        })?;

        let tool_calls = tool_calls_from_wire(choice.message.tool_calls)?;
        let stop_reason = match choice.finish_reason.as_deref() {
            Some(reason) => StopReason::from(reason),
            None if !tool_calls.is_empty() => StopReason::ToolUse,
            None => StopReason::EndTurn,
        };
        let usage = wire.usage.unwrap_or_default();

        Ok(LlmResponse {
            content: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls,
            stop_reason,
            usage: UsageStats {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
            model: wire.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }

    async fn stream_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        options: LlmRequestOptions,
        tx: mpsc::Sender<LlmStreamEvent>,
    ) -> LlmResult<LlmResponse> {
        let body = self.build_request_body(&messages, system.as_deref(), &tools, true, &options);
        let mut response = self.post(&body).await?;

        let mut buffer = String::new();
        let mut accumulator = StreamAccumulator::new(&self.config.model);

        while let Some(chunk) = response.chunk().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })? {
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);
                if let Some(data) = line.strip_prefix("data: ") {
                    if data == "[DONE]" {
                        let _ = tx.send(LlmStreamEvent::Complete).await;
                        return Ok(accumulator.finish());
                    }
                    accumulator.ingest(data, &tx).await?;
                }
            }
        }

        let _ = tx.send(LlmStreamEvent::Complete).await;
        Ok(accumulator.finish())
    }
}

/// Accumulates SSE delta chunks into one complete response.
struct StreamAccumulator {
    content: String,
    tool_calls: HashMap<u32, (String, String, String)>, // index -> (id, name, arguments)
    finish_reason: Option<String>,
    usage: UsageStats,
    model: String,
}

impl StreamAccumulator {
    fn new(model: &str) -> Self {
        Self {
            content: String::new(),
            tool_calls: HashMap::new(),
            finish_reason: None,
            usage: UsageStats::default(),
            model: model.to_string(),
        }
    }

    async fn ingest(
        &mut self,
        data: &str,
        tx: &mpsc::Sender<LlmStreamEvent>,
    ) -> LlmResult<()> {
        let chunk: serde_json::Value =
            serde_json::from_str(data).map_err(|e| LlmError::ParseError {
                message: format!("stream chunk: {}", e),
            })?;

        if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
            self.usage.input_tokens = usage
                .get("prompt_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            self.usage.output_tokens = usage
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
        }

        let Some(choice) = chunk.get("choices").and_then(|c| c.get(0)) else {
            return Ok(());
        };

        if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
            self.finish_reason = Some(reason.to_string());
        }

        let Some(delta) = choice.get("delta") else {
            return Ok(());
        };

        if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                self.content.push_str(text);
                let _ = tx
                    .send(LlmStreamEvent::TextDelta {
                        delta: text.to_string(),
                    })
                    .await;
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(|v| v.as_array()) {
            for call in calls {
                let index = call.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                let entry = self.tool_calls.entry(index).or_default();
                if let Some(id) = call.get("id").and_then(|v| v.as_str()) {
                    entry.0.push_str(id);
                }
                if let Some(function) = call.get("function") {
                    if let Some(name) = function.get("name").and_then(|v| v.as_str()) {
                        entry.1.push_str(name);
                    }
                    if let Some(args) = function.get("arguments").and_then(|v| v.as_str()) {
                        entry.2.push_str(args);
                    }
                }
            }
        }

        Ok(())
    }

    fn finish(self) -> LlmResponse {
        let mut indices: Vec<u32> = self.tool_calls.keys().copied().collect();
        indices.sort_unstable();
        let tool_calls: Vec<ToolCall> = indices
            .into_iter()
            .filter_map(|i| self.tool_calls.get(&i).cloned())
            .map(|(id, name, arguments)| ToolCall {
                id,
                name,
                arguments: serde_json::from_str(&arguments)
                    .unwrap_or_else(|_| serde_json::json!({})),
            })
            .collect();

        let stop_reason = match self.finish_reason.as_deref() {
            Some(reason) => StopReason::from(reason),
            None if !tool_calls.is_empty() => StopReason::ToolUse,
            None => StopReason::EndTurn,
        };

        LlmResponse {
            content: if self.content.is_empty() {
                None
            } else {
                Some(self.content)
            },
            tool_calls,
            stop_reason,
            usage: self.usage,
            model: self.model,
        }
    }
}
