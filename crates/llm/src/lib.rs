//! TableTalk LLM
//!
//! Provider-agnostic LLM abstraction: the `LlmProvider` trait, conversation
//! and tool-definition types, the internal streaming event protocol, one
//! concrete OpenAI-compatible HTTP provider, and a scripted mock provider
//! for tests. The engine treats the model as a black box that can produce
//! free text, structured planning output, and tool calls.

pub mod mock;
pub mod openai_compat;
pub mod provider;
pub mod types;

pub use mock::MockProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{parse_http_error, LlmProvider};
pub use types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, LlmStreamEvent, Message, MessageContent,
    MessageRole, ParameterSchema, ProviderConfig, StopReason, ToolCall, ToolCallMode,
    ToolDefinition, UsageStats,
};
