//! Step Execution
//!
//! Sequential execution of a generated plan, plus the bounded tool-call
//! round loop shared with the direct-response path. Steps run strictly in
//! order; every message a step produces is appended to the running
//! conversation so later steps and the final synthesis see it.

use std::sync::Arc;

use tabletalk_core::{EventSink, Plan, StepStatusData, StreamEvent};
use tabletalk_llm::{
    LlmProvider, LlmRequestOptions, LlmResponse, LlmStreamEvent, Message, MessageContent,
    MessageRole, ToolDefinition,
};
use tabletalk_tools::{ToolName, ToolRegistry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::services::prompts;
use crate::utils::{AppError, AppResult};

/// One streamed LLM turn: text deltas are forwarded to the client sink as
/// they arrive, the complete response (including any tool calls) is returned.
pub(crate) async fn stream_turn(
    provider: &Arc<dyn LlmProvider>,
    messages: Vec<Message>,
    system: String,
    tools: Vec<ToolDefinition>,
    options: LlmRequestOptions,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> AppResult<LlmResponse> {
    if sink.is_closed() {
        return Err(AppError::Cancelled);
    }
    let (tx, mut rx) = mpsc::channel(32);
    let forward_sink = sink.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let LlmStreamEvent::TextDelta { delta } = event {
                if !forward_sink.send(StreamEvent::TextDelta { delta }).await {
                    break;
                }
            }
        }
    });

    // On cancellation the in-flight request future is dropped, which closes
    // the channel and lets the forwarder drain out.
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        response = provider.stream_message(messages, Some(system), tools, options, tx) => {
            response.map_err(AppError::from)
        }
    };
    let _ = forwarder.await;
    result
}

async fn plain_turn(
    provider: &Arc<dyn LlmProvider>,
    messages: Vec<Message>,
    system: String,
    tools: Vec<ToolDefinition>,
    options: LlmRequestOptions,
    cancel: &CancellationToken,
) -> AppResult<LlmResponse> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        response = provider.send_message(messages, Some(system), tools, options) => {
            Ok(response?)
        }
    }
}

/// Run a bounded sequence of LLM tool-call rounds over `conversation`.
///
/// Each round sends the conversation, appends the assistant's reply, and if
/// the reply requested tools, executes them and appends their results before
/// looping. The loop ends when the model stops calling tools or the round
/// ceiling is reached; exhausting the ceiling is not an error.
///
/// When `tool_names` is exactly one visualization tool, the first round
/// forces that tool's invocation; later rounds relax to automatic choice so
/// the model can close with a remark.
///
/// With `stream_to` set, every round's text streams to the client as
/// `text-delta` events (the direct-response path); without it, rounds are
/// silent working turns (step execution).
pub async fn run_tool_rounds(
    provider: &Arc<dyn LlmProvider>,
    conversation: &mut Vec<Message>,
    system: String,
    registry: &ToolRegistry,
    tool_names: &[ToolName],
    max_rounds: usize,
    stream_to: Option<&EventSink>,
    cancel: &CancellationToken,
) -> AppResult<()> {
    let force_chart = tool_names.len() == 1 && tool_names[0].is_chart();
    let mut chart_emitted = false;

    for round in 0..max_rounds {
        let options = if force_chart && round == 0 && !chart_emitted {
            LlmRequestOptions::required_tool()
        } else {
            LlmRequestOptions::default()
        };
        let tools = registry.definitions_for(tool_names);

        let response = match stream_to {
            Some(sink) => {
                stream_turn(
                    provider,
                    conversation.clone(),
                    system.clone(),
                    tools,
                    options,
                    sink,
                    cancel,
                )
                .await?
            }
            None => {
                plain_turn(
                    provider,
                    conversation.clone(),
                    system.clone(),
                    tools,
                    options,
                    cancel,
                )
                .await?
            }
        };

        let mut content = Vec::new();
        if let Some(text) = &response.content {
            if !text.is_empty() {
                content.push(MessageContent::Text { text: text.clone() });
            }
        }
        for call in &response.tool_calls {
            content.push(MessageContent::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.arguments.clone(),
            });
        }
        if !content.is_empty() {
            conversation.push(Message {
                role: MessageRole::Assistant,
                content,
            });
        }

        if !response.has_tool_calls() {
            return Ok(());
        }

        for call in response.tool_calls {
            let tool = ToolName::parse(&call.name).and_then(|name| registry.get(name));
            match tool {
                Some(tool) => {
                    tracing::debug!(tool = %call.name, round, "executing tool");
                    let result = tool.execute(call.arguments).await;
                    if tool.name().is_chart() && result.success {
                        chart_emitted = true;
                    }
                    conversation.push(Message::tool_result(
                        call.id,
                        result.to_content(),
                        !result.success,
                    ));
                }
                None => {
                    conversation.push(Message::tool_result(
                        call.id,
                        format!("Error: unknown tool '{}'", call.name),
                        true,
                    ));
                }
            }
        }
    }

    tracing::debug!(max_rounds, "tool round ceiling reached");
    Ok(())
}

/// Execute every step of the plan in order, emitting `step-status`
/// transitions around each one.
pub async fn execute_plan(
    provider: &Arc<dyn LlmProvider>,
    plan: &Plan,
    conversation: &mut Vec<Message>,
    registry: &ToolRegistry,
    max_rounds: usize,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> AppResult<()> {
    let step_count = plan.steps.len();
    for (index, step) in plan.steps.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let delivered = sink
            .send(StreamEvent::StepStatus {
                id: step.id.clone(),
                data: StepStatusData {
                    id: step.id.clone(),
                    plan_id: plan.id.clone(),
                    completed: false,
                },
            })
            .await;
        if !delivered {
            // Client disconnected between steps; abandon the rest of the plan.
            return Err(AppError::Cancelled);
        }

        let resolved = registry.resolve(&step.tools);
        tracing::debug!(step = %step.task, tools = ?resolved, "executing step");

        conversation.push(Message::user(prompts::step_task_message(step)));
        run_tool_rounds(
            provider,
            conversation,
            prompts::step_system(index, step_count),
            registry,
            &resolved,
            max_rounds,
            None,
            cancel,
        )
        .await?;

        let delivered = sink
            .send(StreamEvent::StepStatus {
                id: step.id.clone(),
                data: StepStatusData {
                    id: step.id.clone(),
                    plan_id: plan.id.clone(),
                    completed: true,
                },
            })
            .await;
        if !delivered {
            return Err(AppError::Cancelled);
        }
    }
    Ok(())
}
