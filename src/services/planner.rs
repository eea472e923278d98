//! Planning Decision and Plan Generation
//!
//! Two structured-output LLM calls: a one-shot classification of whether the
//! question needs multi-step work, and the generation of the step plan
//! itself. Both parse a JSON object out of free-form model output; plan
//! generation gets one repair retry with the parse error fed back, the
//! decision call does not.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tabletalk_core::{DatasetDescriptor, EventSink, Plan, PlanSnapshot, PlanStep, StreamEvent};
use tabletalk_llm::{LlmError, LlmProvider, LlmRequestOptions, Message, ToolDefinition};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::prompts;
use crate::utils::{AppError, AppResult};

/// Outcome of the planning classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningDecision {
    pub requires_planning: bool,
    pub reasoning: String,
}

/// Extract the first balanced JSON object from model output.
///
/// Models wrap JSON in prose or code fences more often than not; scan for
/// the first `{` and track brace depth, honoring string literals and
/// escapes, instead of trusting the whole response to be JSON.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_decision(text: &str) -> Result<PlanningDecision, LlmError> {
    let json = extract_json_object(text).ok_or_else(|| LlmError::ParseError {
        message: "planning decision contained no JSON object".to_string(),
    })?;
    serde_json::from_str(json).map_err(|e| LlmError::ParseError {
        message: format!("planning decision: {}", e),
    })
}

async fn call_with_cancel(
    provider: &Arc<dyn LlmProvider>,
    messages: Vec<Message>,
    system: String,
    cancel: &CancellationToken,
) -> AppResult<String> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AppError::Cancelled),
        response = provider.send_message(
            messages,
            Some(system),
            Vec::new(),
            LlmRequestOptions::default(),
        ) => response?,
    };
    response.content.ok_or_else(|| {
        AppError::Llm(LlmError::ParseError {
            message: "model returned an empty response".to_string(),
        })
    })
}

/// Classify whether the conversation needs a multi-step plan.
///
/// The decision's reasoning is streamed to the client as one reasoning span
/// with explicit start and end markers.
pub async fn decide_planning(
    provider: &Arc<dyn LlmProvider>,
    messages: &[Message],
    datasets: &[DatasetDescriptor],
    sink: &EventSink,
    cancel: &CancellationToken,
) -> AppResult<PlanningDecision> {
    let system = prompts::planning_decision_system(datasets);
    let text = call_with_cancel(provider, messages.to_vec(), system, cancel).await?;
    let decision = parse_decision(&text).map_err(AppError::Llm)?;

    let span_id = Uuid::new_v4().to_string();
    let delivered = sink
        .send(StreamEvent::ReasoningStart {
            id: span_id.clone(),
        })
        .await
        && sink
            .send(StreamEvent::ReasoningDelta {
                id: span_id.clone(),
                delta: decision.reasoning.clone(),
            })
            .await
        && sink.send(StreamEvent::ReasoningEnd { id: span_id }).await;
    if !delivered {
        // Consumer is gone; stop before spending more provider calls.
        return Err(AppError::Cancelled);
    }

    tracing::debug!(
        requires_planning = decision.requires_planning,
        "planning decision made"
    );
    Ok(decision)
}

fn parse_step(value: &serde_json::Value) -> Result<PlanStep, LlmError> {
    let task = value
        .get("task")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LlmError::ParseError {
            message: "step is missing 'task'".to_string(),
        })?;
    let instructions = value
        .get("instructions")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LlmError::ParseError {
            message: format!("step '{}' is missing 'instructions'", task),
        })?;
    let context = value
        .get("context")
        .and_then(|v| v.as_str())
        .map(String::from);
    let tools = value
        .get("tools")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|t| t.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Ok(PlanStep {
        id,
        task: task.to_string(),
        instructions: instructions.to_string(),
        context,
        tools,
    })
}

fn parse_steps(text: &str) -> Result<Vec<PlanStep>, LlmError> {
    let json = extract_json_object(text).ok_or_else(|| LlmError::ParseError {
        message: "plan contained no JSON object".to_string(),
    })?;
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| LlmError::ParseError {
            message: format!("plan: {}", e),
        })?;
    let steps = value
        .get("steps")
        .and_then(|v| v.as_array())
        .ok_or_else(|| LlmError::ParseError {
            message: "plan is missing a 'steps' array".to_string(),
        })?;
    steps.iter().map(parse_step).collect()
}

/// Generate a plan and publish it as cumulative `plan-update` snapshots.
///
/// An unparseable first response gets exactly one repair round with the
/// parse error quoted back; a second failure is fatal. An empty steps array
/// is not an error (the engine falls back to a direct response).
pub async fn generate_plan(
    provider: &Arc<dyn LlmProvider>,
    messages: &[Message],
    datasets: &[DatasetDescriptor],
    tools: &[ToolDefinition],
    sink: &EventSink,
    cancel: &CancellationToken,
) -> AppResult<Plan> {
    let system = prompts::plan_generation_system(datasets, tools);
    let text = call_with_cancel(provider, messages.to_vec(), system.clone(), cancel).await?;

    let steps = match parse_steps(&text) {
        Ok(steps) => steps,
        Err(parse_err) => {
            tracing::warn!(error = %parse_err, "plan parse failed, retrying once");
            let mut repair = messages.to_vec();
            repair.push(Message::assistant(text));
            repair.push(Message::user(format!(
                "Your previous response could not be parsed: {}. Respond again \
                 with ONLY the JSON object in the required shape.",
                parse_err
            )));
            let retry_text = call_with_cancel(provider, repair, system, cancel).await?;
            parse_steps(&retry_text).map_err(AppError::Llm)?
        }
    };

    let mut plan = Plan::new(Uuid::new_v4().to_string());
    for step in steps {
        plan.steps.push(step);
        let delivered = sink
            .send(StreamEvent::PlanUpdate {
                id: plan.id.clone(),
                data: PlanSnapshot {
                    steps: plan.steps.clone(),
                },
            })
            .await;
        if !delivered {
            return Err(AppError::Cancelled);
        }
    }

    tracing::info!(plan_id = %plan.id, steps = plan.steps.len(), "plan generated");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletalk_llm::MockProvider;
    use tokio::sync::mpsc::error::TryRecvError;

    fn provider_with(mock: MockProvider) -> Arc<dyn LlmProvider> {
        Arc::new(mock)
    }

    fn datasets() -> Vec<DatasetDescriptor> {
        vec![DatasetDescriptor {
            id: "ds-1".to_string(),
            name: "Sales".to_string(),
        }]
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object(r#"{"a":1}"#), Some(r#"{"a":1}"#));
        assert_eq!(
            extract_json_object("Sure! ```json\n{\"a\": {\"b\": 2}}\n```"),
            Some(r#"{"a": {"b": 2}}"#)
        );
        // Braces inside strings do not affect depth
        assert_eq!(
            extract_json_object(r#"{"a":"}{"}"#),
            Some(r#"{"a":"}{"}"#)
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{unclosed"), None);
    }

    #[tokio::test]
    async fn test_decision_streams_one_reasoning_span() {
        let mock = MockProvider::new();
        mock.push_text(
            r#"{"requiresPlanning": true, "reasoning": "Needs a query and a chart."}"#,
        );
        let provider = provider_with(mock);
        let (sink, mut rx) = EventSink::channel(16);
        let cancel = CancellationToken::new();

        let decision = decide_planning(
            &provider,
            &[Message::user("Show revenue trends")],
            &datasets(),
            &sink,
            &cancel,
        )
        .await
        .unwrap();

        assert!(decision.requires_planning);
        let start = rx.recv().await.unwrap();
        let delta = rx.recv().await.unwrap();
        let end = rx.recv().await.unwrap();
        let span_id = match &start {
            StreamEvent::ReasoningStart { id } => id.clone(),
            other => panic!("unexpected event: {other:?}"),
        };
        assert_eq!(
            delta,
            StreamEvent::ReasoningDelta {
                id: span_id.clone(),
                delta: "Needs a query and a chart.".to_string()
            }
        );
        assert_eq!(end, StreamEvent::ReasoningEnd { id: span_id });
    }

    #[tokio::test]
    async fn test_decision_parse_failure_is_fatal() {
        let mock = MockProvider::new();
        mock.push_text("I think planning is a good idea.");
        let provider = provider_with(mock);
        let (sink, _rx) = EventSink::channel(16);

        let result = decide_planning(
            &provider,
            &[Message::user("hi")],
            &datasets(),
            &sink,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            result,
            Err(AppError::Llm(LlmError::ParseError { .. }))
        ));
    }

    #[tokio::test]
    async fn test_plan_updates_are_cumulative() {
        let mock = MockProvider::new();
        mock.push_text(
            r#"{"steps": [
                {"task": "Query revenue", "instructions": "Aggregate by month", "tools": ["query_dataset"]},
                {"task": "Chart it", "instructions": "Plot the totals", "tools": ["bar_chart"]}
            ]}"#,
        );
        let provider = provider_with(mock);
        let (sink, mut rx) = EventSink::channel(16);

        let plan = generate_plan(
            &provider,
            &[Message::user("Show revenue")],
            &datasets(),
            &[],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(plan.steps.len(), 2);
        assert!(!plan.steps[0].id.is_empty());

        match rx.recv().await.unwrap() {
            StreamEvent::PlanUpdate { id, data } => {
                assert_eq!(id, plan.id);
                assert_eq!(data.steps.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            StreamEvent::PlanUpdate { data, .. } => {
                assert_eq!(data.steps.len(), 2);
                assert_eq!(data.steps[1].task, "Chart it");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_plan_parse_failure_gets_one_repair_round() {
        let mock = MockProvider::new();
        mock.push_text("Here is the plan you asked for!");
        mock.push_text(r#"{"steps": [{"task": "t", "instructions": "i"}]}"#);
        let provider = provider_with(mock);
        let (sink, _rx) = EventSink::channel(16);

        let plan = generate_plan(
            &provider,
            &[Message::user("go")],
            &datasets(),
            &[],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(plan.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_plan_second_parse_failure_is_fatal() {
        let mock = MockProvider::new();
        mock.push_text("nope");
        mock.push_text("still nope");
        let provider = provider_with(mock);
        let (sink, _rx) = EventSink::channel(16);

        let result = generate_plan(
            &provider,
            &[Message::user("go")],
            &datasets(),
            &[],
            &sink,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            result,
            Err(AppError::Llm(LlmError::ParseError { .. }))
        ));
    }

    #[tokio::test]
    async fn test_empty_steps_is_not_an_error() {
        let mock = MockProvider::new();
        mock.push_text(r#"{"steps": []}"#);
        let provider = provider_with(mock);
        let (sink, mut rx) = EventSink::channel(16);

        let plan = generate_plan(
            &provider,
            &[Message::user("hi")],
            &datasets(),
            &[],
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(plan.is_empty());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_disconnected_consumer_stops_the_pipeline() {
        let mock = Arc::new(MockProvider::new());
        mock.push_text(r#"{"requiresPlanning": true, "reasoning": "Needs work."}"#);
        let provider: Arc<dyn LlmProvider> = mock.clone();
        let (sink, rx) = EventSink::channel(16);
        drop(rx);

        let result = decide_planning(
            &provider,
            &[Message::user("hi")],
            &datasets(),
            &sink,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        // The decision call itself ran, but nothing after it should.
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_plan_updates_stop_after_disconnect() {
        let mock = Arc::new(MockProvider::new());
        mock.push_text(r#"{"steps": [{"task": "t", "instructions": "i"}]}"#);
        let provider: Arc<dyn LlmProvider> = mock.clone();
        let (sink, rx) = EventSink::channel(16);
        drop(rx);

        let result = generate_plan(
            &provider,
            &[Message::user("go")],
            &datasets(),
            &[],
            &sink,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let mock = MockProvider::new();
        mock.push_text(r#"{"steps": []}"#);
        let provider = provider_with(mock);
        let (sink, _rx) = EventSink::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = generate_plan(
            &provider,
            &[Message::user("hi")],
            &datasets(),
            &[],
            &sink,
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
