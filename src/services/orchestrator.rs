//! Agent Engine
//!
//! The invocation entry point: wires the planning decision, plan generation,
//! step execution, and final synthesis into one sequential pipeline per
//! conversation turn. Each invocation closes over its own scope, registry,
//! and event sink; concurrent invocations share nothing mutable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tabletalk_core::{
    ActiveFilters, ChartType, CodeSandbox, DatasetCatalog, DatasetDescriptor, DatasetScope,
    EventSink, QueryExecutor, StreamEvent,
};
use tabletalk_llm::{LlmProvider, Message, OpenAiCompatProvider, ProviderConfig};
use tabletalk_tools::{ChartTool, QueryDatasetTool, RunCodeTool, ToolRegistry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::services::{planner, step_executor, synthesis};
use crate::utils::{AppError, AppResult};

fn default_max_tool_rounds() -> usize {
    4
}

fn default_event_buffer() -> usize {
    64
}

/// Engine configuration, injected at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// LLM provider settings
    pub provider: ProviderConfig,
    /// Ceiling on internal tool-call rounds per step or direct response
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Outbound event channel capacity
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            max_tool_rounds: default_max_tool_rounds(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// One conversation turn to answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// Conversation so far, latest user message last
    pub messages: Vec<Message>,
    /// Datasets the caller selected; defines the authorized scope
    #[serde(default)]
    pub datasets: Vec<DatasetDescriptor>,
    /// Active presentation-layer filters, referenced by the synthesis prompt
    #[serde(default)]
    pub filters: ActiveFilters,
}

/// External systems one invocation talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub query: Arc<dyn QueryExecutor>,
    pub sandbox: Arc<dyn CodeSandbox>,
    pub catalog: Arc<dyn DatasetCatalog>,
}

/// The orchestration engine. Holds only configuration and the provider;
/// everything invocation-specific is constructed inside `answer`.
pub struct AgentEngine {
    config: EngineConfig,
    provider: Arc<dyn LlmProvider>,
}

impl AgentEngine {
    /// Create an engine over an explicit provider (tests inject a mock here).
    pub fn new(config: EngineConfig, provider: Arc<dyn LlmProvider>) -> Self {
        Self { config, provider }
    }

    /// Create an engine with the HTTP provider described by the config.
    pub fn from_config(config: EngineConfig) -> Self {
        let provider = Arc::new(OpenAiCompatProvider::new(config.provider.clone()));
        Self { config, provider }
    }

    /// Create the outbound event channel sized per configuration.
    pub fn event_channel(&self) -> (EventSink, mpsc::Receiver<StreamEvent>) {
        EventSink::channel(self.config.event_buffer)
    }

    /// Answer one conversation turn, streaming progress through `sink`.
    ///
    /// Cancellation resolves to `Ok(())` without an error event; any other
    /// fatal failure emits a terminal `error` event and is returned.
    pub async fn answer(
        &self,
        request: AnswerRequest,
        collaborators: Collaborators,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> AppResult<()> {
        match self.run(request, collaborators, &sink, &cancel).await {
            Ok(()) => Ok(()),
            Err(AppError::Cancelled) => {
                tracing::debug!("invocation cancelled");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "invocation failed");
                sink.send(StreamEvent::Error {
                    message: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: AnswerRequest,
        collaborators: Collaborators,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        if request.messages.is_empty() {
            return Err(AppError::validation("conversation has no messages"));
        }

        let scope = DatasetScope::from_descriptors(&request.datasets);
        let registry = build_registry(&scope, &collaborators, sink);
        let mut conversation = request.messages.clone();

        let decision = planner::decide_planning(
            &self.provider,
            &conversation,
            &request.datasets,
            sink,
            cancel,
        )
        .await?;

        if decision.requires_planning {
            let plan = planner::generate_plan(
                &self.provider,
                &conversation,
                &request.datasets,
                &registry.definitions(),
                sink,
                cancel,
            )
            .await?;

            if plan.is_empty() {
                tracing::info!("empty plan, falling back to direct response");
                return self
                    .direct_response(&mut conversation, &request.datasets, &registry, sink, cancel)
                    .await;
            }

            step_executor::execute_plan(
                &self.provider,
                &plan,
                &mut conversation,
                &registry,
                self.config.max_tool_rounds,
                sink,
                cancel,
            )
            .await?;

            synthesis::synthesize(
                &self.provider,
                &conversation,
                &request.datasets,
                &request.filters,
                &collaborators.catalog,
                sink,
                cancel,
            )
            .await
        } else {
            self.direct_response(&mut conversation, &request.datasets, &registry, sink, cancel)
                .await
        }
    }

    /// Single streamed agentic exchange with the full tool set.
    async fn direct_response(
        &self,
        conversation: &mut Vec<Message>,
        datasets: &[DatasetDescriptor],
        registry: &ToolRegistry,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        let all_tools = registry.names();
        step_executor::run_tool_rounds(
            &self.provider,
            conversation,
            crate::services::prompts::direct_response_system(datasets),
            registry,
            &all_tools,
            self.config.max_tool_rounds,
            Some(sink),
            cancel,
        )
        .await
    }
}

/// Build the per-invocation tool registry. Dataset-scoped tools close over
/// the caller's scope; chart tools close over the event sink.
fn build_registry(
    scope: &DatasetScope,
    collaborators: &Collaborators,
    sink: &EventSink,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(QueryDatasetTool::new(
        scope.clone(),
        collaborators.query.clone(),
    )));
    registry.register(Arc::new(RunCodeTool::new(collaborators.sandbox.clone())));
    for chart_type in [ChartType::Bar, ChartType::Line, ChartType::Pie] {
        registry.register(Arc::new(ChartTool::new(chart_type, sink.clone())));
    }
    registry
}
