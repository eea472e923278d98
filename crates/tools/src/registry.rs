//! Tool Registry
//!
//! Uniform tool contract plus the registry the engine offers to the LLM.
//! Tools never return Err for expected failures; a failed execution comes
//! back as a `ToolResult` with `success: false` so the model can read the
//! failure text and adapt in-conversation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tabletalk_llm::ToolDefinition;

/// The closed set of tool names the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    QueryDataset,
    RunCode,
    BarChart,
    LineChart,
    PieChart,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::QueryDataset => "query_dataset",
            ToolName::RunCode => "run_code",
            ToolName::BarChart => "bar_chart",
            ToolName::LineChart => "line_chart",
            ToolName::PieChart => "pie_chart",
        }
    }

    /// Parse a tool name; unknown names yield None (the caller drops them).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "query_dataset" => Some(ToolName::QueryDataset),
            "run_code" => Some(ToolName::RunCode),
            "bar_chart" => Some(ToolName::BarChart),
            "line_chart" => Some(ToolName::LineChart),
            "pie_chart" => Some(ToolName::PieChart),
            _ => None,
        }
    }

    /// Whether this tool renders a visualization.
    pub fn is_chart(&self) -> bool {
        matches!(
            self,
            ToolName::BarChart | ToolName::LineChart | ToolName::PieChart
        )
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged success/failure payload returned by every tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Text the model sees as the tool's output.
    pub fn to_content(&self) -> String {
        if self.success {
            self.output.clone().unwrap_or_default()
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// A capability the engine can offer to the LLM.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    /// Schema and description shown to the model.
    fn definition(&self) -> ToolDefinition;

    /// Execute with the model-supplied input. Expected failures (bad input,
    /// denied query, sandbox error) come back as `ToolResult::err`.
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
}

/// Insertion-ordered collection of tools for one invocation.
///
/// Dataset-scoped tools close over the caller's `DatasetScope` at
/// construction; the registry itself holds no authorization state.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
    order: Vec<ToolName>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Re-registering a name replaces the tool but keeps
    /// its original position.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        if self.tools.insert(name, tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name).cloned()
    }

    /// Registered tool names in registration order.
    pub fn names(&self) -> Vec<ToolName> {
        self.order.clone()
    }

    /// Definitions for the given subset, in registration order.
    pub fn definitions_for(&self, names: &[ToolName]) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter(|n| names.contains(n))
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.definition())
            .collect()
    }

    /// All definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.definition())
            .collect()
    }

    /// Resolve declared tool names, silently dropping unknown or
    /// unregistered ones.
    pub fn resolve(&self, names: &[String]) -> Vec<ToolName> {
        names
            .iter()
            .filter_map(|n| ToolName::parse(n))
            .filter(|n| self.tools.contains_key(n))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
