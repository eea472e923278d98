//! Shared test doubles for the engine's service tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tabletalk_core::{
    CodeSandbox, ColumnProfile, CoreError, CoreResult, DatasetCatalog, DatasetRow, QueryExecutor,
};
use tabletalk_llm::{ParameterSchema, ToolDefinition};
use tabletalk_tools::{Tool, ToolName, ToolRegistry, ToolResult};

/// A tool that returns a scripted result and records its inputs.
pub struct RecordingTool {
    name: ToolName,
    result: ToolResult,
    calls: Mutex<Vec<serde_json::Value>>,
}

impl RecordingTool {
    pub fn new(name: ToolName, result: ToolResult) -> Self {
        Self {
            name,
            result,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<serde_json::Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> ToolName {
        self.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.as_str().to_string(),
            description: format!("test double for {}", self.name),
            input_schema: ParameterSchema::object(None, Default::default(), vec![]),
        }
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        self.calls.lock().unwrap().push(input);
        self.result.clone()
    }
}

pub fn registry_with(tools: Vec<Arc<RecordingTool>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    registry
}

/// Query executor returning fixed rows.
pub struct FixedRowsExecutor {
    pub rows: Vec<DatasetRow>,
}

#[async_trait]
impl QueryExecutor for FixedRowsExecutor {
    async fn execute(&self, _sql: &str) -> CoreResult<Vec<DatasetRow>> {
        Ok(self.rows.clone())
    }
}

/// Sandbox echoing its input back as one output line.
pub struct EchoSandbox;

#[async_trait]
impl CodeSandbox for EchoSandbox {
    async fn run(&self, code: &str) -> CoreResult<Vec<String>> {
        Ok(vec![format!("ran: {code}")])
    }
}

/// Catalog with fixed profiles, optionally failing.
pub struct FixedCatalog {
    pub profiles: Vec<ColumnProfile>,
    pub fail: bool,
}

impl FixedCatalog {
    pub fn empty() -> Self {
        Self {
            profiles: Vec::new(),
            fail: false,
        }
    }
}

#[async_trait]
impl DatasetCatalog for FixedCatalog {
    async fn column_profiles(&self, _dataset_id: &str) -> CoreResult<Vec<ColumnProfile>> {
        if self.fail {
            Err(CoreError::collaborator("catalog unavailable"))
        } else {
            Ok(self.profiles.clone())
        }
    }
}
