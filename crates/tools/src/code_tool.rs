//! Run Code Tool
//!
//! Executes model-written analysis code in the caller-supplied sandbox and
//! returns captured output lines. Sandbox failures become failure text the
//! model can react to.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tabletalk_core::CodeSandbox;
use tabletalk_llm::{ParameterSchema, ToolDefinition};

use crate::registry::{Tool, ToolName, ToolResult};

#[derive(Debug, Deserialize)]
struct CodeInput {
    code: String,
}

pub struct RunCodeTool {
    sandbox: Arc<dyn CodeSandbox>,
}

impl RunCodeTool {
    pub fn new(sandbox: Arc<dyn CodeSandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for RunCodeTool {
    fn name(&self) -> ToolName {
        ToolName::RunCode
    }

    fn definition(&self) -> ToolDefinition {
        let mut properties = HashMap::new();
        properties.insert(
            "code".to_string(),
            ParameterSchema::string(Some("The code to execute in the sandbox")),
        );
        ToolDefinition {
            name: self.name().as_str().to_string(),
            description: "Run analysis code in an isolated sandbox and return its printed \
                          output. Use this for computations that go beyond SQL, such as \
                          statistics or data reshaping. Print anything you want to see."
                .to_string(),
            input_schema: ParameterSchema::object(None, properties, vec!["code".to_string()]),
        }
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: CodeInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(e) => return ToolResult::err(format!("invalid input: {}", e)),
        };

        match self.sandbox.run(&input.code).await {
            Ok(lines) if lines.is_empty() => ToolResult::ok("(no output)"),
            Ok(lines) => ToolResult::ok(lines.join("\n")),
            Err(e) => ToolResult::err(format!("sandbox execution failed: {}", e)),
        }
    }
}
