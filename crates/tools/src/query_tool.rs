//! Query Dataset Tool
//!
//! Lets the model run read-only SQL against the rows table. Every query
//! passes through the guard before it reaches the executor; rejections are
//! returned as failure text so the model can correct and retry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tabletalk_core::{DatasetScope, QueryExecutor};
use tabletalk_llm::{ParameterSchema, ToolDefinition};

use crate::guard;
use crate::registry::{Tool, ToolName, ToolResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryInput {
    sql_query: String,
}

/// SQL query tool, closed over one invocation's authorized scope.
pub struct QueryDatasetTool {
    scope: DatasetScope,
    executor: Arc<dyn QueryExecutor>,
}

impl QueryDatasetTool {
    pub fn new(scope: DatasetScope, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { scope, executor }
    }
}

#[async_trait]
impl Tool for QueryDatasetTool {
    fn name(&self) -> ToolName {
        ToolName::QueryDataset
    }

    fn definition(&self) -> ToolDefinition {
        let example_id = self
            .scope
            .ids()
            .first()
            .map(String::as_str)
            .unwrap_or("<dataset-id>");
        let description = format!(
            "Run a read-only SQL query against the '{table}' table. \
             Every query MUST filter on {column} using one of the authorized \
             dataset ids: {scope}. Only SELECT statements are allowed; results \
             are capped at {cap} rows unless you specify a lower LIMIT. \
             Example: SELECT * FROM {table} WHERE {column} = '{example}' LIMIT 10",
            table = guard::ROWS_TABLE,
            column = guard::SCOPE_COLUMN,
            scope = self.scope,
            cap = guard::ROW_CAP,
            example = example_id,
        );

        let mut properties = HashMap::new();
        properties.insert(
            "sqlQuery".to_string(),
            ParameterSchema::string(Some("The SQL SELECT statement to execute")),
        );
        ToolDefinition {
            name: self.name().as_str().to_string(),
            description,
            input_schema: ParameterSchema::object(None, properties, vec!["sqlQuery".to_string()]),
        }
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: QueryInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(e) => return ToolResult::err(format!("invalid input: {}", e)),
        };

        let statement = match guard::validate(&input.sql_query, &self.scope) {
            Ok(statement) => statement,
            Err(rejection) => return ToolResult::err(rejection.to_string()),
        };

        match self.executor.execute(&statement).await {
            Ok(rows) => {
                let payload = serde_json::json!({
                    "rowCount": rows.len(),
                    "rows": rows,
                });
                match serde_json::to_string(&payload) {
                    Ok(text) => ToolResult::ok(text),
                    Err(e) => ToolResult::err(format!("failed to serialize rows: {}", e)),
                }
            }
            Err(e) => ToolResult::err(format!("query execution failed: {}", e)),
        }
    }
}
