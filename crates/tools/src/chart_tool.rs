//! Chart Tools
//!
//! One tool per chart family (bar, line, pie), all sharing an input shape of
//! flat data records plus rendering config. Executing a chart tool emits a
//! `chart` event through the sink as a side effect and returns a short
//! confirmation; the chart itself never travels through the conversation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tabletalk_core::{
    ChartConfig, ChartMetadata, ChartPayload, ChartType, EventSink, StreamEvent,
};
use tabletalk_llm::{ParameterSchema, ToolDefinition};

use crate::registry::{Tool, ToolName, ToolResult};

#[derive(Debug, Deserialize)]
struct ChartInput {
    data: Vec<serde_json::Value>,
    config: ChartConfigInput,
}

#[derive(Debug, Deserialize)]
struct ChartConfigInput {
    title: String,
    #[serde(default)]
    description: String,
    /// Per-series label map; everything beyond title/description
    #[serde(flatten)]
    series_labels: HashMap<String, String>,
}

/// A visualization tool for one chart family.
pub struct ChartTool {
    chart_type: ChartType,
    events: EventSink,
}

impl ChartTool {
    pub fn new(chart_type: ChartType, events: EventSink) -> Self {
        Self { chart_type, events }
    }

    fn tool_name(chart_type: ChartType) -> ToolName {
        match chart_type {
            ChartType::Bar => ToolName::BarChart,
            ChartType::Line => ToolName::LineChart,
            ChartType::Pie => ToolName::PieChart,
        }
    }
}

#[async_trait]
impl Tool for ChartTool {
    fn name(&self) -> ToolName {
        Self::tool_name(self.chart_type)
    }

    fn definition(&self) -> ToolDefinition {
        let mut config_properties = HashMap::new();
        config_properties.insert(
            "title".to_string(),
            ParameterSchema::string(Some("Chart title shown to the user")),
        );
        config_properties.insert(
            "description".to_string(),
            ParameterSchema::string(Some("One-sentence description of what the chart shows")),
        );

        let mut properties = HashMap::new();
        properties.insert(
            "data".to_string(),
            ParameterSchema::array(
                Some("Flat records to plot, one object per data point"),
                ParameterSchema::object(None, HashMap::new(), vec![]),
            ),
        );
        properties.insert(
            "config".to_string(),
            ParameterSchema::object(
                Some("Rendering config: title, description, and a label per series key"),
                config_properties,
                vec!["title".to_string()],
            ),
        );

        ToolDefinition {
            name: self.name().as_str().to_string(),
            description: format!(
                "Render a {} chart from data you have already gathered. Provide flat data \
                 records and a config with a title, a description, and a display label for \
                 each series key present in the data.",
                self.chart_type
            ),
            input_schema: ParameterSchema::object(
                None,
                properties,
                vec!["data".to_string(), "config".to_string()],
            ),
        }
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: ChartInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(e) => return ToolResult::err(format!("invalid input: {}", e)),
        };
        if input.data.is_empty() {
            return ToolResult::err("chart data must contain at least one record");
        }

        let payload = ChartPayload {
            data: input.data,
            config: ChartConfig {
                metadata: ChartMetadata {
                    chart_type: self.chart_type,
                    title: input.config.title.clone(),
                    description: input.config.description,
                },
                series_labels: input.config.series_labels,
            },
        };

        if !self.events.send(StreamEvent::Chart { data: payload }).await {
            return ToolResult::err("client disconnected before the chart could be delivered");
        }

        ToolResult::ok(format!(
            "Rendered {} chart '{}' for the user.",
            self.chart_type, input.config.title
        ))
    }
}
