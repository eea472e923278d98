//! TableTalk Tools
//!
//! The capabilities the engine can offer to the LLM: the dataset query guard,
//! the uniform tool contract and registry, and the concrete tools (SQL query,
//! sandboxed code, chart rendering). Tools are constructed per invocation and
//! close over that invocation's scope and event sink.

pub mod chart_tool;
pub mod code_tool;
pub mod guard;
pub mod query_tool;
pub mod registry;

pub use chart_tool::ChartTool;
pub use code_tool::RunCodeTool;
pub use guard::{QueryRejection, ROWS_TABLE, ROW_CAP, SCOPE_COLUMN};
pub use query_tool::QueryDatasetTool;
pub use registry::{Tool, ToolName, ToolRegistry, ToolResult};
