//! TableTalk Core
//!
//! Shared contracts for the TableTalk workspace: the plan/step schema, the
//! outbound stream-event protocol, dataset scoping types, and the trait seams
//! for external collaborators (storage queries, code sandbox, dataset
//! catalog). This crate is a leaf dependency for everything else and stays
//! dependency-light.

pub mod collaborators;
pub mod error;
pub mod plan;
pub mod scope;
pub mod streaming;

pub use collaborators::{CodeSandbox, ColumnProfile, DatasetCatalog, DatasetRow, QueryExecutor};
pub use error::{CoreError, CoreResult};
pub use plan::{Plan, PlanStep};
pub use scope::{ActiveFilters, DatasetDescriptor, DatasetScope, FilterValue};
pub use streaming::{
    ChartConfig, ChartMetadata, ChartPayload, ChartType, EventSink, PlanSnapshot, StepStatusData,
    StreamEvent,
};
