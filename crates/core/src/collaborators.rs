//! Collaborator Seams
//!
//! Trait interfaces for the external systems the engine depends on but does
//! not own: the storage query layer, the code sandbox, and the dataset
//! metadata catalog. Each invocation receives its own implementations; the
//! engine holds no ambient connection state.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// One stored row of an uploaded dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRow {
    /// Storage row id
    pub id: String,
    /// 1-based position within the source file
    pub row_number: u64,
    /// Flat key-value record of the row's cells
    pub data: BTreeMap<String, serde_json::Value>,
}

/// Inferred metadata for one dataset column, used only to enrich prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    /// Inferred type label, e.g. "number", "string", "date"
    pub inferred_type: String,
    /// Fraction of null cells, 0.0..=1.0
    pub null_ratio: f64,
    /// Count of distinct values observed
    pub unique_values: u64,
    /// A few representative values for the prompt
    #[serde(default)]
    pub sample_values: Vec<String>,
}

/// Executes guard-approved SQL against the row store.
///
/// Implementations receive only statements that passed the query guard;
/// they must not widen the scope themselves.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> CoreResult<Vec<DatasetRow>>;
}

/// Runs untrusted analysis code in a sandbox and captures its output.
///
/// Returns captured stdout/plot lines. A failed run surfaces as an error;
/// the calling tool renders it as failure text for the model, never a panic.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    async fn run(&self, code: &str) -> CoreResult<Vec<String>>;
}

/// Looks up column metadata for prompt enrichment.
///
/// Never used for authorization; the guard works from `DatasetScope` alone.
#[async_trait]
pub trait DatasetCatalog: Send + Sync {
    async fn column_profiles(&self, dataset_id: &str) -> CoreResult<Vec<ColumnProfile>>;
}
