//! Dataset Scope and Filters
//!
//! `DatasetScope` is the set of dataset identifiers one invocation is
//! authorized to query. It is supplied by the caller and enforced by the
//! query guard; it is never derived from untrusted query text.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A dataset the caller selected for this invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Stable dataset identifier
    pub id: String,
    /// Human-readable dataset name
    pub name: String,
}

/// The authorized set of dataset identifiers for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetScope {
    ids: Vec<String>,
}

impl DatasetScope {
    /// Build a scope from raw dataset ids.
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    /// Build a scope from caller-supplied descriptors.
    pub fn from_descriptors(datasets: &[DatasetDescriptor]) -> Self {
        Self {
            ids: datasets.iter().map(|d| d.id.clone()).collect(),
        }
    }

    /// Whether the given dataset id is authorized.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }

    /// The authorized ids, in caller order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Whether the scope authorizes nothing.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl fmt::Display for DatasetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.ids.join(", "))
    }
}

/// A filter value the presentation layer has active; referenced only by the
/// synthesis system prompt, never by the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterValue {
    /// Categorical value set
    Values { values: Vec<String> },
    /// Inclusive date range (ISO-8601 dates)
    DateRange { start: String, end: String },
}

/// Active filters keyed by column name. BTreeMap keeps prompt rendering
/// deterministic.
pub type ActiveFilters = BTreeMap<String, FilterValue>;
