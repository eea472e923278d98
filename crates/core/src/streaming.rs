//! Stream Event Protocol
//!
//! The outbound event protocol for one invocation: an append-only, ordered
//! sequence of tagged events delivered to a single consumer. A client
//! reconstructs full state by folding the sequence (reasoning spans, plan
//! updates carrying the cumulative step list, step-status transitions, chart
//! payloads, final prose deltas), never by random access.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::plan::PlanStep;

/// Chart family shared by the chart tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
}

impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChartType::Bar => write!(f, "bar"),
            ChartType::Line => write!(f, "line"),
            ChartType::Pie => write!(f, "pie"),
        }
    }
}

/// Chart metadata rendered by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartMetadata {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub title: String,
    pub description: String,
}

/// Chart configuration: metadata plus a flat map of per-series labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub metadata: ChartMetadata,
    /// Per-series label map, flattened alongside `metadata` on the wire.
    #[serde(flatten)]
    pub series_labels: HashMap<String, String>,
}

/// Payload of a `chart` event: flat data records plus rendering config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPayload {
    pub data: Vec<serde_json::Value>,
    pub config: ChartConfig,
}

/// Cumulative plan snapshot carried by a `plan-update` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub steps: Vec<PlanStep>,
}

/// Step progress carried by a `step-status` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatusData {
    pub id: String,
    pub plan_id: String,
    pub completed: bool,
}

/// One unit of the ordered outbound progress/result protocol.
///
/// Ordering across variants reflects actual production order, not
/// component-grouped order; the client renders a live timeline from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// A reasoning span has opened
    ReasoningStart { id: String },
    /// Reasoning text for an open span
    ReasoningDelta { id: String, delta: String },
    /// A reasoning span has closed
    ReasoningEnd { id: String },
    /// Cumulative plan snapshot (full steps array, not a diff)
    PlanUpdate { id: String, data: PlanSnapshot },
    /// A step transitioned between pending and completed
    StepStatus { id: String, data: StepStatusData },
    /// A chart produced by a visualization tool
    Chart { data: ChartPayload },
    /// Final prose, streamed token by token
    TextDelta { delta: String },
    /// Terminal event for an invocation-level fatal error
    Error { message: String },
}

/// Clone-able sender side of the event stream.
///
/// `send` reports whether the consumer is still attached; producers stop
/// emitting once the client has disconnected.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventSink {
    /// Create a sink/receiver pair with the given channel capacity.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Wrap an existing sender.
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    /// Send one event. Returns false when the consumer has gone away.
    pub async fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Whether the consumer has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
