//! Plan and Step Contracts
//!
//! A Plan is an ordered list of Steps generated for a query that needs
//! multi-step work. Steps are appended while the generator streams them;
//! after generation completes the plan is immutable. Step completion is
//! tracked through emitted `step-status` events, never by mutating the plan,
//! so consumers reconstruct state by replaying the event sequence.

use serde::{Deserialize, Serialize};

/// One unit of planned work.
///
/// `tools` holds tool names as produced by the LLM. Names that do not match
/// a registered tool are silently dropped at execution time, never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    /// Unique step id (assigned when the model omits one)
    pub id: String,
    /// Short name of the work
    pub task: String,
    /// What the model should do during this step
    pub instructions: String,
    /// Optional extra context for this step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Tool names this step may use (subset of the registry)
    #[serde(default)]
    pub tools: Vec<String>,
}

/// An ordered sequence of steps generated for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Generated plan id
    pub id: String,
    /// Steps in execution order
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Create an empty plan with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
        }
    }

    /// Whether the generator produced no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_new_is_empty() {
        let plan = Plan::new("plan-1");
        assert_eq!(plan.id, "plan-1");
        assert!(plan.is_empty());
    }

    #[test]
    fn test_step_serialization_camel_case() {
        let step = PlanStep {
            id: "step-1".to_string(),
            task: "Query revenue".to_string(),
            instructions: "Aggregate monthly revenue".to_string(),
            context: None,
            tools: vec!["query_dataset".to_string()],
        };
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains("\"task\":\"Query revenue\""));
        // Absent context is omitted entirely
        assert!(!json.contains("context"));
    }

    #[test]
    fn test_step_deserialization_defaults() {
        let step: PlanStep = serde_json::from_str(
            r#"{"id":"s1","task":"t","instructions":"i"}"#,
        )
        .unwrap();
        assert!(step.tools.is_empty());
        assert!(step.context.is_none());
    }
}
