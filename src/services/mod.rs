//! Engine services: orchestration, planning, step execution, synthesis.

pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod step_executor;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod test_support;

pub use orchestrator::{AgentEngine, AnswerRequest, Collaborators, EngineConfig};
pub use planner::PlanningDecision;
