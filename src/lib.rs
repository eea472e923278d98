//! TableTalk
//!
//! Agent orchestration engine for answering natural-language questions over
//! tabular datasets. One invocation takes a conversation plus the caller's
//! selected datasets, decides whether multi-step planning is needed, runs
//! the plan (or a direct tool-assisted response), and streams ordered
//! progress events to a single consumer.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabletalk::{AgentEngine, AnswerRequest, Collaborators, EngineConfig};
//! use tabletalk_llm::Message;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(collaborators: Collaborators) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = AgentEngine::from_config(EngineConfig::default());
//! let (sink, mut events) = engine.event_channel();
//! let request = AnswerRequest {
//!     messages: vec![Message::user("How did revenue trend this year?")],
//!     datasets: vec![],
//!     filters: Default::default(),
//! };
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{}", serde_json::to_string(&event).unwrap());
//!     }
//! });
//! engine
//!     .answer(request, collaborators, sink, CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod services;
pub mod utils;

pub use services::{AgentEngine, AnswerRequest, Collaborators, EngineConfig, PlanningDecision};
pub use utils::{AppError, AppResult};

// Re-export the workspace crates so downstream callers need only one
// dependency.
pub use tabletalk_core as contracts;
pub use tabletalk_llm as llm;
pub use tabletalk_tools as tools;
