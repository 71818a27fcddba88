//! agentops - a DevOps pipeline orchestrator built from a chain of agents

pub mod agents;
pub mod cli;
pub mod core;
pub mod execution;
pub mod llm;
pub mod persistence;
pub mod process;
pub mod provider;
pub mod source;

// Re-export commonly used types
pub use agents::{Agent, AgentContext};
pub use core::config::AppConfig;
pub use core::{ExecutionMode, ResultEnvelope, Session, Stage, StageResult, Status};
pub use execution::{ExecutionEvent, PipelineOrchestrator, PipelineOutcome, PipelineReport};
pub use persistence::{InMemorySessionStore, SessionLog, SessionLogger, SessionStore};
