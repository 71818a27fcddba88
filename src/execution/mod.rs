//! Pipeline orchestration

pub mod engine;
pub mod gate;

pub use engine::{EventHandler, ExecutionEvent, PipelineOrchestrator, PipelineOutcome, PipelineReport};
pub use gate::{deploy_gate, GateVerdict};
