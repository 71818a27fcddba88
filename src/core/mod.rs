//! Core domain models
//!
//! This module defines the result envelope every agent produces, the
//! session that collects envelopes during a run, the execution mode and
//! the application configuration.

pub mod config;
pub mod envelope;
pub mod mode;
pub mod session;
pub mod stage;

pub use envelope::*;
pub use mode::ExecutionMode;
pub use session::*;
pub use stage::Stage;
