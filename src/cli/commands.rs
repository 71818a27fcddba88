//! CLI command definitions

use crate::core::config::{AppConfig, ProviderKind};
use crate::core::{ExecutionMode, Stage};
use clap::Args;

/// Run the pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Repository URL to review, build and deploy
    #[arg(short, long)]
    pub repo: String,

    /// Cloud project (overrides provider.project)
    #[arg(short, long)]
    pub project: Option<String>,

    /// Cloud provider: gcp or azure
    #[arg(long)]
    pub provider: Option<ProviderKind>,

    /// Execution mode: simulation or production
    #[arg(short, long)]
    pub mode: Option<ExecutionMode>,

    /// Don't log envelopes to the history database
    #[arg(long)]
    pub no_history: bool,

    /// Print the pipeline report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(kind) = self.provider {
            config.provider.kind = kind;
        }
        if let Some(project) = &self.project {
            config.provider.project = Some(project.clone());
        }
        if self.no_history {
            config.history.enabled = false;
        }
        config
    }
}

/// Validate a configuration file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the configuration YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show logged sessions
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Show the latest envelopes of one stage
    #[arg(long)]
    pub stage: Option<Stage>,

    /// Show every envelope of one session
    #[arg(long)]
    pub session: Option<String>,

    /// Number of entries to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
