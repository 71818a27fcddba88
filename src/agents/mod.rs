//! Pipeline agents
//!
//! Each agent wraps one external capability behind the envelope contract:
//! it starts from an [`EnvelopeSkeleton`], runs its simulation or production
//! path, merges the overrides, validates, logs exactly once and returns.
//! Agents never return errors; failures become `status=error` envelopes.

pub mod build;
pub mod build_failure;
pub mod code_review;
pub mod deploy;
pub mod monitor;
pub mod regression;
pub mod rollback;
pub mod sre;
pub mod test_writer;

use crate::core::config::AppConfig;
use crate::core::{
    EnvelopeOverrides, EnvelopeSkeleton, ExecutionMode, InputSnapshot, ResultEnvelope,
};
use crate::llm::{PromptClient, PromptService};
use crate::persistence::SessionLogger;
use crate::process::{CommandRunner, TokioCommandRunner};
use crate::provider::{create_provider, ProviderAdapter};
use crate::source::{GitSource, SourceControl};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

pub use build::{BuildAgent, BuildParams};
pub use build_failure::{BuildFailureAnalyzerAgent, BuildFailureParams};
pub use code_review::{CodeReviewAgent, CodeReviewParams};
pub use deploy::{DeployAgent, DeployParams};
pub use monitor::{MonitorAgent, MonitorParams, DISCOVERY_ERROR_KEY};
pub use regression::{RegressionCheckAgent, RegressionParams};
pub use rollback::{RollbackAgent, RollbackParams};
pub use sre::{SreAgent, SreParams};
pub use test_writer::{TestWriterAgent, TestWriterParams};

/// Everything an agent invocation may touch
#[derive(Clone)]
pub struct AgentContext {
    pub mode: ExecutionMode,
    pub session_id: String,
    pub logger: Arc<dyn SessionLogger>,
    pub prompts: Arc<dyn PromptService>,
    pub provider: Arc<dyn ProviderAdapter>,
    pub source: Arc<dyn SourceControl>,
    pub runner: Arc<dyn CommandRunner>,
    pub settings: Arc<AppConfig>,
}

impl AgentContext {
    /// Wire the real collaborators selected by `config`
    pub fn from_config(config: AppConfig, logger: Arc<dyn SessionLogger>) -> Result<Self> {
        let mode = config.mode;
        let runner: Arc<dyn CommandRunner> =
            Arc::new(TokioCommandRunner::new(config.commands.timeout_secs));
        let prompts = PromptClient::from_config(mode, &config.llm, runner.clone())
            .context("Failed to create LLM client")?;
        let provider = create_provider(&config.provider, runner.clone());
        let source = GitSource::new(config.source.host_prefix.clone(), runner.clone());

        Ok(Self {
            mode,
            session_id: String::new(),
            logger,
            prompts: Arc::new(prompts),
            provider,
            source: Arc::new(source),
            runner,
            settings: Arc::new(config),
        })
    }

    /// Same collaborators, new session id
    pub fn for_session(&self, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..self.clone()
        }
    }

    /// Input snapshot for `params` in this context's mode
    pub fn input<P: Serialize>(&self, params: &P) -> InputSnapshot {
        InputSnapshot::new(self.mode, params)
    }
}

/// A pipeline stage implementation
#[async_trait]
pub trait Agent: Send + Sync {
    type Params: Serialize + Send + Sync;
    type Output: Send;

    async fn run(&self, ctx: &AgentContext, params: &Self::Params) -> Self::Output;
}

/// Merge, validate and log an envelope
///
/// A contract violation is replaced by a well-formed error envelope; either
/// way exactly one envelope is logged.
pub(crate) async fn finalize(
    ctx: &AgentContext,
    skeleton: &EnvelopeSkeleton,
    overrides: EnvelopeOverrides,
    input: InputSnapshot,
) -> ResultEnvelope {
    let envelope = match skeleton.finish(overrides, input.clone()) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("[{}] {}: {}", ctx.session_id, skeleton.stage(), e);
            skeleton.contract_violation(&e, input)
        }
    };
    ctx.logger.log(&ctx.session_id, skeleton.stage(), &envelope).await;
    envelope
}

/// Value of a `Label: value` line, tolerating list markers and bold labels
pub(crate) fn extract_field(text: &str, label: &str) -> Option<String> {
    let wanted = label.to_lowercase();
    text.lines().find_map(|line| {
        let line = line.trim().trim_start_matches(['-', '*', '•']).trim();
        let (key, value) = line.split_once(':')?;
        if key.trim().trim_matches('*').trim().to_lowercase() != wanted {
            return None;
        }
        let value = value.trim().trim_matches('*').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// At most `max` characters of `text`, marking the cut
pub(crate) fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
