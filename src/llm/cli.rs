//! LLM backend that calls a local CLI in print mode

use crate::core::config::LlmConfig;
use crate::llm::{render_messages, PromptBackend, PromptError, PromptMessage};
use crate::process::{CommandError, CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Calls `<cli> --mode text --print --no-session <prompt>` and returns stdout
pub struct CliBackend {
    /// Path to the executable
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl CliBackend {
    /// Create a new CLI backend
    ///
    /// The `config.endpoint` field is used as the path to the executable.
    /// If not provided, defaults to "pi" (assuming it's on PATH).
    pub fn new(config: &LlmConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let program = config.endpoint.clone().unwrap_or_else(|| "pi".to_string());
        Self { program, runner }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl PromptBackend for CliBackend {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, PromptError> {
        let prompt = render_messages(messages);
        debug!("Spawning {} with prompt length: {}", self.program, prompt.len());

        let spec = CommandSpec::new(&self.program)
            .args(["--mode", "text", "--print", "--no-session"])
            .arg(prompt);

        let output = self.runner.run_checked(&spec).await.map_err(|e| match e {
            CommandError::NonZeroExit { code, stderr, .. } => {
                PromptError::Api(format!("{} exited with code {}: {}", self.program, code, stderr))
            }
            other => PromptError::Internal(other.to_string()),
        })?;

        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::TokioCommandRunner;

    #[test]
    fn test_default_program() {
        let backend = CliBackend::new(&LlmConfig::default(), Arc::new(TokioCommandRunner::new(5)));
        assert_eq!(backend.program(), "pi");
    }

    #[tokio::test]
    async fn test_invalid_program_is_internal_error() {
        let config = LlmConfig {
            endpoint: Some("nonexistent-llm-cli-12345".to_string()),
            ..LlmConfig::default()
        };
        let backend = CliBackend::new(&config, Arc::new(TokioCommandRunner::new(5)));
        let result = backend.complete(&[PromptMessage::user("Say hello")]).await;
        assert!(matches!(result, Err(PromptError::Internal(_))));
    }
}
