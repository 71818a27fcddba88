//! LLM prompt service
//!
//! Agents talk to a [`PromptService`], which never fails: in simulation mode
//! it answers with [`SIMULATED_RESPONSE`], in production mode it performs
//! exactly one backend call and reports backend failures in-band as
//! [`PromptReply::Failed`].

pub mod cli;
pub mod http;

use crate::core::{config::{LlmBackend, LlmConfig}, ExecutionMode};
use crate::process::CommandRunner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

pub use cli::CliBackend;
pub use http::{GeminiBackend, OpenAiBackend};

/// Reply returned by every prompt call in simulation mode
pub const SIMULATED_RESPONSE: &str = "[SIMULATED LLM RESPONSE]";

/// Error types for LLM backends
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single prompt fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Flatten messages into plain text (for logging and text-only backends)
pub fn render_messages(messages: &[PromptMessage]) -> String {
    messages
        .iter()
        .map(|m| m.content.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Result of a prompt call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply {
    /// Assistant text
    Text(String),
    /// Backend failure, described in-band
    Failed(String),
}

impl PromptReply {
    pub fn text(&self) -> Option<&str> {
        match self {
            PromptReply::Text(text) => Some(text),
            PromptReply::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PromptReply::Failed(_))
    }

    /// Raw text as a caller that does not branch on failure would see it
    pub fn into_text(self) -> String {
        match self {
            PromptReply::Text(text) => text,
            PromptReply::Failed(error) => format!("[ERROR calling LLM]: {}", error),
        }
    }
}

/// Trait for prompt services - never raises to the caller
#[async_trait]
pub trait PromptService: Send + Sync {
    async fn prompt(&self, messages: &[PromptMessage]) -> PromptReply;
}

/// Trait for LLM backends - one call per invocation
#[async_trait]
pub trait PromptBackend: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, PromptError>;
}

/// Mode-aware prompt service over a backend
pub struct PromptClient {
    mode: ExecutionMode,
    backend: Box<dyn PromptBackend>,
}

impl PromptClient {
    pub fn new(mode: ExecutionMode, backend: Box<dyn PromptBackend>) -> Self {
        Self { mode, backend }
    }

    /// Build the backend selected by configuration
    pub fn from_config(
        mode: ExecutionMode,
        config: &LlmConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, PromptError> {
        let backend: Box<dyn PromptBackend> = match config.backend {
            LlmBackend::Openai => Box::new(OpenAiBackend::new(config)?),
            LlmBackend::Gemini => Box::new(GeminiBackend::new(config)?),
            LlmBackend::Cli => Box::new(CliBackend::new(config, runner)),
        };
        Ok(Self::new(mode, backend))
    }
}

#[async_trait]
impl PromptService for PromptClient {
    async fn prompt(&self, messages: &[PromptMessage]) -> PromptReply {
        if self.mode.is_simulation() {
            return PromptReply::Text(SIMULATED_RESPONSE.to_string());
        }

        match self.backend.complete(messages).await {
            Ok(text) if text.trim().is_empty() => {
                PromptReply::Failed("empty response".to_string())
            }
            Ok(text) => PromptReply::Text(text.trim().to_string()),
            Err(e) => {
                warn!("LLM call failed: {}", e);
                PromptReply::Failed(e.to_string())
            }
        }
    }
}
