//! Builds a container image through the provider

use super::{finalize, Agent, AgentContext};
use crate::core::{BuildPayload, EnvelopeOverrides, EnvelopeSkeleton, Payload, ResultEnvelope, Stage};
use crate::provider::ProviderError;
use crate::source::{repo_name, SourceError};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
pub struct BuildParams {
    pub repo_url: String,
}

pub struct BuildAgent;

#[derive(Debug, Error)]
enum BuildError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl BuildError {
    fn logs(&self) -> Option<String> {
        let logs = match self {
            BuildError::Source(SourceError::Clone(e)) => e.captured_output(),
            BuildError::Source(_) => None,
            BuildError::Provider(e) => e.captured_output(),
        };
        logs.filter(|logs| !logs.trim().is_empty())
    }
}

impl BuildAgent {
    async fn build(ctx: &AgentContext, repo_url: &str) -> Result<String, BuildError> {
        let checkout = ctx.source.checkout(repo_url).await?;
        let result = ctx.provider.build(checkout.path(), &repo_name(repo_url)).await;
        checkout.release();
        Ok(result?)
    }
}

#[async_trait]
impl Agent for BuildAgent {
    type Params = BuildParams;
    type Output = ResultEnvelope;

    async fn run(&self, ctx: &AgentContext, params: &BuildParams) -> ResultEnvelope {
        let skeleton = EnvelopeSkeleton::new(Stage::Build, true, false);
        let input = ctx.input(params).with_provider(ctx.provider.describe());

        let overrides = if ctx.mode.is_simulation() {
            EnvelopeOverrides::success()
                .critical(false)
                .reason("Simulated build success")
                .payload(Payload::Build(BuildPayload {
                    image_url: Some(ctx.provider.simulated_image(&repo_name(&params.repo_url))),
                    ..Default::default()
                }))
        } else {
            info!("[{}] Building {}", ctx.session_id, params.repo_url);
            match Self::build(ctx, &params.repo_url).await {
                Ok(image) => EnvelopeOverrides::success()
                    .critical(false)
                    .reason("Build succeeded")
                    .payload(Payload::Build(BuildPayload {
                        image_url: Some(image),
                        ..Default::default()
                    })),
                Err(e) => {
                    error!("[{}] Build failed: {}", ctx.session_id, e);
                    EnvelopeOverrides::error(format!("Build failed: {}", e))
                        .critical(true)
                        .payload(Payload::Build(BuildPayload {
                            logs: e.logs(),
                            ..Default::default()
                        }))
                }
            }
        };

        finalize(ctx, &skeleton, overrides, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::core::ExecutionMode;
    use crate::process::testing::ScriptedRunner;
    use std::sync::Arc;

    fn params(url: &str) -> BuildParams {
        BuildParams {
            repo_url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_simulation_uses_provider_image() {
        let t = context(ExecutionMode::Simulation, Arc::new(FixedPrompts::text("x")), ScriptedRunner::new());
        let envelope = BuildAgent.run(&t.ctx, &params("https://github.com/acme/widgets")).await;

        assert!(envelope.is_success());
        assert!(!envelope.critical);
        assert_eq!(
            envelope.build().unwrap().image_url.as_deref(),
            Some("gcr.io/acme-proj-sim/widgets")
        );
        assert!(t.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_production_build_succeeds() {
        let t = context(ExecutionMode::Production, Arc::new(FixedPrompts::text("x")), ScriptedRunner::new());
        let envelope = BuildAgent.run(&t.ctx, &params("https://github.com/acme/widgets.git")).await;

        assert!(envelope.is_success());
        assert_eq!(envelope.build().unwrap().image_url.as_deref(), Some("gcr.io/acme-proj/widgets"));
        assert_eq!(t.runner.count("gcloud builds submit --tag gcr.io/acme-proj/widgets"), 1);
    }

    #[tokio::test]
    async fn test_failed_build_is_critical_with_logs() {
        let runner = ScriptedRunner::new().fail("gcloud builds submit", 1, "Step #1: COPY failed: no Dockerfile");
        let t = context(ExecutionMode::Production, Arc::new(FixedPrompts::text("x")), runner);
        let envelope = BuildAgent.run(&t.ctx, &params("https://github.com/acme/widgets")).await;

        assert!(envelope.is_error());
        assert!(envelope.critical);
        assert!(envelope.build().unwrap().logs.as_deref().unwrap().contains("no Dockerfile"));
        assert_eq!(t.logger.count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_logs() {
        let t = context(ExecutionMode::Production, Arc::new(FixedPrompts::text("x")), ScriptedRunner::new());
        let envelope = BuildAgent.run(&t.ctx, &params("https://example.com/acme/widgets")).await;

        assert!(envelope.is_error());
        assert!(envelope.critical);
        assert!(envelope.build().unwrap().logs.is_none());
        assert!(t.runner.calls().is_empty());
    }
}
