//! Routes traffic back to the previous revision

use super::{finalize, Agent, AgentContext};
use crate::core::{EnvelopeOverrides, EnvelopeSkeleton, Payload, ResultEnvelope, RollbackPayload, Stage};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackParams {
    /// Service to roll back; the configured service when unset
    pub service: Option<String>,
}

pub struct RollbackAgent;

#[async_trait]
impl Agent for RollbackAgent {
    type Params = RollbackParams;
    type Output = ResultEnvelope;

    async fn run(&self, ctx: &AgentContext, params: &RollbackParams) -> ResultEnvelope {
        let skeleton = EnvelopeSkeleton::new(Stage::Rollback, false, true);
        let target = params
            .service
            .clone()
            .unwrap_or_else(|| ctx.settings.provider.service.clone());
        let input = ctx
            .input(&RollbackParams {
                service: Some(target.clone()),
            })
            .with_provider(ctx.provider.describe());

        if ctx.mode.is_simulation() {
            let overrides = EnvelopeOverrides::success()
                .reason("Simulated rollback succeeded")
                .payload(Payload::Rollback(RollbackPayload {
                    restored: true,
                    previous_revision: Some("rev-001".to_string()),
                    output: format!("Traffic for {} routed to rev-001", target),
                }));
            return finalize(ctx, &skeleton, overrides, input).await;
        }

        let revisions = match ctx.provider.list_revisions(&target).await {
            Ok(revisions) => revisions,
            Err(e) => {
                warn!("[{}] Could not list revisions of {}: {}", ctx.session_id, target, e);
                let overrides = EnvelopeOverrides::error(format!("API error: {}", e));
                return finalize(ctx, &skeleton, overrides, input).await;
            }
        };

        let Some(previous) = revisions.get(1) else {
            let overrides = EnvelopeOverrides::error("No previous revision available for rollback.").payload(
                Payload::Rollback(RollbackPayload {
                    restored: false,
                    previous_revision: None,
                    output: "Rollback skipped due to lack of previous revision.".to_string(),
                }),
            );
            return finalize(ctx, &skeleton, overrides, input).await;
        };

        info!("[{}] Rolling {} back to {}", ctx.session_id, target, previous.name);
        let overrides = match ctx.provider.route_traffic(&target, &previous.name).await {
            Ok(()) => EnvelopeOverrides::success()
                .reason(format!("Rolled back to {}", previous.name))
                .payload(Payload::Rollback(RollbackPayload {
                    restored: true,
                    previous_revision: Some(previous.name.clone()),
                    output: format!("Traffic for {} routed to {}", target, previous.name),
                })),
            Err(e) => EnvelopeOverrides::error(format!("API error: {}", e)).payload(Payload::Rollback(
                RollbackPayload {
                    restored: false,
                    previous_revision: Some(previous.name.clone()),
                    output: e.captured_output().unwrap_or_default(),
                },
            )),
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

    fn params(service: &str) -> RollbackParams {
        RollbackParams {
            service: Some(service.to_string()),
        }
    }

    #[tokio::test]
    async fn test_simulation_restores_fixed_revision() {
        let t = context(ExecutionMode::Simulation, Arc::new(FixedPrompts::text("x")), ScriptedRunner::new());
        let envelope = RollbackAgent.run(&t.ctx, &RollbackParams::default()).await;

        let payload = envelope.rollback().unwrap();
        assert!(envelope.is_success());
        assert!(payload.restored);
        assert_eq!(payload.previous_revision.as_deref(), Some("rev-001"));
        assert_eq!(envelope.input.params["service"], "agentops-app");
    }

    #[tokio::test]
    async fn test_routes_to_second_newest_revision() {
        let json = r#"[
            {"metadata": {"name": "widgets-00001", "creationTimestamp": "2024-01-01T00:00:00Z"}},
            {"metadata": {"name": "widgets-00003", "creationTimestamp": "2024-05-01T00:00:00Z"}},
            {"metadata": {"name": "widgets-00002", "creationTimestamp": "2024-03-01T00:00:00Z"}}
        ]"#;
        let runner = ScriptedRunner::new().ok("gcloud run revisions list", json);
        let t = context(ExecutionMode::Production, Arc::new(FixedPrompts::text("x")), runner);
        let envelope = RollbackAgent.run(&t.ctx, &params("widgets")).await;

        assert!(envelope.is_success());
        assert_eq!(envelope.rollback().unwrap().previous_revision.as_deref(), Some("widgets-00002"));
        let routed: Vec<String> = t
            .runner
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("gcloud run services update-traffic widgets"))
            .collect();
        assert_eq!(routed.len(), 1);
        assert!(routed[0].contains("--to-revisions widgets-00002=100"));
    }

    #[tokio::test]
    async fn test_single_revision_is_not_rolled_back() {
        let json = r#"[{"metadata": {"name": "widgets-00001"}}]"#;
        let runner = ScriptedRunner::new().ok("gcloud run revisions list", json);
        let t = context(ExecutionMode::Production, Arc::new(FixedPrompts::text("x")), runner);
        let envelope = RollbackAgent.run(&t.ctx, &params("widgets")).await;

        let payload = envelope.rollback().unwrap();
        assert!(envelope.is_error());
        assert!(!payload.restored);
        assert_eq!(payload.output, "Rollback skipped due to lack of previous revision.");
        assert_eq!(t.runner.count("gcloud run services update-traffic"), 0);
    }

    #[tokio::test]
    async fn test_listing_failure_is_api_error() {
        let runner = ScriptedRunner::new().fail("gcloud run revisions list", 1, "service not found");
        let t = context(ExecutionMode::Production, Arc::new(FixedPrompts::text("x")), runner);
        let envelope = RollbackAgent.run(&t.ctx, &params("widgets")).await;

        assert!(envelope.is_error());
        assert!(envelope.reason.as_deref().unwrap().starts_with("API error:"));
        assert_eq!(t.logger.count(), 1);
    }
}
