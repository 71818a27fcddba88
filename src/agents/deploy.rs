//! Deploys a built image through the provider

use super::{finalize, Agent, AgentContext};
use crate::core::{DeployPayload, EnvelopeOverrides, EnvelopeSkeleton, Payload, ResultEnvelope, Stage};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct DeployParams {
    pub image_url: String,
}

pub struct DeployAgent;

#[async_trait]
impl Agent for DeployAgent {
    type Params = DeployParams;
    type Output = ResultEnvelope;

    async fn run(&self, ctx: &AgentContext, params: &DeployParams) -> ResultEnvelope {
        let skeleton = EnvelopeSkeleton::new(Stage::Deploy, false, true);
        let input = ctx.input(params).with_provider(ctx.provider.describe());
        let image = params.image_url.trim();

        if !ctx.provider.is_valid_artifact(image) {
            warn!("[{}] Refusing to deploy {:?}", ctx.session_id, image);
            let overrides = EnvelopeOverrides::error(format!("Invalid or missing image URL: {}", image))
                .critical(false)
                .skippable(true);
            return finalize(ctx, &skeleton, overrides, input).await;
        }

        let overrides = if ctx.mode.is_simulation() {
            EnvelopeOverrides::success()
                .skippable(false)
                .reason("Mock deployment successful")
                .payload(Payload::Deploy(DeployPayload {
                    deployed_url: Some(ctx.provider.simulated_endpoint(image)),
                }))
        } else {
            let service = ctx.provider.service_name_for(image);
            info!("[{}] Deploying {} as {}", ctx.session_id, image, service);
            match ctx.provider.deploy(image, &service).await {
                Ok(url) => EnvelopeOverrides::success()
                    .skippable(false)
                    .reason("Deployment successful")
                    .payload(Payload::Deploy(DeployPayload {
                        deployed_url: Some(url),
                    })),
                Err(e) => EnvelopeOverrides::error(format!("Deploy failed: {}", e))
                    .critical(false)
                    .skippable(true),
            }
        };

        finalize(ctx, &skeleton, overrides, input).await
    }
}
