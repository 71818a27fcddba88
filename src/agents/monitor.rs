//! Health checks for deployed targets

use super::{finalize, Agent, AgentContext};
use crate::core::{EnvelopeOverrides, EnvelopeSkeleton, MonitorPayload, Payload, ResultEnvelope, Stage};
use crate::provider::TargetHealth;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Key of the single envelope returned when targets cannot be listed
pub const DISCOVERY_ERROR_KEY: &str = "error";

const NO_TARGETS: &str = "No targets found";

#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorParams {
    /// Check only this target instead of every target the provider lists
    pub target: Option<String>,
}

pub struct MonitorAgent;

/// Envelope fields for a described target
fn health_overrides(health: &TargetHealth) -> EnvelopeOverrides {
    let mut payload = MonitorPayload {
        target: health.name.clone(),
        summary: "All conditions passed.".to_string(),
        traffic_status: health.traffic_summary(),
        errors: health.errors.clone(),
        last_deployed_revision: health
            .latest_ready_revision
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
    };

    if health.errors.is_empty() {
        return EnvelopeOverrides::success().payload(Payload::Monitor(payload));
    }

    payload.summary = format!("{} issue(s) detected.", health.errors.len());
    EnvelopeOverrides::error(health.errors.join("; ")).payload(Payload::Monitor(payload))
}

impl MonitorAgent {
    /// Single error envelope under [`DISCOVERY_ERROR_KEY`] when there is nothing to check
    async fn discovery_error(
        &self,
        ctx: &AgentContext,
        params: &MonitorParams,
        reason: String,
        summary: &str,
    ) -> BTreeMap<String, ResultEnvelope> {
        let skeleton = EnvelopeSkeleton::new(Stage::Monitor, false, true);
        let overrides = EnvelopeOverrides::error(reason).payload(Payload::Monitor(MonitorPayload {
            summary: summary.to_string(),
            ..Default::default()
        }));
        let input = ctx.input(params).with_provider(ctx.provider.describe());
        let envelope = finalize(ctx, &skeleton, overrides, input).await;
        BTreeMap::from([(DISCOVERY_ERROR_KEY.to_string(), envelope)])
    }

    async fn simulate(&self, ctx: &AgentContext, params: &MonitorParams) -> BTreeMap<String, ResultEnvelope> {
        let targets = match &params.target {
            Some(target) => vec![target.clone()],
            None => ctx.settings.provider.simulated_targets.clone(),
        };
        if targets.is_empty() {
            return self
                .discovery_error(ctx, params, NO_TARGETS.to_string(), NO_TARGETS)
                .await;
        }

        let mut results = BTreeMap::new();
        for target in targets {
            let skeleton = EnvelopeSkeleton::new(Stage::Monitor, false, true);
            let revision = format!("{}-00001", target);
            let overrides = EnvelopeOverrides::success().payload(Payload::Monitor(MonitorPayload {
                target: target.clone(),
                summary: "All conditions passed.".to_string(),
                traffic_status: format!("100% → {}", revision),
                errors: Vec::new(),
                last_deployed_revision: revision,
            }));
            let input = ctx
                .input(&MonitorParams {
                    target: Some(target.clone()),
                })
                .with_provider(ctx.provider.describe());
            results.insert(target, finalize(ctx, &skeleton, overrides, input).await);
        }
        results
    }
}

#[async_trait]
impl Agent for MonitorAgent {
    type Params = MonitorParams;
    type Output = BTreeMap<String, ResultEnvelope>;

    async fn run(&self, ctx: &AgentContext, params: &MonitorParams) -> BTreeMap<String, ResultEnvelope> {
        if ctx.mode.is_simulation() {
            return self.simulate(ctx, params).await;
        }

        let targets = match ctx.provider.list_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                warn!("[{}] Could not list targets: {}", ctx.session_id, e);
                return self
                    .discovery_error(ctx, params, e.to_string(), "Failed to list targets")
                    .await;
            }
        };
        if targets.is_empty() && params.target.is_none() {
            warn!("[{}] Provider lists no targets", ctx.session_id);
            return self
                .discovery_error(ctx, params, NO_TARGETS.to_string(), NO_TARGETS)
                .await;
        }

        let targets: Vec<String> = match &params.target {
            Some(wanted) => {
                if !targets.contains(wanted) {
                    let skeleton = EnvelopeSkeleton::new(Stage::Monitor, false, true);
                    let overrides = EnvelopeOverrides::error(format!("Target {} not found", wanted)).payload(
                        Payload::Monitor(MonitorPayload {
                            target: wanted.clone(),
                            summary: "Target not found".to_string(),
                            ..Default::default()
                        }),
                    );
                    let envelope = finalize(ctx, &skeleton, overrides, ctx.input(params)).await;
                    return BTreeMap::from([(wanted.clone(), envelope)]);
                }
                vec![wanted.clone()]
            }
            None => targets,
        };

        info!("[{}] Monitoring {} target(s)", ctx.session_id, targets.len());
        let mut results = BTreeMap::new();
        for target in targets {
            let skeleton = EnvelopeSkeleton::new(Stage::Monitor, false, true);
            let input = ctx
                .input(&MonitorParams {
                    target: Some(target.clone()),
                })
                .with_provider(ctx.provider.describe());

            let overrides = match ctx.provider.describe_target(&target).await {
                Ok(health) => health_overrides(&health),
                Err(e) => EnvelopeOverrides::error(e.to_string()).payload(Payload::Monitor(MonitorPayload {
                    target: target.clone(),
                    summary: "Failed to describe target".to_string(),
                    ..Default::default()
                })),
            };
            results.insert(target, finalize(ctx, &skeleton, overrides, input).await);
        }
        results
    }
}
