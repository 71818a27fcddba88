//! Pipeline orchestrator - runs the agents in order and applies the deploy gate

use super::gate::{deploy_gate, GateVerdict};
use crate::agents::{
    finalize, Agent, AgentContext, BuildAgent, BuildFailureAnalyzerAgent, BuildFailureParams, BuildParams,
    CodeReviewAgent, CodeReviewParams, DeployAgent, DeployParams, MonitorAgent, MonitorParams,
    RegressionCheckAgent, RegressionParams, RollbackAgent, RollbackParams, SreAgent, SreParams,
    TestWriterAgent, TestWriterParams,
};
use crate::core::{
    EnvelopeOverrides, EnvelopeSkeleton, ExecutionMode, ResultEnvelope, Session, Stage, StageResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        session_id: String,
        repo_url: String,
        mode: ExecutionMode,
    },
    StageStarted {
        stage: Stage,
    },
    StageFinished {
        stage: Stage,
        success: bool,
        reason: Option<String>,
    },
    StageSkipped {
        stage: Stage,
        reason: String,
    },
    GateClosed {
        blocking: Vec<Stage>,
    },
    PipelineFinished {
        session_id: String,
        outcome: PipelineOutcome,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// The gate opened and the post-deploy stages ran
    Completed,
    /// The gate stayed closed
    Halted { blocking: Vec<Stage> },
}

/// Result of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub session: Session,
    pub outcome: PipelineOutcome,
}

impl PipelineReport {
    pub fn is_halted(&self) -> bool {
        matches!(self.outcome, PipelineOutcome::Halted { .. })
    }
}

/// Runs the fixed stage sequence against one repository
pub struct PipelineOrchestrator {
    context: AgentContext,
    event_handlers: Vec<EventHandler>,
}

impl PipelineOrchestrator {
    /// `context` supplies the collaborators; each run gets its own session id
    pub fn new(context: AgentContext) -> Self {
        Self {
            context,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    async fn run_stage<A>(
        &self,
        ctx: &AgentContext,
        session: &mut Session,
        stage: Stage,
        agent: A,
        params: A::Params,
    ) -> ResultEnvelope
    where
        A: Agent<Output = ResultEnvelope>,
    {
        self.emit_event(ExecutionEvent::StageStarted { stage });
        let envelope = agent.run(ctx, &params).await;
        self.record(session, stage, envelope.clone());
        envelope
    }

    fn record(&self, session: &mut Session, stage: Stage, envelope: ResultEnvelope) {
        self.emit_event(ExecutionEvent::StageFinished {
            stage,
            success: envelope.is_success(),
            reason: envelope.reason.clone(),
        });
        session.record(stage, StageResult::Single(envelope));
    }

    fn skip(&self, stage: Stage, reason: &str) {
        self.emit_event(ExecutionEvent::StageSkipped {
            stage,
            reason: reason.to_string(),
        });
    }

    /// Run the whole pipeline for `repo_url`. Never fails: every stage
    /// outcome is an envelope in the returned session.
    pub async fn run(&self, repo_url: &str) -> PipelineReport {
        let mut session = Session::new(self.context.mode);
        let ctx = self.context.for_session(session.id.clone());

        info!("Starting pipeline {} for {} ({})", session.id, repo_url, ctx.mode);
        self.emit_event(ExecutionEvent::PipelineStarted {
            session_id: session.id.clone(),
            repo_url: repo_url.to_string(),
            mode: ctx.mode,
        });

        let repo = repo_url.to_string();
        let params = CodeReviewParams { repo_url: repo.clone() };
        self.run_stage(&ctx, &mut session, Stage::CodeReview, CodeReviewAgent, params)
            .await;
        let params = TestWriterParams { repo_url: repo.clone() };
        self.run_stage(&ctx, &mut session, Stage::TestWriter, TestWriterAgent, params)
            .await;
        self.run_stage(
            &ctx,
            &mut session,
            Stage::RegressionCheck,
            RegressionCheckAgent,
            RegressionParams { repo_url: repo.clone() },
        )
        .await;
        let params = BuildParams { repo_url: repo.clone() };
        let build = self
            .run_stage(&ctx, &mut session, Stage::Build, BuildAgent, params)
            .await;

        let build_logs = build
            .build()
            .and_then(|b| b.logs.clone())
            .filter(|logs| !logs.trim().is_empty());
        match build_logs {
            Some(build_logs) if build.is_error() => {
                let params = BuildFailureParams {
                    repo_url: repo.clone(),
                    build_logs,
                };
                let stage = Stage::BuildFailureAnalyzer;
                self.run_stage(&ctx, &mut session, stage, BuildFailureAnalyzerAgent, params)
                    .await;
            }
            _ if build.is_error() => self.skip(Stage::BuildFailureAnalyzer, "No build logs to analyze"),
            _ => self.skip(Stage::BuildFailureAnalyzer, "Build succeeded"),
        }

        if let GateVerdict::Closed { blocking } = deploy_gate(&session) {
            warn!(
                "[{}] Deploy gate closed by {}",
                session.id,
                blocking.iter().map(Stage::as_str).collect::<Vec<_>>().join(", ")
            );
            self.emit_event(ExecutionEvent::GateClosed {
                blocking: blocking.clone(),
            });
            for stage in [Stage::Deploy, Stage::Monitor, Stage::Rollback, Stage::Sre] {
                self.skip(stage, "Deploy gate closed");
            }
            return self.finish(session, PipelineOutcome::Halted { blocking });
        }

        let image = build
            .build()
            .and_then(|b| b.image_url.clone())
            .filter(|image| !image.trim().is_empty());
        match &image {
            Some(image) => {
                let params = DeployParams { image_url: image.clone() };
                self.run_stage(&ctx, &mut session, Stage::Deploy, DeployAgent, params)
                    .await;
            }
            None => {
                self.emit_event(ExecutionEvent::StageStarted { stage: Stage::Deploy });
                let skeleton = EnvelopeSkeleton::new(Stage::Deploy, true, false);
                let overrides = EnvelopeOverrides::error("No image URL returned from build");
                let input = ctx.input(&DeployParams { image_url: String::new() });
                let envelope = finalize(&ctx, &skeleton, overrides, input).await;
                self.record(&mut session, Stage::Deploy, envelope);
            }
        }

        self.emit_event(ExecutionEvent::StageStarted { stage: Stage::Monitor });
        let checks = MonitorAgent.run(&ctx, &MonitorParams::default()).await;
        self.emit_event(ExecutionEvent::StageFinished {
            stage: Stage::Monitor,
            success: !checks.is_empty() && checks.values().all(ResultEnvelope::is_success),
            reason: checks.values().find_map(|e| e.reason.clone()),
        });
        session.record(Stage::Monitor, StageResult::FanOut(checks));

        let service = image.as_deref().map(|image| ctx.provider.service_name_for(image));
        self.run_stage(&ctx, &mut session, Stage::Rollback, RollbackAgent, RollbackParams { service })
            .await;
        let params = SreParams { repo_url: repo };
        self.run_stage(&ctx, &mut session, Stage::Sre, SreAgent, params).await;

        self.finish(session, PipelineOutcome::Completed)
    }

    fn finish(&self, session: Session, outcome: PipelineOutcome) -> PipelineReport {
        info!("Pipeline {} finished: {:?}", session.id, outcome);
        self.emit_event(ExecutionEvent::PipelineFinished {
            session_id: session.id.clone(),
            outcome: outcome.clone(),
        });
        PipelineReport { session, outcome }
    }
}
