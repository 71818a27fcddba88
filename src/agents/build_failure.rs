//! Root-cause analysis of failed builds

use super::{extract_field, finalize, truncate, Agent, AgentContext};
use crate::core::{
    BuildFailurePayload, Confidence, EnvelopeOverrides, EnvelopeSkeleton, Payload, ResultEnvelope, Stage,
};
use crate::llm::{render_messages, PromptMessage, PromptReply};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::info;

/// Log excerpt kept in the input snapshot
const LOG_EXCERPT: usize = 300;

#[derive(Debug, Clone, Serialize)]
pub struct BuildFailureParams {
    pub repo_url: String,
    pub build_logs: String,
}

pub struct BuildFailureAnalyzerAgent;

/// Fields of a `Step Failed / Issue / Fix Recommendation / Confidence` reply
pub(crate) fn parse_analysis(reply: &str) -> BuildFailurePayload {
    let field = |label: &str| extract_field(reply, label).unwrap_or_else(|| "N/A".to_string());
    BuildFailurePayload {
        root_cause: field("Issue"),
        recommendations: field("Fix Recommendation"),
        step_failed: field("Step Failed"),
        confidence: extract_field(reply, "Confidence")
            .map(|c| Confidence::parse_lenient(&c))
            .unwrap_or_default(),
        llm_analysis: reply.to_string(),
    }
}

#[async_trait]
impl Agent for BuildFailureAnalyzerAgent {
    type Params = BuildFailureParams;
    type Output = ResultEnvelope;

    async fn run(&self, ctx: &AgentContext, params: &BuildFailureParams) -> ResultEnvelope {
        let skeleton = EnvelopeSkeleton::new(Stage::BuildFailureAnalyzer, false, true);
        let input = ctx.input(&json!({
            "repo_url": params.repo_url,
            "build_logs": truncate(&params.build_logs, LOG_EXCERPT),
        }));

        if ctx.mode.is_simulation() {
            let overrides = EnvelopeOverrides::success().payload(Payload::BuildFailureAnalyzer(BuildFailurePayload {
                root_cause: "Missing Dockerfile in root directory.".to_string(),
                recommendations: "Ensure `Dockerfile` exists in the root and is correctly formatted.".to_string(),
                step_failed: "Docker Build".to_string(),
                confidence: Confidence::High,
                llm_analysis: "Build failed due to missing Dockerfile...".to_string(),
            }));
            return finalize(ctx, &skeleton, overrides, input).await;
        }

        if params.build_logs.trim().is_empty() {
            let overrides = EnvelopeOverrides::error("No build logs to analyze");
            return finalize(ctx, &skeleton, overrides, input).await;
        }

        info!("[{}] Analyzing build failure", ctx.session_id);
        let messages = vec![PromptMessage::user(format!(
            "You are a build failure analyzer. Given the build logs below, find the root cause \
             and suggest a precise fix. Reply in this format:\n\n\
             Step Failed: <step or phase name>\n\
             Issue: <summary of the root cause>\n\
             Fix Recommendation: <clear, actionable fix>\n\
             Confidence: <low / medium / high>\n\n\
             Build Logs:\n{}\n(Repo: {})",
            params.build_logs, params.repo_url
        ))];
        let input = input.with_prompt(Some(render_messages(&messages)));

        let overrides = match ctx.prompts.prompt(&messages).await {
            PromptReply::Text(reply) => {
                EnvelopeOverrides::success().payload(Payload::BuildFailureAnalyzer(parse_analysis(&reply)))
            }
            PromptReply::Failed(error) => EnvelopeOverrides::error(format!("Build analysis failed: {}", error))
                .payload(Payload::BuildFailureAnalyzer(BuildFailurePayload {
                    root_cause: "Unparsed".to_string(),
                    recommendations: "LLM failed to generate actionable feedback.".to_string(),
                    step_failed: "Unknown".to_string(),
                    confidence: Confidence::Low,
                    llm_analysis: error,
                })),
        };

        finalize(ctx, &skeleton, overrides, input).await
    }
}
