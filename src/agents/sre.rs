//! Stability audit over recent deploy, rollback and monitor history

use super::{extract_field, finalize, Agent, AgentContext};
use crate::core::{EnvelopeOverrides, EnvelopeSkeleton, Payload, ResultEnvelope, SrePayload, Stage};
use crate::llm::{render_messages, PromptMessage, PromptReply};
use crate::persistence::HistoryEntry;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// History entries fetched per stage
const HISTORY_LIMIT: usize = 10;

/// Risk score treated as critical when the reply has no Critical line
const CRITICAL_RISK: u8 = 80;

const SYNTHETIC_METRICS: &str = "\
CPU usage: spike at 85% during deploy 3
Memory: stable around 60%
Request latency: 99th percentile hit 1200ms
5xx error rate: 2% during rollout of rev-002";

#[derive(Debug, Clone, Serialize)]
pub struct SreParams {
    pub repo_url: String,
}

pub struct SreAgent;

/// Leading integer of a `Risk Score` value, clamped to 0..=100
pub(crate) fn parse_risk_score(value: &str) -> u8 {
    let digits: String = value.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<u64>().map(|n| n.min(100) as u8).unwrap_or(0)
}

/// (payload, critical) from a structured SRE reply
pub(crate) fn parse_report(reply: &str) -> (SrePayload, bool) {
    let field = |label: &str| extract_field(reply, label).unwrap_or_else(|| "N/A".to_string());
    let risk_score = extract_field(reply, "Risk Score")
        .map(|v| parse_risk_score(&v))
        .unwrap_or(0);
    let critical = match extract_field(reply, "Critical").map(|v| v.to_lowercase()) {
        Some(v) if v.starts_with("true") || v.starts_with("yes") => true,
        Some(v) if v.starts_with("false") || v.starts_with("no") => false,
        _ => risk_score >= CRITICAL_RISK,
    };

    let payload = SrePayload {
        summary: field("Summary"),
        root_cause: field("Root Cause"),
        recommended_actions: field("Recommended Actions"),
        risk_score,
        output: reply.to_string(),
    };
    (payload, critical)
}

/// One line per entry: `<status>: <reason or monitor summary>`
fn history_lines(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "(no history)".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            let envelope = &entry.envelope;
            let detail = envelope
                .monitor()
                .map(|m| m.summary.clone())
                .or_else(|| envelope.reason.clone())
                .unwrap_or_default();
            format!("- {} {}: {}", entry.recorded_at.to_rfc3339(), envelope.status.as_str(), detail)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Agent for SreAgent {
    type Params = SreParams;
    type Output = ResultEnvelope;

    async fn run(&self, ctx: &AgentContext, params: &SreParams) -> ResultEnvelope {
        let skeleton = EnvelopeSkeleton::new(Stage::Sre, false, false);
        let input = ctx.input(params).with_provider(ctx.provider.describe());

        if ctx.mode.is_simulation() {
            let overrides = EnvelopeOverrides::success().critical(true).payload(Payload::Sre(SrePayload {
                summary: "The service had 3 rollbacks and 5 deployments in the last 24h. \
                          Frequent redeployments signal instability."
                    .to_string(),
                root_cause: "Likely due to missing integration tests.".to_string(),
                recommended_actions: "Add smoke tests, enforce health checks, and limit rollout \
                                      to 10% traffic before scaling."
                    .to_string(),
                risk_score: 82,
                output: "Simulated stability analysis complete.".to_string(),
            }));
            return finalize(ctx, &skeleton, overrides, input).await;
        }

        let deploys = ctx.logger.fetch_history(Stage::Deploy, HISTORY_LIMIT).await;
        let rollbacks = ctx.logger.fetch_history(Stage::Rollback, HISTORY_LIMIT).await;
        let monitors = ctx.logger.fetch_history(Stage::Monitor, HISTORY_LIMIT).await;
        info!(
            "[{}] Auditing {} deploys, {} rollbacks, {} monitor checks",
            ctx.session_id,
            deploys.len(),
            rollbacks.len(),
            monitors.len()
        );

        let messages = vec![PromptMessage::user(format!(
            "You are a production SRE assistant. Use the logs below to identify trends \
             and generate a risk report.\n\n\
             Repository: {}\n\n\
             Deployments:\n{}\n\n\
             Rollbacks:\n{}\n\n\
             Monitoring:\n{}\n\n\
             Metrics:\n{}\n\n\
             Summarize current stability, explain the most likely root cause, recommend \
             actions, assign a risk score (0-100) and mark whether it is critical. \
             Reply in this format:\n\
             ---\n\
             Summary: <...>\n\
             Root Cause: <...>\n\
             Recommended Actions: <...>\n\
             Risk Score: <int 0-100>\n\
             Critical: <true/false>\n\
             ---",
            params.repo_url,
            history_lines(&deploys),
            history_lines(&rollbacks),
            history_lines(&monitors),
            SYNTHETIC_METRICS
        ))];
        let input = input.with_prompt(Some(render_messages(&messages)));

        let overrides = match ctx.prompts.prompt(&messages).await {
            PromptReply::Text(reply) => {
                let (payload, critical) = parse_report(&reply);
                EnvelopeOverrides::success()
                    .critical(critical)
                    .payload(Payload::Sre(payload))
            }
            PromptReply::Failed(error) => EnvelopeOverrides::error(format!("SRE analysis failed: {}", error))
                .skippable(true)
                .payload(Payload::Sre(SrePayload {
                    summary: "SRE analysis failed".to_string(),
                    output: format!("Exception: {}", error),
                    ..Default::default()
                })),
        };

        finalize(ctx, &skeleton, overrides, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::core::{ExecutionMode, InputSnapshot, Status};
    use crate::process::testing::ScriptedRunner;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;

    fn params() -> SreParams {
        SreParams {
            repo_url: "https://github.com/acme/widgets".to_string(),
        }
    }

    #[test]
    fn test_parse_risk_score() {
        assert_eq!(parse_risk_score("82"), 82);
        assert_eq!(parse_risk_score("75/100"), 75);
        assert_eq!(parse_risk_score("250"), 100);
        assert_eq!(parse_risk_score("high"), 0);
    }

    #[test]
    fn test_parse_report() {
        let reply = "---\nSummary: Stable\nRoot Cause: None\nRecommended Actions: Keep going\n\
                     Risk Score: 12\nCritical: false\n---";
        let (payload, critical) = parse_report(reply);
        assert_eq!(payload.summary, "Stable");
        assert_eq!(payload.root_cause, "None");
        assert_eq!(payload.recommended_actions, "Keep going");
        assert_eq!(payload.risk_score, 12);
        assert!(!critical);

        let (payload, critical) = parse_report("Summary: Flapping\nRisk Score: 91");
        assert_eq!(payload.root_cause, "N/A");
        assert!(critical);
    }

    #[tokio::test]
    async fn test_simulation_report() {
        let t = context(ExecutionMode::Simulation, Arc::new(FixedPrompts::text("x")), ScriptedRunner::new());
        let envelope = SreAgent.run(&t.ctx, &params()).await;

        assert!(envelope.is_success());
        assert!(envelope.critical);
        assert_eq!(envelope.sre().unwrap().risk_score, 82);
    }

    #[tokio::test]
    async fn test_prompt_includes_history() {
        let deploy = ResultEnvelope {
            status: Status::Error,
            critical: false,
            skippable: true,
            timestamp: Utc::now(),
            input: InputSnapshot::new(ExecutionMode::Production, &json!({})),
            reason: Some("Deploy failed: quota".to_string()),
            payload: Payload::default_for(Stage::Deploy),
        };
        let logger = RecordingLogger {
            history: vec![HistoryEntry {
                session_id: "session_old".to_string(),
                stage: Stage::Deploy,
                recorded_at: Utc::now(),
                envelope: deploy,
            }],
            ..Default::default()
        };
        let prompts = Arc::new(FixedPrompts::text("Summary: Shaky\nRisk Score: 40\nCritical: true"));
        let t = context_with_logger(ExecutionMode::Production, prompts.clone(), ScriptedRunner::new(), logger);
        let envelope = SreAgent.run(&t.ctx, &params()).await;

        assert!(envelope.is_success());
        assert!(envelope.critical);
        assert_eq!(envelope.sre().unwrap().risk_score, 40);
        let seen = prompts.seen.lock().unwrap();
        assert!(seen[0].contains("Deploy failed: quota"));
        assert!(seen[0].contains("5xx error rate"));
    }

    #[tokio::test]
    async fn test_failed_analysis_is_skippable_error() {
        let t = context(
            ExecutionMode::Production,
            Arc::new(FixedPrompts::failed("rate limited")),
            ScriptedRunner::new(),
        );
        let envelope = SreAgent.run(&t.ctx, &params()).await;

        assert!(envelope.is_error());
        assert!(envelope.skippable);
        assert!(!envelope.critical);
        assert_eq!(envelope.sre().unwrap().summary, "SRE analysis failed");
        assert_eq!(t.logger.count(), 1);
    }
}
