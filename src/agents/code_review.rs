//! LLM code review of a repository

use super::{finalize, Agent, AgentContext};
use crate::core::{CodeReviewPayload, EnvelopeOverrides, EnvelopeSkeleton, Payload, ResultEnvelope, Stage};
use crate::llm::{render_messages, PromptMessage, PromptReply};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct CodeReviewParams {
    pub repo_url: String,
}

pub struct CodeReviewAgent;

const REVIEW_PROMPT: &str = "You are an expert code reviewer. Review the repository below for code \
quality, security issues, design flaws, missing documentation and test gaps.

Respond in plain text with these sections:
Summary
Issues
Good Practices
Recommended Changes
Risk Score (0-100)

List each issue as a bullet under Issues.";

#[async_trait]
impl Agent for CodeReviewAgent {
    type Params = CodeReviewParams;
    type Output = ResultEnvelope;

    async fn run(&self, ctx: &AgentContext, params: &CodeReviewParams) -> ResultEnvelope {
        let skeleton = EnvelopeSkeleton::new(Stage::CodeReview, false, false);
        let input = ctx.input(params);

        if ctx.mode.is_simulation() {
            let overrides = EnvelopeOverrides::success().payload(Payload::CodeReview(CodeReviewPayload {
                review: "This is a simulated code review summary.".to_string(),
                issues_found: 3,
                llm_analysis: "Simulated output".to_string(),
            }));
            return finalize(ctx, &skeleton, overrides, input).await;
        }

        info!("[{}] Reviewing {}", ctx.session_id, params.repo_url);
        let messages = vec![
            PromptMessage::system(REVIEW_PROMPT),
            PromptMessage::user(format!("Repository URL: {}", params.repo_url)),
        ];
        let input = input.with_prompt(Some(render_messages(&messages)));

        let overrides = match ctx.prompts.prompt(&messages).await {
            PromptReply::Text(review) => EnvelopeOverrides::success().payload(Payload::CodeReview(
                CodeReviewPayload {
                    issues_found: count_issues(&review),
                    llm_analysis: review.clone(),
                    review,
                },
            )),
            PromptReply::Failed(error) => {
                warn!("[{}] Code review failed: {}", ctx.session_id, error);
                EnvelopeOverrides::error(format!("Code review failed: {}", error))
                    .skippable(true)
                    .payload(Payload::CodeReview(CodeReviewPayload {
                        llm_analysis: String::new(),
                        ..Default::default()
                    }))
            }
        };

        finalize(ctx, &skeleton, overrides, input).await
    }
}

fn is_bullet(line: &str) -> bool {
    let line = line.trim_start();
    if line.starts_with("- ") || line.starts_with("* ") || line.starts_with("• ") {
        return true;
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && matches!(line[digits..].chars().next(), Some('.') | Some(')'))
}

/// Section names the review prompt asks for
const SECTIONS: [&str; 5] = ["summary", "issues", "good practices", "recommended changes", "risk score"];

fn is_heading(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || is_bullet(line) {
        return false;
    }
    if line.starts_with('#') || (line.starts_with("**") && line.trim_end_matches(':').ends_with("**")) {
        return true;
    }
    let name = line
        .trim_end_matches(':')
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    SECTIONS
        .iter()
        .any(|section| name == *section || name.starts_with(&format!("{} (", section)))
}

/// Number of bullet lines in the review's "Issues" section
pub(crate) fn count_issues(review: &str) -> u32 {
    let mut in_issues = false;
    let mut count = 0;
    for line in review.lines() {
        if is_heading(line) {
            in_issues = line.to_lowercase().contains("issues");
            continue;
        }
        if in_issues && is_bullet(line) {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::core::ExecutionMode;
    use crate::llm::SIMULATED_RESPONSE;
    use crate::process::testing::ScriptedRunner;
    use std::sync::Arc;

    fn params() -> CodeReviewParams {
        CodeReviewParams {
            repo_url: "https://github.com/acme/widgets".to_string(),
        }
    }

    #[test]
    fn test_count_issues() {
        let review = "## Summary\nLooks fine overall.\n\n## 🛑 Issues Detected\n- Hardcoded secret in config.py\n- No input validation\n  - nested detail\n1. SQL built by string formatting\n\n## Good Practices\n- Clear module layout\n";
        assert_eq!(count_issues(review), 4);
        assert_eq!(count_issues("No structure at all, just prose about the code."), 0);
    }

    #[test]
    fn test_prose_inside_issues_keeps_section_open() {
        let review = "Summary\nFine.\n\nIssues\nFound the following problems:\n- Hardcoded secret\n- No validation\n";
        assert_eq!(count_issues(review), 2);

        let review = "**Issues**\nA few things stand out.\n- Unpinned dependencies\nRisk Score (0-100)\n- 40\n";
        assert_eq!(count_issues(review), 1);
    }

    #[tokio::test]
    async fn test_simulation_result() {
        let t = context(
            ExecutionMode::Simulation,
            Arc::new(FixedPrompts::text(SIMULATED_RESPONSE)),
            ScriptedRunner::new(),
        );
        let envelope = CodeReviewAgent.run(&t.ctx, &params()).await;

        assert!(envelope.is_success());
        assert!(!envelope.critical);
        assert_eq!(envelope.code_review().unwrap().issues_found, 3);
        assert_eq!(t.logger.count(), 1);
    }

    #[tokio::test]
    async fn test_production_parses_issue_count() {
        let prompts = Arc::new(FixedPrompts::text("Issues:\n- one\n- two\nGood Practices:\n- tidy"));
        let t = context(ExecutionMode::Production, prompts.clone(), ScriptedRunner::new());
        let envelope = CodeReviewAgent.run(&t.ctx, &params()).await;

        assert!(envelope.is_success());
        assert_eq!(envelope.code_review().unwrap().issues_found, 2);
        assert!(envelope.input.prompt_used.as_deref().unwrap().contains("acme/widgets"));
        assert_eq!(prompts.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_llm_failure_is_skippable_error() {
        let t = context(
            ExecutionMode::Production,
            Arc::new(FixedPrompts::failed("rate limited")),
            ScriptedRunner::new(),
        );
        let envelope = CodeReviewAgent.run(&t.ctx, &params()).await;

        assert!(envelope.is_error());
        assert!(!envelope.critical);
        assert!(envelope.skippable);
        assert!(envelope.reason.as_deref().unwrap().contains("rate limited"));
        assert_eq!(t.logger.count(), 1);
    }
}
