//! CLI output formatting

use crate::core::{ResultEnvelope, Session, Stage, StageResult, Status};
use crate::execution::{ExecutionEvent, PipelineOutcome};
use crate::persistence::{HistoryEntry, SessionSummary};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Spinner shown while a stage runs
pub fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Terminal width, 80 when unknown
pub fn terminal_width() -> usize {
    term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80)
}

/// Horizontal rule across the terminal
pub fn separator() -> String {
    style("─".repeat(terminal_width().min(100))).dim().to_string()
}

/// Format an envelope status for display
pub fn format_status(status: Status) -> String {
    match status {
        Status::Success => style("SUCCESS").green().to_string(),
        Status::Error => style("ERROR").red().to_string(),
        Status::Unknown => style("UNKNOWN").dim().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            session_id,
            repo_url,
            mode,
        } => format!(
            "{} Starting pipeline for {} ({}, {})",
            ROCKET,
            style(repo_url).bold(),
            style(mode).cyan(),
            style(session_id).dim()
        ),
        ExecutionEvent::StageStarted { stage } => format!("{} {}", SPINNER, style(stage.title()).cyan()),
        ExecutionEvent::StageFinished {
            stage,
            success: true,
            ..
        } => format!("{} {}", CHECK, style(stage.title()).green()),
        ExecutionEvent::StageFinished {
            stage,
            success: false,
            reason,
        } => format!(
            "{} {}: {}",
            CROSS,
            style(stage.title()).red(),
            style(reason.as_deref().unwrap_or("failed")).dim()
        ),
        ExecutionEvent::StageSkipped { stage, reason } => {
            format!("{} {} ({})", SKIP, style(stage.title()).dim(), reason)
        }
        ExecutionEvent::GateClosed { blocking } => format!(
            "{} Deploy gate closed by {}",
            WARN,
            style(stage_list(blocking)).yellow()
        ),
        ExecutionEvent::PipelineFinished { session_id, outcome } => {
            let outcome = match outcome {
                PipelineOutcome::Completed => format!("{} completed", style("successfully").green()),
                PipelineOutcome::Halted { .. } => style("halted before deploy").red().to_string(),
            };
            format!("{} Pipeline ({}) {}", INFO, style(session_id).dim(), outcome)
        }
    }
}

fn stage_list(stages: &[Stage]) -> String {
    stages.iter().map(Stage::title).collect::<Vec<_>>().join(", ")
}

/// Short description of what an envelope produced
pub fn envelope_headline(envelope: &ResultEnvelope) -> String {
    if let Some(reason) = envelope.reason.as_deref().filter(|_| envelope.is_error()) {
        return reason.to_string();
    }
    if let Some(review) = envelope.code_review() {
        return format!("{} issue(s) found", review.issues_found);
    }
    if let Some(tests) = envelope.test_writer() {
        return format!("{} test file(s), coverage {}", tests.generated_tests.len(), tests.coverage);
    }
    if let Some(regression) = envelope.regression() {
        return format!("{} ({} tests)", regression.summary, regression.tests_ran);
    }
    if let Some(build) = envelope.build() {
        return build.image_url.clone().unwrap_or_else(|| "no image".to_string());
    }
    if let Some(analysis) = envelope.build_failure() {
        return format!("{} ({:?} confidence)", analysis.root_cause, analysis.confidence);
    }
    if let Some(deploy) = envelope.deploy() {
        return deploy.deployed_url.clone().unwrap_or_default();
    }
    if let Some(monitor) = envelope.monitor() {
        return format!("{}: {} [{}]", monitor.target, monitor.summary, monitor.traffic_status);
    }
    if let Some(rollback) = envelope.rollback() {
        return match &rollback.previous_revision {
            Some(revision) if rollback.restored => format!("restored {}", revision),
            _ => "nothing restored".to_string(),
        };
    }
    if let Some(sre) = envelope.sre() {
        return format!("risk {} - {}", sre.risk_score, sre.summary);
    }
    String::new()
}

fn envelope_line(label: &str, envelope: &ResultEnvelope) -> String {
    let icon = if envelope.is_success() { CHECK } else { CROSS };
    let critical = if envelope.critical {
        format!(" {}", style("[critical]").red().bold())
    } else {
        String::new()
    };
    format!(
        "{}{:<24} {}{} {}",
        icon,
        style(label).bold(),
        format_status(envelope.status),
        critical,
        style(envelope_headline(envelope)).dim()
    )
}

/// One line per recorded envelope, in recording order
pub fn format_session(session: &Session) -> Vec<String> {
    let mut lines = Vec::new();
    for (stage, result) in session.iter() {
        match result {
            StageResult::Single(envelope) => lines.push(envelope_line(stage.title(), envelope)),
            StageResult::FanOut(envelopes) => {
                for (target, envelope) in envelopes {
                    lines.push(envelope_line(&format!("{} ({})", stage.title(), target), envelope));
                }
            }
        }
    }
    lines
}

/// Format a session summary for display
pub fn format_session_summary(summary: &SessionSummary) -> String {
    let icon = if summary.errors == 0 { CHECK } else { CROSS };
    format!(
        "{}{} - {} envelope(s), {} error(s) - {}",
        icon,
        style(&summary.session_id).cyan(),
        summary.entries,
        style(summary.errors).red(),
        style(summary.last_recorded.to_rfc3339()).dim()
    )
}

/// Format a history entry for display
pub fn format_history_entry(entry: &HistoryEntry) -> String {
    format!(
        "{} {} {}",
        style(entry.recorded_at.to_rfc3339()).dim(),
        style(&entry.session_id).cyan(),
        envelope_line(entry.stage.title(), &entry.envelope)
    )
}
