//! Result envelope - the uniform contract every agent produces
//!
//! An envelope is built in two steps: an [`EnvelopeSkeleton`] fixes the
//! stage, its default criticality and the creation timestamp; the agent then
//! merges [`EnvelopeOverrides`] computed by its simulation or production path
//! and calls [`EnvelopeSkeleton::finish`], which validates the result.

use crate::core::{mode::ExecutionMode, stage::Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Outcome of a stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Only valid on a skeleton, before the agent assigns an outcome
    #[default]
    Unknown,
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Success => "success",
            Status::Error => "error",
        }
    }
}

/// Contract violations detected when finishing an envelope
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("stage {0} finished without a terminal status")]
    StatusUnset(Stage),

    #[error("stage {stage} produced a {payload} payload")]
    PayloadMismatch { stage: Stage, payload: Stage },

    #[error("stage {0} reported an error without a reason")]
    MissingReason(Stage),
}

/// Snapshot of the parameters an agent was invoked with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    /// Mode the agent ran in
    pub mode: ExecutionMode,

    /// Stage-specific parameters
    pub params: Value,

    /// Provider configuration the agent saw, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Value>,

    /// Prompt sent to the LLM, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_used: Option<String>,
}

impl InputSnapshot {
    pub fn new<P: Serialize>(mode: ExecutionMode, params: &P) -> Self {
        let params = serde_json::to_value(params)
            .unwrap_or_else(|e| serde_json::json!({ "unserializable": e.to_string() }));
        Self {
            mode,
            params,
            provider: None,
            prompt_used: None,
        }
    }

    pub fn with_provider(mut self, provider: Value) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt_used = prompt;
        self
    }
}

/// Confidence reported by the build failure analyzer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Lenient parse of an LLM-provided confidence label
    pub fn parse_lenient(s: &str) -> Self {
        let lower = s.trim().to_lowercase();
        if lower.starts_with("high") {
            Confidence::High
        } else if lower.starts_with("med") {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeReviewPayload {
    pub review: String,
    pub issues_found: u32,
    pub llm_analysis: String,
}

impl Default for CodeReviewPayload {
    fn default() -> Self {
        Self {
            review: "N/A".to_string(),
            issues_found: 0,
            llm_analysis: "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestWriterPayload {
    pub generated_tests: Vec<String>,
    pub coverage: String,
    pub output: String,
}

impl Default for TestWriterPayload {
    fn default() -> Self {
        Self {
            generated_tests: Vec::new(),
            coverage: "0%".to_string(),
            output: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionPayload {
    pub summary: String,
    pub tests_ran: u32,
    pub failures: Vec<String>,
    pub output: String,
    pub raw_test_output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPayload {
    pub image_url: Option<String>,
    /// Raw build output, attached when the build fails
    pub logs: Option<String>,
    pub llm_analysis: String,
}

impl Default for BuildPayload {
    fn default() -> Self {
        Self {
            image_url: None,
            logs: None,
            llm_analysis: "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildFailurePayload {
    pub root_cause: String,
    pub recommendations: String,
    pub step_failed: String,
    pub confidence: Confidence,
    pub llm_analysis: String,
}

impl Default for BuildFailurePayload {
    fn default() -> Self {
        Self {
            root_cause: "N/A".to_string(),
            recommendations: "N/A".to_string(),
            step_failed: "N/A".to_string(),
            confidence: Confidence::Low,
            llm_analysis: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployPayload {
    pub deployed_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorPayload {
    pub target: String,
    pub summary: String,
    pub traffic_status: String,
    pub errors: Vec<String>,
    pub last_deployed_revision: String,
}

impl Default for MonitorPayload {
    fn default() -> Self {
        Self {
            target: String::new(),
            summary: "N/A".to_string(),
            traffic_status: "N/A".to_string(),
            errors: Vec::new(),
            last_deployed_revision: "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackPayload {
    pub restored: bool,
    pub previous_revision: Option<String>,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrePayload {
    pub summary: String,
    pub root_cause: String,
    pub recommended_actions: String,
    /// Always within 0..=100
    pub risk_score: u8,
    pub output: String,
}

impl Default for SrePayload {
    fn default() -> Self {
        Self {
            summary: "N/A".to_string(),
            root_cause: "N/A".to_string(),
            recommended_actions: "N/A".to_string(),
            risk_score: 0,
            output: String::new(),
        }
    }
}

/// Stage-specific fields, one fixed schema per stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Payload {
    CodeReview(CodeReviewPayload),
    TestWriter(TestWriterPayload),
    RegressionCheck(RegressionPayload),
    Build(BuildPayload),
    BuildFailureAnalyzer(BuildFailurePayload),
    Deploy(DeployPayload),
    Monitor(MonitorPayload),
    Rollback(RollbackPayload),
    Sre(SrePayload),
}

impl Payload {
    /// Default payload for a stage (the skeleton's payload)
    pub fn default_for(stage: Stage) -> Self {
        match stage {
            Stage::CodeReview => Payload::CodeReview(Default::default()),
            Stage::TestWriter => Payload::TestWriter(Default::default()),
            Stage::RegressionCheck => Payload::RegressionCheck(Default::default()),
            Stage::Build => Payload::Build(Default::default()),
            Stage::BuildFailureAnalyzer => Payload::BuildFailureAnalyzer(Default::default()),
            Stage::Deploy => Payload::Deploy(Default::default()),
            Stage::Monitor => Payload::Monitor(Default::default()),
            Stage::Rollback => Payload::Rollback(Default::default()),
            Stage::Sre => Payload::Sre(Default::default()),
        }
    }

    /// Stage this payload belongs to
    pub fn stage(&self) -> Stage {
        match self {
            Payload::CodeReview(_) => Stage::CodeReview,
            Payload::TestWriter(_) => Stage::TestWriter,
            Payload::RegressionCheck(_) => Stage::RegressionCheck,
            Payload::Build(_) => Stage::Build,
            Payload::BuildFailureAnalyzer(_) => Stage::BuildFailureAnalyzer,
            Payload::Deploy(_) => Stage::Deploy,
            Payload::Monitor(_) => Stage::Monitor,
            Payload::Rollback(_) => Stage::Rollback,
            Payload::Sre(_) => Stage::Sre,
        }
    }
}

macro_rules! payload_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self) -> Option<&$ty> {
            match &self.payload {
                Payload::$variant(p) => Some(p),
                _ => None,
            }
        }
    };
}

/// The envelope every agent invocation produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub status: Status,

    /// A failure here halts the pipeline
    pub critical: bool,

    /// Downstream stages may ignore this stage's failure
    pub skippable: bool,

    /// Creation time of the skeleton
    pub timestamp: DateTime<Utc>,

    pub input: InputSnapshot,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub payload: Payload,
}

impl ResultEnvelope {
    pub fn stage(&self) -> Stage {
        self.payload.stage()
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    /// Check the envelope against the contract
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.status == Status::Unknown {
            return Err(EnvelopeError::StatusUnset(self.stage()));
        }
        if self.status == Status::Error && self.reason.as_deref().map_or(true, str::is_empty) {
            return Err(EnvelopeError::MissingReason(self.stage()));
        }
        Ok(())
    }

    payload_accessor!(code_review, CodeReview, CodeReviewPayload);
    payload_accessor!(test_writer, TestWriter, TestWriterPayload);
    payload_accessor!(regression, RegressionCheck, RegressionPayload);
    payload_accessor!(build, Build, BuildPayload);
    payload_accessor!(build_failure, BuildFailureAnalyzer, BuildFailurePayload);
    payload_accessor!(deploy, Deploy, DeployPayload);
    payload_accessor!(monitor, Monitor, MonitorPayload);
    payload_accessor!(rollback, Rollback, RollbackPayload);
    payload_accessor!(sre, Sre, SrePayload);
}

/// Default shape of an envelope before the agent runs
#[derive(Debug, Clone)]
pub struct EnvelopeSkeleton {
    stage: Stage,
    critical: bool,
    skippable: bool,
    timestamp: DateTime<Utc>,
}

impl EnvelopeSkeleton {
    pub fn new(stage: Stage, critical: bool, skippable: bool) -> Self {
        Self {
            stage,
            critical,
            skippable,
            timestamp: Utc::now(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Merge overrides onto the skeleton and validate the result
    pub fn finish(
        &self,
        overrides: EnvelopeOverrides,
        input: InputSnapshot,
    ) -> Result<ResultEnvelope, EnvelopeError> {
        let payload = overrides
            .payload
            .unwrap_or_else(|| Payload::default_for(self.stage));
        if payload.stage() != self.stage {
            return Err(EnvelopeError::PayloadMismatch {
                stage: self.stage,
                payload: payload.stage(),
            });
        }

        let envelope = ResultEnvelope {
            status: overrides.status.unwrap_or_default(),
            critical: overrides.critical.unwrap_or(self.critical),
            skippable: overrides.skippable.unwrap_or(self.skippable),
            timestamp: self.timestamp,
            input,
            reason: overrides.reason,
            payload,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Well-formed error envelope standing in for one that failed validation
    pub fn contract_violation(&self, error: &EnvelopeError, input: InputSnapshot) -> ResultEnvelope {
        ResultEnvelope {
            status: Status::Error,
            critical: self.critical,
            skippable: self.skippable,
            timestamp: self.timestamp,
            input,
            reason: Some(format!("contract violation: {}", error)),
            payload: Payload::default_for(self.stage),
        }
    }
}

/// Fields an agent assigns after its simulation or production path.
///
/// Setting a field twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvelopeOverrides {
    pub status: Option<Status>,
    pub critical: Option<bool>,
    pub skippable: Option<bool>,
    pub reason: Option<String>,
    pub payload: Option<Payload>,
}

impl EnvelopeOverrides {
    pub fn success() -> Self {
        Self {
            status: Some(Status::Success),
            ..Default::default()
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: Some(Status::Error),
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }

    pub fn skippable(mut self, skippable: bool) -> Self {
        self.skippable = Some(skippable);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Apply `later` on top of `self`; fields set in `later` win
    pub fn merge(self, later: EnvelopeOverrides) -> Self {
        Self {
            status: later.status.or(self.status),
            critical: later.critical.or(self.critical),
            skippable: later.skippable.or(self.skippable),
            reason: later.reason.or(self.reason),
            payload: later.payload.or(self.payload),
        }
    }
}
