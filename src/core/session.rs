//! Pipeline session - the per-run record of stage results

use crate::core::{envelope::ResultEnvelope, mode::ExecutionMode, stage::Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;
use uuid::Uuid;

/// Generate a unique session id: `session_<YYYYmmddHHMMSS>_<6 hex>`
pub fn new_session_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", timestamp, &suffix[..6])
}

/// Result recorded for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageResult {
    /// A single envelope
    Single(ResultEnvelope),
    /// One envelope per monitored target
    FanOut(BTreeMap<String, ResultEnvelope>),
}

impl StageResult {
    /// The single envelope, if this is not a fan-out result
    pub fn envelope(&self) -> Option<&ResultEnvelope> {
        match self {
            StageResult::Single(envelope) => Some(envelope),
            StageResult::FanOut(_) => None,
        }
    }

    /// All envelopes in this result
    pub fn envelopes(&self) -> Vec<&ResultEnvelope> {
        match self {
            StageResult::Single(envelope) => vec![envelope],
            StageResult::FanOut(map) => map.values().collect(),
        }
    }

    /// Whether every envelope in this result succeeded
    pub fn is_success(&self) -> bool {
        self.envelopes().iter().all(|e| e.is_success())
    }
}

/// A single pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID
    pub id: String,

    /// Mode the run used
    pub mode: ExecutionMode,

    /// When the run started
    pub started_at: DateTime<Utc>,

    results: HashMap<Stage, StageResult>,

    /// Stages in the order they were recorded
    order: Vec<Stage>,
}

impl Session {
    pub fn new(mode: ExecutionMode) -> Self {
        Self::with_id(new_session_id(), mode)
    }

    pub fn with_id(id: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            id: id.into(),
            mode,
            started_at: Utc::now(),
            results: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Record a stage result. A stage's result is final once recorded;
    /// a second record for the same stage is refused.
    pub fn record(&mut self, stage: Stage, result: StageResult) -> bool {
        if self.results.contains_key(&stage) {
            warn!(
                "Session {} already has a result for stage {}, ignoring new one",
                self.id, stage
            );
            return false;
        }
        self.results.insert(stage, result);
        self.order.push(stage);
        true
    }

    pub fn get(&self, stage: Stage) -> Option<&StageResult> {
        self.results.get(&stage)
    }

    /// The single envelope recorded for a stage
    pub fn envelope(&self, stage: Stage) -> Option<&ResultEnvelope> {
        self.get(stage).and_then(StageResult::envelope)
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.results.contains_key(&stage)
    }

    /// Recorded stages in recording order
    pub fn stages(&self) -> &[Stage] {
        &self.order
    }

    /// Iterate over recorded results in recording order
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &StageResult)> {
        self.order
            .iter()
            .filter_map(move |stage| self.results.get(stage).map(|r| (*stage, r)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
