//! Deploy gate over the pre-deploy stages

use crate::core::{Session, Stage};
use serde::{Deserialize, Serialize};

/// Whether deployment may proceed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateVerdict {
    Open,
    /// Pre-deploy stages that are missing or did not succeed
    Closed { blocking: Vec<Stage> },
}

impl GateVerdict {
    pub fn is_open(&self) -> bool {
        matches!(self, GateVerdict::Open)
    }
}

/// Strict AND over the pre-deploy stages.
///
/// `skippable` and `critical` are not consulted: a skippable error still
/// closes the gate, as does a stage with no recorded result.
pub fn deploy_gate(session: &Session) -> GateVerdict {
    let blocking: Vec<Stage> = Stage::PRE_DEPLOY
        .iter()
        .copied()
        .filter(|stage| !session.get(*stage).is_some_and(|result| result.is_success()))
        .collect();

    if blocking.is_empty() {
        GateVerdict::Open
    } else {
        GateVerdict::Closed { blocking }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        EnvelopeOverrides, EnvelopeSkeleton, ExecutionMode, InputSnapshot, ResultEnvelope, StageResult,
    };
    use serde_json::json;

    fn envelope(stage: Stage, overrides: EnvelopeOverrides) -> StageResult {
        let input = InputSnapshot::new(ExecutionMode::Simulation, &json!({}));
        let envelope: ResultEnvelope = EnvelopeSkeleton::new(stage, false, false)
            .finish(overrides, input)
            .unwrap();
        StageResult::Single(envelope)
    }

    fn session_with(failing: Option<Stage>) -> Session {
        let mut session = Session::new(ExecutionMode::Simulation);
        for stage in Stage::PRE_DEPLOY {
            let overrides = if Some(stage) == failing {
                EnvelopeOverrides::error("boom").skippable(true)
            } else {
                EnvelopeOverrides::success()
            };
            session.record(stage, envelope(stage, overrides));
        }
        session
    }

    #[test]
    fn test_all_success_opens_gate() {
        assert_eq!(deploy_gate(&session_with(None)), GateVerdict::Open);
    }

    #[test]
    fn test_skippable_error_closes_gate() {
        for stage in Stage::PRE_DEPLOY {
            assert_eq!(
                deploy_gate(&session_with(Some(stage))),
                GateVerdict::Closed { blocking: vec![stage] }
            );
        }
    }

    #[test]
    fn test_missing_stage_blocks() {
        let mut session = Session::new(ExecutionMode::Simulation);
        session.record(Stage::CodeReview, envelope(Stage::CodeReview, EnvelopeOverrides::success()));

        let verdict = deploy_gate(&session);
        assert_eq!(
            verdict,
            GateVerdict::Closed {
                blocking: vec![Stage::TestWriter, Stage::RegressionCheck, Stage::Build]
            }
        );
        assert!(!verdict.is_open());
    }
}
