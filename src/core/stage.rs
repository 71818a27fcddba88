//! Pipeline stage identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A pipeline stage, one per agent variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CodeReview,
    TestWriter,
    RegressionCheck,
    Build,
    BuildFailureAnalyzer,
    Deploy,
    Monitor,
    Rollback,
    Sre,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 9] = [
        Stage::CodeReview,
        Stage::TestWriter,
        Stage::RegressionCheck,
        Stage::Build,
        Stage::BuildFailureAnalyzer,
        Stage::Deploy,
        Stage::Monitor,
        Stage::Rollback,
        Stage::Sre,
    ];

    /// Stages that must all succeed before deployment is attempted
    pub const PRE_DEPLOY: [Stage; 4] = [
        Stage::CodeReview,
        Stage::TestWriter,
        Stage::RegressionCheck,
        Stage::Build,
    ];

    /// Key used in session logs and history queries
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CodeReview => "code_review",
            Stage::TestWriter => "test_writer",
            Stage::RegressionCheck => "regression_check",
            Stage::Build => "build",
            Stage::BuildFailureAnalyzer => "build_failure_analyzer",
            Stage::Deploy => "deploy",
            Stage::Monitor => "monitor",
            Stage::Rollback => "rollback",
            Stage::Sre => "sre",
        }
    }

    /// Human-readable title
    pub fn title(&self) -> &'static str {
        match self {
            Stage::CodeReview => "Code Review",
            Stage::TestWriter => "Test Writer",
            Stage::RegressionCheck => "Regression Check",
            Stage::Build => "Build",
            Stage::BuildFailureAnalyzer => "Build Failure Analysis",
            Stage::Deploy => "Deploy",
            Stage::Monitor => "Monitor",
            Stage::Rollback => "Rollback",
            Stage::Sre => "SRE Audit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| format!("Unknown stage: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_round_trip_through_from_str() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>(), Ok(stage));
        }
        assert_eq!("build-failure-analyzer".parse::<Stage>(), Ok(Stage::BuildFailureAnalyzer));
        assert!("lint".parse::<Stage>().is_err());
    }
}
