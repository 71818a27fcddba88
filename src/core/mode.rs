//! Execution mode selection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether agents produce deterministic mock output or perform real external calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Deterministic mock output, no external calls
    #[default]
    Simulation,
    /// Real LLM, cloud CLI and source control calls
    Production,
}

impl ExecutionMode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, ExecutionMode::Simulation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Simulation => "simulation",
            ExecutionMode::Production => "production",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simulation" | "sim" => Ok(ExecutionMode::Simulation),
            "production" | "prod" => Ok(ExecutionMode::Production),
            _ => Err(format!("Unknown execution mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_simulation() {
        assert_eq!(ExecutionMode::default(), ExecutionMode::Simulation);
        assert!(ExecutionMode::default().is_simulation());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("production".parse::<ExecutionMode>(), Ok(ExecutionMode::Production));
        assert_eq!("SIM".parse::<ExecutionMode>(), Ok(ExecutionMode::Simulation));
        assert!("staging".parse::<ExecutionMode>().is_err());
    }
}
