//! Application configuration from YAML

use crate::core::mode::ExecutionMode;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Top-level configuration loaded from YAML. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Execution mode for agent invocations
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Cloud provider selection and naming
    #[serde(default)]
    pub provider: ProviderConfig,

    /// LLM prompt service
    #[serde(default)]
    pub llm: LlmConfig,

    /// Source control clone settings
    #[serde(default)]
    pub source: SourceConfig,

    /// External command settings (test runner, coverage, timeouts)
    #[serde(default)]
    pub commands: CommandsConfig,

    /// Session history store
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Supported cloud providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Cloud Build + Cloud Run
    #[default]
    Gcp,
    /// Azure Container Registry + Container Apps
    Azure,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Gcp => write!(f, "gcp"),
            ProviderKind::Azure => write!(f, "azure"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gcp" | "google" | "cloudrun" => Ok(ProviderKind::Gcp),
            "azure" | "az" => Ok(ProviderKind::Azure),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    /// GCP project ID (also used as a label for Azure runs)
    #[serde(default)]
    pub project: Option<String>,

    /// GCP region
    #[serde(default = "default_region")]
    pub region: String,

    /// Azure container registry name
    #[serde(default)]
    pub registry: Option<String>,

    /// Azure resource group
    #[serde(default)]
    pub resource_group: Option<String>,

    /// Azure location
    #[serde(default = "default_location")]
    pub location: String,

    /// Service rolled back when no deployment produced a name
    #[serde(default = "default_service")]
    pub service: String,

    /// Targets reported by monitor discovery in simulation mode
    #[serde(default = "default_simulated_targets")]
    pub simulated_targets: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            project: None,
            region: default_region(),
            registry: None,
            resource_group: None,
            location: default_location(),
            service: default_service(),
            simulated_targets: default_simulated_targets(),
        }
    }
}

fn default_region() -> String {
    "us-central1".to_string()
}

fn default_location() -> String {
    "eastus".to_string()
}

fn default_service() -> String {
    "agentops-app".to_string()
}

fn default_simulated_targets() -> Vec<String> {
    vec!["simulated-service".to_string()]
}

/// LLM backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// OpenAI-compatible chat completions API
    #[default]
    Openai,
    /// Google Generative AI
    Gemini,
    /// A local CLI in print mode
    Cli,
}

/// LLM prompt service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub backend: LlmBackend,

    /// Base URL (HTTP backends) or executable path (CLI backend)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            endpoint: None,
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

/// Source control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Required prefix of every repository URL
    #[serde(default = "default_host_prefix")]
    pub host_prefix: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host_prefix: default_host_prefix(),
        }
    }
}

fn default_host_prefix() -> String {
    "https://github.com/".to_string()
}

/// External command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Timeout applied to every subprocess
    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,

    /// Regression test runner
    #[serde(default = "default_test_command")]
    pub test_command: Vec<String>,

    /// Optional dependency setup run before the tests
    #[serde(default)]
    pub setup_command: Option<Vec<String>>,

    /// Runs the generated tests under coverage
    #[serde(default = "default_coverage_command")]
    pub coverage_command: Vec<String>,

    /// Prints the coverage report
    #[serde(default = "default_coverage_report_command")]
    pub coverage_report_command: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_command_timeout(),
            test_command: default_test_command(),
            setup_command: None,
            coverage_command: default_coverage_command(),
            coverage_report_command: default_coverage_report_command(),
        }
    }
}

fn default_command_timeout() -> u64 {
    1800
}

fn default_test_command() -> Vec<String> {
    ["pytest", "--tb=short", "--maxfail=5"].iter().map(|s| s.to_string()).collect()
}

fn default_coverage_command() -> Vec<String> {
    ["coverage", "run", "-m", "unittest", "discover", "-s", "tests"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_coverage_report_command() -> Vec<String> {
    ["coverage", "report"].iter().map(|s| s.to_string()).collect()
}

/// Session history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Persist session logs to the database
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SQLite database path (defaults to the platform data dir)
    #[serde(default)]
    pub database: Option<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural constraints
    pub fn validate(&self) -> Result<()> {
        if self.source.host_prefix.trim().is_empty() {
            anyhow::bail!("source.host_prefix must not be empty");
        }
        if self.commands.timeout_secs == 0 {
            anyhow::bail!("commands.timeout_secs must be greater than zero");
        }
        if self.llm.timeout_secs == 0 {
            anyhow::bail!("llm.timeout_secs must be greater than zero");
        }
        for (name, command) in [
            ("test_command", &self.commands.test_command),
            ("coverage_command", &self.commands.coverage_command),
            ("coverage_report_command", &self.commands.coverage_report_command),
        ] {
            if command.is_empty() {
                anyhow::bail!("commands.{} must name a program", name);
            }
        }
        if let Some(setup) = &self.commands.setup_command {
            if setup.is_empty() {
                anyhow::bail!("commands.setup_command must name a program when set");
            }
        }
        if self.provider.simulated_targets.is_empty() {
            anyhow::bail!("provider.simulated_targets must list at least one target");
        }
        if self.provider.simulated_targets.iter().any(|t| t.trim().is_empty()) {
            anyhow::bail!("provider.simulated_targets must not contain empty names");
        }
        Ok(())
    }

    /// Check that everything a production run needs is present
    pub fn check_runnable(&self) -> Result<()> {
        self.validate()?;

        if self.mode.is_simulation() {
            return Ok(());
        }

        match self.provider.kind {
            ProviderKind::Gcp => {
                if self.provider.project.is_none() {
                    anyhow::bail!("provider.project is required for GCP production runs");
                }
            }
            ProviderKind::Azure => {
                if self.provider.registry.is_none() {
                    anyhow::bail!("provider.registry is required for Azure production runs");
                }
                if self.provider.resource_group.is_none() {
                    anyhow::bail!("provider.resource_group is required for Azure production runs");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.mode, ExecutionMode::Simulation);
        assert_eq!(config.provider.kind, ProviderKind::Gcp);
        assert_eq!(config.provider.region, "us-central1");
        assert_eq!(config.provider.simulated_targets, vec!["simulated-service".to_string()]);
        assert_eq!(config.source.host_prefix, "https://github.com/");
        assert_eq!(config.commands.test_command[0], "pytest");
        assert!(config.history.enabled);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
mode: production
provider:
  kind: azure
  project: "acme-proj"
  registry: "acmeregistry"
  resource_group: "acme-rg"
  location: "westeurope"
  simulated_targets: ["api", "worker"]
llm:
  backend: gemini
  model: "gemini-2.0-flash"
  api_key_env: "GEMINI_API_KEY"
commands:
  timeout_secs: 600
  setup_command: ["pip", "install", "-r", "requirements.txt"]
history:
  enabled: false
"#;

        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.mode, ExecutionMode::Production);
        assert_eq!(config.provider.kind, ProviderKind::Azure);
        assert_eq!(config.provider.registry.as_deref(), Some("acmeregistry"));
        assert_eq!(config.provider.simulated_targets.len(), 2);
        assert_eq!(config.llm.backend, LlmBackend::Gemini);
        assert_eq!(config.commands.timeout_secs, 600);
        assert!(config.commands.setup_command.is_some());
        assert!(!config.history.enabled);
        config.check_runnable().expect("azure config is complete");
    }

    #[test]
    fn test_empty_test_command_fails() {
        let yaml = r#"
commands:
  test_command: []
"#;
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_zero_timeout_fails() {
        let yaml = r#"
llm:
  timeout_secs: 0
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err().to_string();
        assert!(err.contains("llm.timeout_secs"));
    }

    #[test]
    fn test_empty_simulated_targets_fails() {
        let yaml = r#"
provider:
  simulated_targets: []
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err().to_string();
        assert!(err.contains("provider.simulated_targets"));
    }

    #[test]
    fn test_production_gcp_requires_project() {
        let yaml = r#"
mode: production
provider:
  kind: gcp
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        let err = config.check_runnable().unwrap_err().to_string();
        assert!(err.contains("provider.project"));
    }

    #[test]
    fn test_simulation_needs_no_provider_details() {
        let config = AppConfig::default();
        config.check_runnable().expect("simulation runs need no cloud settings");
    }

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("Azure".parse::<ProviderKind>(), Ok(ProviderKind::Azure));
        assert_eq!("gcp".parse::<ProviderKind>(), Ok(ProviderKind::Gcp));
        assert!("aws".parse::<ProviderKind>().is_err());
    }
}
