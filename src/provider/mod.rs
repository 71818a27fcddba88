//! Cloud provider adapters
//!
//! One agent set runs against any provider through [`ProviderAdapter`]; the
//! adapter owns the naming conventions (image references, service names,
//! simulated endpoints) and the CLI calls for build, deploy, monitoring and
//! rollback.

pub mod azure;
pub mod gcp;

use crate::core::config::{ProviderConfig, ProviderKind};
use crate::process::{CommandError, CommandRunner};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use azure::AzureContainerApps;
pub use gcp::GcpCloudRun;

/// Error types for provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Missing provider configuration: {0}")]
    Config(String),

    #[error("Unexpected CLI output: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Process output captured before the failure, if any
    pub fn captured_output(&self) -> Option<String> {
        match self {
            ProviderError::Command(e) => e.captured_output(),
            _ => None,
        }
    }
}

/// Share of traffic routed to a revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSplit {
    pub revision: String,
    pub percent: u32,
}

/// Health snapshot of a deployed target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetHealth {
    pub name: String,
    /// Messages of conditions that are not satisfied
    pub errors: Vec<String>,
    pub traffic: Vec<TrafficSplit>,
    pub latest_ready_revision: Option<String>,
}

impl TargetHealth {
    /// e.g. `100% → svc-00002-abc`
    pub fn traffic_summary(&self) -> String {
        if self.traffic.is_empty() {
            return "No traffic info".to_string();
        }
        self.traffic
            .iter()
            .map(|t| format!("{}% → {}", t.percent, t.revision))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A deployed revision of a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Sort revisions newest first; revisions without a timestamp go last
pub fn newest_first(revisions: &mut [Revision]) {
    revisions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Lowercase, alphanumerics and hyphens only, trimmed hyphens, at most `max_len` chars
pub fn sanitize_name(name: &str, max_len: usize) -> String {
    let sanitized: String = name
        .to_lowercase()
        .replace('_', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    let truncated: String = sanitized.trim_matches('-').chars().take(max_len).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Last path segment of an image reference without its tag
pub fn image_base_name(image: &str) -> &str {
    let last = image.rsplit('/').next().unwrap_or(image);
    last.split(':').next().unwrap_or(last)
}

/// Build, deploy and inspect workloads on one cloud provider
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Provider settings recorded in envelope inputs
    fn describe(&self) -> Value;

    /// Image reference a simulated build reports for `repo_name`
    fn simulated_image(&self, repo_name: &str) -> String;

    /// URL a simulated deployment of `image` reports
    fn simulated_endpoint(&self, image: &str) -> String;

    /// Whether `image` follows this provider's registry convention
    fn is_valid_artifact(&self, image: &str) -> bool;

    /// Deployable service name derived from an image reference
    fn service_name_for(&self, image: &str) -> String;

    /// Build and push an image from a checked-out repository
    async fn build(&self, source_dir: &Path, repo_name: &str) -> Result<String, ProviderError>;

    /// Deploy `image` as `service`, returning its public URL
    async fn deploy(&self, image: &str, service: &str) -> Result<String, ProviderError>;

    /// Names of all deployed targets
    async fn list_targets(&self) -> Result<Vec<String>, ProviderError>;

    async fn describe_target(&self, target: &str) -> Result<TargetHealth, ProviderError>;

    /// Revisions of `target`, newest first
    async fn list_revisions(&self, target: &str) -> Result<Vec<Revision>, ProviderError>;

    /// Route all traffic of `target` to `revision`
    async fn route_traffic(&self, target: &str, revision: &str) -> Result<(), ProviderError>;
}

/// Create the adapter selected by configuration
pub fn create_provider(config: &ProviderConfig, runner: Arc<dyn CommandRunner>) -> Arc<dyn ProviderAdapter> {
    match config.kind {
        ProviderKind::Gcp => Arc::new(GcpCloudRun::new(config.clone(), runner)),
        ProviderKind::Azure => Arc::new(AzureContainerApps::new(config.clone(), runner)),
    }
}

/// Parse CLI JSON output
pub(crate) fn parse_json(stdout: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(stdout.trim()).map_err(|e| ProviderError::Parse(e.to_string()))
}

pub(crate) fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
