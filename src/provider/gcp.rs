//! Google Cloud Run via the `gcloud` CLI

use super::{
    image_base_name, newest_first, parse_json, parse_timestamp, sanitize_name, ProviderAdapter,
    ProviderError, Revision, TargetHealth, TrafficSplit,
};
use crate::core::config::{ProviderConfig, ProviderKind};
use crate::process::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Cloud Run service names are limited to 63 characters
const MAX_SERVICE_NAME: usize = 63;

pub struct GcpCloudRun {
    config: ProviderConfig,
    runner: Arc<dyn CommandRunner>,
}

impl GcpCloudRun {
    pub fn new(config: ProviderConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    fn project(&self) -> Result<&str, ProviderError> {
        self.config
            .project
            .as_deref()
            .ok_or_else(|| ProviderError::Config("provider.project is not set".to_string()))
    }

    fn project_label(&self) -> &str {
        self.config.project.as_deref().unwrap_or("agentops")
    }

    /// `gcloud <args> --project <p> --region <r>`
    fn gcloud<I, S>(&self, args: I) -> Result<CommandSpec, ProviderError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(CommandSpec::new("gcloud")
            .args(args)
            .args(["--project", self.project()?])
            .args(["--region", self.config.region.as_str()]))
    }

    async fn run_json(&self, spec: CommandSpec) -> Result<Value, ProviderError> {
        let output = self.runner.run_checked(&spec.args(["--format", "json"])).await?;
        parse_json(&output.stdout)
    }
}

#[async_trait]
impl ProviderAdapter for GcpCloudRun {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gcp
    }

    fn describe(&self) -> Value {
        json!({
            "provider": "gcp",
            "project": self.config.project,
            "region": self.config.region,
        })
    }

    fn simulated_image(&self, repo_name: &str) -> String {
        format!("gcr.io/{}-sim/{}", self.project_label(), repo_name)
    }

    fn simulated_endpoint(&self, image: &str) -> String {
        let repo = image.rsplit('/').next().unwrap_or(image);
        format!("https://{}-sim.cloudrun.app/{}", self.project_label(), repo)
    }

    fn is_valid_artifact(&self, image: &str) -> bool {
        image.starts_with("gcr.io/") || image.contains("-docker.pkg.dev/")
    }

    fn service_name_for(&self, image: &str) -> String {
        sanitize_name(image_base_name(image), MAX_SERVICE_NAME)
    }

    async fn build(&self, source_dir: &Path, repo_name: &str) -> Result<String, ProviderError> {
        let image = format!("gcr.io/{}/{}", self.project()?, repo_name);
        info!("Submitting Cloud Build for {}", image);

        let spec = CommandSpec::new("gcloud")
            .args(["builds", "submit", "--tag", image.as_str()])
            .arg(source_dir.display().to_string())
            .args(["--project", self.project()?, "--quiet"]);
        self.runner.run_checked(&spec).await?;

        Ok(image)
    }

    async fn deploy(&self, image: &str, service: &str) -> Result<String, ProviderError> {
        info!("Deploying {} to Cloud Run service {}", image, service);
        let spec = self
            .gcloud(["run", "deploy", service, "--image", image])?
            .args(["--platform", "managed", "--allow-unauthenticated", "--quiet"]);
        self.runner.run_checked(&spec).await?;

        let described = self
            .gcloud(["run", "services", "describe", service])?
            .args(["--format", "value(status.url)"]);
        let url = self.runner.run_checked(&described).await?.stdout.trim().to_string();
        if url.is_empty() {
            Ok(format!("https://{}-{}-a.run.app", service, self.config.region))
        } else {
            Ok(url)
        }
    }

    async fn list_targets(&self) -> Result<Vec<String>, ProviderError> {
        let value = self.run_json(self.gcloud(["run", "services", "list"])?).await?;
        let services = value
            .as_array()
            .ok_or_else(|| ProviderError::Parse("expected a list of services".to_string()))?;

        Ok(services
            .iter()
            .filter_map(|svc| svc.pointer("/metadata/name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn describe_target(&self, target: &str) -> Result<TargetHealth, ProviderError> {
        let value = self
            .run_json(self.gcloud(["run", "services", "describe", target])?)
            .await?;
        Ok(parse_service(target, &value))
    }

    async fn list_revisions(&self, target: &str) -> Result<Vec<Revision>, ProviderError> {
        let value = self
            .run_json(self.gcloud(["run", "revisions", "list", "--service", target])?)
            .await?;
        let mut revisions: Vec<Revision> = value
            .as_array()
            .ok_or_else(|| ProviderError::Parse("expected a list of revisions".to_string()))?
            .iter()
            .filter_map(|rev| {
                let name = rev.pointer("/metadata/name")?.as_str()?.to_string();
                Some(Revision {
                    name,
                    created_at: parse_timestamp(rev.pointer("/metadata/creationTimestamp")),
                })
            })
            .collect();
        newest_first(&mut revisions);
        Ok(revisions)
    }

    async fn route_traffic(&self, target: &str, revision: &str) -> Result<(), ProviderError> {
        info!("Routing 100% of {} traffic to {}", target, revision);
        let spec = self
            .gcloud(["run", "services", "update-traffic", target])?
            .args(["--to-revisions".to_string(), format!("{}=100", revision)])
            .arg("--quiet");
        self.runner.run_checked(&spec).await?;
        Ok(())
    }
}

/// Health from `gcloud run services describe --format json`
fn parse_service(target: &str, value: &Value) -> TargetHealth {
    let errors = value
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .map(|conditions| {
            conditions
                .iter()
                .filter(|c| c.get("status").and_then(Value::as_str) != Some("True"))
                .map(|c| {
                    c.get("message")
                        .and_then(Value::as_str)
                        .or_else(|| c.get("type").and_then(Value::as_str))
                        .unwrap_or("unknown condition")
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default();

    let traffic = value
        .pointer("/status/traffic")
        .and_then(Value::as_array)
        .map(|splits| {
            splits
                .iter()
                .map(|t| TrafficSplit {
                    revision: t
                        .get("revisionName")
                        .and_then(Value::as_str)
                        .unwrap_or("latest")
                        .to_string(),
                    percent: t.get("percent").and_then(Value::as_u64).unwrap_or(0) as u32,
                })
                .collect()
        })
        .unwrap_or_default();

    TargetHealth {
        name: target.to_string(),
        errors,
        traffic,
        latest_ready_revision: value
            .pointer("/status/latestReadyRevisionName")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}
