//! Azure Container Apps via the `az` CLI

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
use tracing::{debug, info};

/// Container App names are limited to 32 characters
const MAX_APP_NAME: usize = 32;

const SIMULATED_REGISTRY: &str = "agentopssim";

/// Port the deployed container listens on
const TARGET_PORT: &str = "8501";

pub struct AzureContainerApps {
    config: ProviderConfig,
    runner: Arc<dyn CommandRunner>,
}

impl AzureContainerApps {
    pub fn new(config: ProviderConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    fn registry(&self) -> Result<&str, ProviderError> {
        self.config
            .registry
            .as_deref()
            .ok_or_else(|| ProviderError::Config("provider.registry is not set".to_string()))
    }

    fn resource_group(&self) -> Result<&str, ProviderError> {
        self.config
            .resource_group
            .as_deref()
            .ok_or_else(|| ProviderError::Config("provider.resource_group is not set".to_string()))
    }

    /// `az containerapp <args> --resource-group <rg>`
    fn containerapp<I, S>(&self, args: I) -> Result<CommandSpec, ProviderError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(CommandSpec::new("az")
            .arg("containerapp")
            .args(args)
            .args(["--resource-group", self.resource_group()?]))
    }

    async fn run_json(&self, spec: CommandSpec) -> Result<Value, ProviderError> {
        let output = self.runner.run_checked(&spec.args(["--output", "json"])).await?;
        parse_json(&output.stdout)
    }
}

#[async_trait]
impl ProviderAdapter for AzureContainerApps {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn describe(&self) -> Value {
        json!({
            "provider": "azure",
            "registry": self.config.registry,
            "resource_group": self.config.resource_group,
            "location": self.config.location,
        })
    }

    fn simulated_image(&self, repo_name: &str) -> String {
        let registry = self.config.registry.as_deref().unwrap_or(SIMULATED_REGISTRY);
        format!("{}.azurecr.io/{}:latest", registry, repo_name)
    }

    fn simulated_endpoint(&self, image: &str) -> String {
        format!("https://{}-sim.azurecontainerapps.io", image_base_name(image))
    }

    fn is_valid_artifact(&self, image: &str) -> bool {
        image.contains(".azurecr.io/")
    }

    fn service_name_for(&self, image: &str) -> String {
        sanitize_name(image_base_name(image), MAX_APP_NAME)
    }

    async fn build(&self, source_dir: &Path, repo_name: &str) -> Result<String, ProviderError> {
        let registry = self.registry()?;
        let tag = format!("{}:latest", repo_name);
        info!("Building {} in registry {}", tag, registry);

        let login = CommandSpec::new("az").args(["acr", "login", "--name", registry]);
        self.runner.run_checked(&login).await?;

        let build = CommandSpec::new("az")
            .args(["acr", "build", "--registry", registry, "--image", tag.as_str()])
            .arg(source_dir.display().to_string());
        self.runner.run_checked(&build).await?;

        Ok(format!("{}.azurecr.io/{}", registry, tag))
    }

    async fn deploy(&self, image: &str, service: &str) -> Result<String, ProviderError> {
        let environment = format!("{}-env", service);

        // The environment usually exists already; a failure here is not fatal
        let env_create = self
            .containerapp(["env", "create", "--name", environment.as_str()])?
            .args(["--location", self.config.location.as_str()]);
        let env_output = self.runner.run(&env_create).await?;
        if !env_output.success() {
            debug!("Environment {} not created: {}", environment, env_output.stderr.trim());
        }

        info!("Deploying {} to container app {}", image, service);
        let create = self
            .containerapp(["create", "--name", service])?
            .args(["--environment", environment.as_str(), "--image", image])
            .args(["--target-port", TARGET_PORT, "--ingress", "external"]);
        self.runner.run_checked(&create).await?;

        let show = self
            .containerapp(["show", "--name", service])?
            .args(["--query", "properties.configuration.ingress.fqdn", "--output", "tsv"]);
        let fqdn = self.runner.run_checked(&show).await?.stdout.trim().to_string();
        if fqdn.is_empty() {
            return Err(ProviderError::Parse(format!("no ingress FQDN for {}", service)));
        }
        Ok(format!("https://{}", fqdn))
    }

    async fn list_targets(&self) -> Result<Vec<String>, ProviderError> {
        let value = self.run_json(self.containerapp(["list"])?).await?;
        let apps = value
            .as_array()
            .ok_or_else(|| ProviderError::Parse("expected a list of container apps".to_string()))?;

        Ok(apps
            .iter()
            .filter_map(|app| app.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn describe_target(&self, target: &str) -> Result<TargetHealth, ProviderError> {
        let value = self
            .run_json(self.containerapp(["show", "--name", target])?)
            .await?;
        Ok(parse_container_app(target, &value))
    }

    async fn list_revisions(&self, target: &str) -> Result<Vec<Revision>, ProviderError> {
        let value = self
            .run_json(self.containerapp(["revision", "list", "--name", target])?)
            .await?;
        let mut revisions: Vec<Revision> = value
            .as_array()
            .ok_or_else(|| ProviderError::Parse("expected a list of revisions".to_string()))?
            .iter()
            .filter_map(|rev| {
                Some(Revision {
                    name: rev.get("name")?.as_str()?.to_string(),
                    created_at: parse_timestamp(rev.pointer("/properties/createdTime")),
                })
            })
            .collect();
        newest_first(&mut revisions);
        Ok(revisions)
    }

    async fn route_traffic(&self, target: &str, revision: &str) -> Result<(), ProviderError> {
        info!("Routing 100% of {} traffic to {}", target, revision);
        let spec = self
            .containerapp(["ingress", "traffic", "set", "--name", target])?
            .args(["--revision-weight".to_string(), format!("{}=100", revision)]);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }
}

/// Health from `az containerapp show --output json`
fn parse_container_app(target: &str, value: &Value) -> TargetHealth {
    let mut errors = Vec::new();
    if let Some(state) = value.pointer("/properties/provisioningState").and_then(Value::as_str) {
        if state != "Succeeded" {
            errors.push(format!("Provisioning state: {}", state));
        }
    }
    if let Some(status) = value.pointer("/properties/runningStatus").and_then(Value::as_str) {
        if status != "Running" {
            errors.push(format!("Running status: {}", status));
        }
    }

    let traffic = value
        .pointer("/properties/configuration/ingress/traffic")
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
                    percent: t.get("weight").and_then(Value::as_u64).unwrap_or(0) as u32,
                })
                .collect()
        })
        .unwrap_or_default();

    TargetHealth {
        name: target.to_string(),
        errors,
        traffic,
        latest_ready_revision: value
            .pointer("/properties/latestReadyRevisionName")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}
