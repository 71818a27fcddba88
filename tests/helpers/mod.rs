//! Test fakes and assertions shared by the integration tests

#![allow(dead_code)]

use agentops::core::config::{AppConfig, ProviderKind};
use agentops::llm::{PromptMessage, PromptReply, PromptService};
use agentops::persistence::HistoryEntry;
use agentops::process::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use agentops::provider::{ProviderAdapter, ProviderError, Revision, TargetHealth, TrafficSplit};
use agentops::source::{Checkout, SourceControl, SourceError};
use agentops::{AgentContext, ExecutionMode, ResultEnvelope, SessionLogger, Stage, Status};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const REPO: &str = "https://github.com/acme/widgets";
pub const PROJECT: &str = "acme-proj";

/// Logger that keeps every envelope in memory
#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl RecordingLogger {
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn count_for(&self, stage: Stage) -> usize {
        self.entries.lock().unwrap().iter().filter(|e| e.stage == stage).count()
    }
}

#[async_trait]
impl SessionLogger for RecordingLogger {
    async fn log(&self, session_id: &str, stage: Stage, envelope: &ResultEnvelope) {
        self.entries.lock().unwrap().push(HistoryEntry {
            session_id: session_id.to_string(),
            stage,
            recorded_at: Utc::now(),
            envelope: envelope.clone(),
        });
    }

    async fn fetch_history(&self, stage: Stage, limit: usize) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|e| e.stage == stage)
            .take(limit)
            .cloned()
            .collect()
    }
}

/// Answers prompts by matching a keyword in the rendered prompt
pub struct ScriptedPrompts {
    rules: Vec<(String, PromptReply)>,
    fallback: PromptReply,
    calls: AtomicUsize,
}

impl ScriptedPrompts {
    pub fn new(fallback: &str) -> Self {
        Self {
            rules: Vec::new(),
            fallback: PromptReply::Text(fallback.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on(mut self, keyword: &str, reply: &str) -> Self {
        self.rules
            .push((keyword.to_string(), PromptReply::Text(reply.to_string())));
        self
    }

    pub fn fail_on(mut self, keyword: &str, error: &str) -> Self {
        self.rules
            .push((keyword.to_string(), PromptReply::Failed(error.to_string())));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PromptService for ScriptedPrompts {
    async fn prompt(&self, messages: &[PromptMessage]) -> PromptReply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = agentops::llm::render_messages(messages);
        self.rules
            .iter()
            .find(|(keyword, _)| text.contains(keyword.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Provider with scripted outcomes and call counters
pub struct FakeProvider {
    pub build_result: Result<String, String>,
    pub targets: BTreeMap<String, TargetHealth>,
    pub revisions: Vec<String>,
    pub build_calls: AtomicUsize,
    pub deploy_calls: AtomicUsize,
    pub describe_calls: AtomicUsize,
    pub route_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            build_result: Ok(format!("gcr.io/{}/widgets", PROJECT)),
            targets: BTreeMap::new(),
            revisions: vec!["widgets-00002".to_string(), "widgets-00001".to_string()],
            build_calls: AtomicUsize::new(0),
            deploy_calls: AtomicUsize::new(0),
            describe_calls: AtomicUsize::new(0),
            route_calls: AtomicUsize::new(0),
        }
    }

    /// Build fails with these logs
    pub fn failing_build(mut self, logs: &str) -> Self {
        self.build_result = Err(logs.to_string());
        self
    }

    pub fn with_build_image(mut self, image: &str) -> Self {
        self.build_result = Ok(image.to_string());
        self
    }

    pub fn with_target(mut self, name: &str, errors: &[&str]) -> Self {
        let revision = format!("{}-00002", name);
        self.targets.insert(
            name.to_string(),
            TargetHealth {
                name: name.to_string(),
                errors: errors.iter().map(|e| e.to_string()).collect(),
                traffic: vec![TrafficSplit {
                    revision: revision.clone(),
                    percent: 100,
                }],
                latest_ready_revision: Some(revision),
            },
        );
        self
    }

    pub fn with_revisions(mut self, revisions: &[&str]) -> Self {
        self.revisions = revisions.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gcp
    }

    fn describe(&self) -> Value {
        json!({ "provider": "fake", "project": PROJECT })
    }

    fn simulated_image(&self, repo_name: &str) -> String {
        format!("gcr.io/{}-sim/{}", PROJECT, repo_name)
    }

    fn simulated_endpoint(&self, image: &str) -> String {
        format!("https://{}-sim.cloudrun.app/{}", PROJECT, image.rsplit('/').next().unwrap_or(image))
    }

    fn is_valid_artifact(&self, image: &str) -> bool {
        image.starts_with("gcr.io/")
    }

    fn service_name_for(&self, image: &str) -> String {
        image.rsplit('/').next().unwrap_or(image).to_string()
    }

    async fn build(&self, _source_dir: &Path, _repo_name: &str) -> Result<String, ProviderError> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        self.build_result.clone().map_err(|logs| {
            ProviderError::Command(CommandError::NonZeroExit {
                program: "gcloud".to_string(),
                code: 1,
                stdout: logs,
                stderr: "ERROR: build step failed".to_string(),
            })
        })
    }

    async fn deploy(&self, _image: &str, service: &str) -> Result<String, ProviderError> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://{}-xyz.a.run.app", service))
    }

    async fn list_targets(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.targets.keys().cloned().collect())
    }

    async fn describe_target(&self, target: &str) -> Result<TargetHealth, ProviderError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.targets
            .get(target)
            .cloned()
            .ok_or_else(|| ProviderError::Parse(format!("unknown target {}", target)))
    }

    async fn list_revisions(&self, _target: &str) -> Result<Vec<Revision>, ProviderError> {
        Ok(self
            .revisions
            .iter()
            .map(|name| Revision {
                name: name.clone(),
                created_at: None,
            })
            .collect())
    }

    async fn route_traffic(&self, _target: &str, _revision: &str) -> Result<(), ProviderError> {
        self.route_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates empty checkouts for github URLs
pub struct FakeSource;

#[async_trait]
impl SourceControl for FakeSource {
    fn validate_url(&self, url: &str) -> Result<(), SourceError> {
        if url.starts_with("https://github.com/") {
            Ok(())
        } else {
            Err(SourceError::InvalidUrl {
                url: url.to_string(),
                prefix: "https://github.com/".to_string(),
            })
        }
    }

    async fn checkout(&self, url: &str) -> Result<Checkout, SourceError> {
        self.validate_url(url)?;
        Checkout::create(url)
    }
}

/// Runner that succeeds with scripted stdout per command prefix
#[derive(Default)]
pub struct ScriptedRunner {
    outputs: Vec<(String, CommandOutput)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, prefix: &str, exit_code: i32, stdout: &str) -> Self {
        self.outputs.push((
            prefix.to_string(),
            CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        ));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let line = spec.to_string();
        self.calls.lock().unwrap().push(line.clone());
        Ok(self
            .outputs
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}

/// Collaborators behind an [`AgentContext`]
pub struct Harness {
    pub ctx: AgentContext,
    pub logger: Arc<RecordingLogger>,
    pub prompts: Arc<ScriptedPrompts>,
    pub provider: Arc<FakeProvider>,
    pub runner: Arc<ScriptedRunner>,
}

pub fn harness(mode: ExecutionMode, provider: FakeProvider, prompts: ScriptedPrompts) -> Harness {
    harness_with_runner(mode, provider, prompts, ScriptedRunner::new())
}

pub fn harness_with_runner(
    mode: ExecutionMode,
    provider: FakeProvider,
    prompts: ScriptedPrompts,
    runner: ScriptedRunner,
) -> Harness {
    let mut settings = AppConfig::default();
    settings.mode = mode;
    settings.provider.project = Some(PROJECT.to_string());

    let logger = Arc::new(RecordingLogger::default());
    let prompts = Arc::new(prompts);
    let provider = Arc::new(provider);
    let runner = Arc::new(runner);
    let ctx = AgentContext {
        mode,
        session_id: "session_it".to_string(),
        logger: logger.clone(),
        prompts: prompts.clone(),
        provider: provider.clone(),
        source: Arc::new(FakeSource),
        runner: runner.clone(),
        settings: Arc::new(settings),
    };

    Harness {
        ctx,
        logger,
        prompts,
        provider,
        runner,
    }
}

/// Check the fields every envelope must carry
pub fn assert_envelope_contract(envelope: &ResultEnvelope, stage: Stage) {
    assert_eq!(envelope.stage(), stage, "payload belongs to another stage");
    assert_ne!(envelope.status, Status::Unknown, "{} left status unset", stage);
    if envelope.is_error() {
        assert!(
            envelope.reason.as_deref().is_some_and(|r| !r.is_empty()),
            "{} error without reason",
            stage
        );
    }
    assert!(envelope.input.params.is_object(), "{} input is not an object", stage);
    envelope.validate().expect("envelope validates");
}

/// Envelope as JSON without its timestamp
pub fn without_timestamp(envelope: &ResultEnvelope) -> Value {
    let mut value = serde_json::to_value(envelope).expect("envelope serializes");
    if let Some(map) = value.as_object_mut() {
        map.remove("timestamp");
    }
    value
}
