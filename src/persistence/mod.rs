//! Persistence layer for session logs
//!
//! Every envelope an agent produces is appended to a [`SessionStore`] keyed
//! by (session id, stage). Agents only see the [`SessionLogger`] facade,
//! which never fails: [`SessionLog`] is a no-op in simulation mode and
//! swallows store errors in production mode.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteSessionStore;

use crate::core::{ExecutionMode, ResultEnvelope, Stage};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// One logged envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: String,
    pub stage: Stage,
    pub recorded_at: DateTime<Utc>,
    pub envelope: ResultEnvelope,
}

/// Overview of a logged session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,

    /// Number of envelopes logged
    pub entries: usize,

    /// Envelopes with status=error
    pub errors: usize,

    pub first_recorded: DateTime<Utc>,
    pub last_recorded: DateTime<Utc>,
}

/// Summaries of `entries`, most recently active session first
pub fn summarize(entries: &[HistoryEntry]) -> Vec<SessionSummary> {
    let mut by_session: BTreeMap<&str, SessionSummary> = BTreeMap::new();
    for entry in entries {
        let summary = by_session
            .entry(entry.session_id.as_str())
            .or_insert_with(|| SessionSummary {
                session_id: entry.session_id.clone(),
                entries: 0,
                errors: 0,
                first_recorded: entry.recorded_at,
                last_recorded: entry.recorded_at,
            });
        summary.entries += 1;
        if entry.envelope.is_error() {
            summary.errors += 1;
        }
        summary.first_recorded = summary.first_recorded.min(entry.recorded_at);
        summary.last_recorded = summary.last_recorded.max(entry.recorded_at);
    }

    let mut summaries: Vec<_> = by_session.into_values().collect();
    summaries.sort_by(|a, b| b.last_recorded.cmp(&a.last_recorded));
    summaries
}

/// Trait for session log backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append an envelope
    async fn append(&self, session_id: &str, stage: Stage, envelope: &ResultEnvelope) -> Result<()>;

    /// Most recent envelopes for a stage, newest first
    async fn fetch_history(&self, stage: Stage, limit: usize) -> Result<Vec<HistoryEntry>>;

    /// Most recently active sessions first
    async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>>;

    /// All envelopes of a session in recording order
    async fn load_session(&self, session_id: &str) -> Result<Vec<HistoryEntry>>;
}

/// In-memory store (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, session_id: &str, stage: Stage, envelope: &ResultEnvelope) -> Result<()> {
        self.entries.write().await.push(HistoryEntry {
            session_id: session_id.to_string(),
            stage,
            recorded_at: Utc::now(),
            envelope: envelope.clone(),
        });
        Ok(())
    }

    async fn fetch_history(&self, stage: Stage, limit: usize) -> Result<Vec<HistoryEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.stage == stage)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let entries = self.entries.read().await;
        let mut summaries = summarize(&entries);
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn load_session(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }
}

/// What agents log through; never fails
#[async_trait]
pub trait SessionLogger: Send + Sync {
    /// Fire-and-forget append of an envelope
    async fn log(&self, session_id: &str, stage: Stage, envelope: &ResultEnvelope);

    /// Most recent envelopes for a stage, newest first; empty when unavailable
    async fn fetch_history(&self, stage: Stage, limit: usize) -> Vec<HistoryEntry>;
}

/// Mode-aware logger over an optional store
pub struct SessionLog {
    mode: ExecutionMode,
    store: Option<Arc<dyn SessionStore>>,
}

impl SessionLog {
    pub fn new(mode: ExecutionMode, store: Arc<dyn SessionStore>) -> Self {
        Self {
            mode,
            store: Some(store),
        }
    }

    /// Logger that records nothing
    pub fn disabled(mode: ExecutionMode) -> Self {
        Self { mode, store: None }
    }

    fn active_store(&self) -> Option<&Arc<dyn SessionStore>> {
        if self.mode.is_simulation() {
            None
        } else {
            self.store.as_ref()
        }
    }
}

#[async_trait]
impl SessionLogger for SessionLog {
    async fn log(&self, session_id: &str, stage: Stage, envelope: &ResultEnvelope) {
        let Some(store) = self.active_store() else {
            debug!("[{}] {} finished with {} (not persisted)", session_id, stage, envelope.status.as_str());
            return;
        };

        if let Err(e) = store.append(session_id, stage, envelope).await {
            warn!("[{}] Failed to log {} envelope: {:#}", session_id, stage, e);
        }
    }

    async fn fetch_history(&self, stage: Stage, limit: usize) -> Vec<HistoryEntry> {
        let Some(store) = self.active_store() else {
            return Vec::new();
        };

        match store.fetch_history(stage, limit).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to fetch {} history: {:#}", stage, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EnvelopeOverrides, EnvelopeSkeleton, InputSnapshot};
    use serde_json::json;

    fn envelope(stage: Stage, ok: bool) -> ResultEnvelope {
        let overrides = if ok {
            EnvelopeOverrides::success()
        } else {
            EnvelopeOverrides::error("boom")
        };
        EnvelopeSkeleton::new(stage, false, true)
            .finish(overrides, InputSnapshot::new(ExecutionMode::Production, &json!({})))
            .unwrap()
    }

    struct FailingStore;

    #[async_trait]
    impl SessionStore for FailingStore {
        async fn append(&self, _: &str, _: Stage, _: &ResultEnvelope) -> Result<()> {
            anyhow::bail!("database is locked")
        }
        async fn fetch_history(&self, _: Stage, _: usize) -> Result<Vec<HistoryEntry>> {
            anyhow::bail!("database is locked")
        }
        async fn list_sessions(&self, _: usize) -> Result<Vec<SessionSummary>> {
            anyhow::bail!("database is locked")
        }
        async fn load_session(&self, _: &str) -> Result<Vec<HistoryEntry>> {
            anyhow::bail!("database is locked")
        }
    }

    #[tokio::test]
    async fn test_in_memory_history_newest_first_with_limit() {
        let store = InMemorySessionStore::new();
        for i in 0..3 {
            store
                .append(&format!("s{}", i), Stage::Monitor, &envelope(Stage::Monitor, true))
                .await
                .unwrap();
        }
        store.append("s9", Stage::Deploy, &envelope(Stage::Deploy, true)).await.unwrap();

        let history = store.fetch_history(Stage::Monitor, 2).await.unwrap();
        let ids: Vec<_> = history.iter().map(|e| e.session_id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
    }

    #[tokio::test]
    async fn test_list_and_load_sessions() {
        let store = InMemorySessionStore::new();
        store.append("a", Stage::CodeReview, &envelope(Stage::CodeReview, true)).await.unwrap();
        store.append("a", Stage::Build, &envelope(Stage::Build, false)).await.unwrap();
        store.append("b", Stage::CodeReview, &envelope(Stage::CodeReview, true)).await.unwrap();

        let sessions = store.list_sessions(10).await.unwrap();
        assert_eq!(sessions.len(), 2);
        let a = sessions.iter().find(|s| s.session_id == "a").unwrap();
        assert_eq!(a.entries, 2);
        assert_eq!(a.errors, 1);

        let loaded = store.load_session("a").await.unwrap();
        assert_eq!(loaded[0].stage, Stage::CodeReview);
        assert_eq!(loaded[1].stage, Stage::Build);
    }

    #[tokio::test]
    async fn test_simulation_log_is_noop() {
        let store = Arc::new(InMemorySessionStore::new());
        let log = SessionLog::new(ExecutionMode::Simulation, store.clone());
        log.log("s", Stage::Build, &envelope(Stage::Build, true)).await;
        assert!(store.load_session("s").await.unwrap().is_empty());
        assert!(log.fetch_history(Stage::Build, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_production_log_appends() {
        let store = Arc::new(InMemorySessionStore::new());
        let log = SessionLog::new(ExecutionMode::Production, store.clone());
        log.log("s", Stage::Build, &envelope(Stage::Build, true)).await;
        assert_eq!(log.fetch_history(Stage::Build, 10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_store_errors_are_swallowed() {
        let log = SessionLog::new(ExecutionMode::Production, Arc::new(FailingStore));
        log.log("s", Stage::Deploy, &envelope(Stage::Deploy, true)).await;
        assert!(log.fetch_history(Stage::Deploy, 10).await.is_empty());
    }
}
