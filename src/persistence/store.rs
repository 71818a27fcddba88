//! SQLite-based session log store

use crate::core::{ResultEnvelope, Stage};
use crate::persistence::{summarize, HistoryEntry, SessionStore, SessionSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// SQLite session log store
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (creating if needed) a store at `db_path`; `:memory:` opens an in-memory store
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = if db_path == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new().filename(db_path).create_if_missing(true)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Default database location under the platform data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("agentops")
            .join("sessions.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        Self::at_path(&Self::default_path()).await
    }

    /// Create store at `path`, creating parent directories
    pub async fn at_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Self::new(&path.to_string_lossy()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                status TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                envelope TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_session_id ON session_logs(session_id);
            CREATE INDEX IF NOT EXISTS idx_stage ON session_logs(stage);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn entry_from_row(row: &SqliteRow) -> Result<HistoryEntry> {
        let stage: String = row.get("stage");
        let envelope: String = row.get("envelope");
        let recorded_at: NaiveDateTime = row.get("recorded_at");

        Ok(HistoryEntry {
            session_id: row.get("session_id"),
            stage: Stage::from_str(&stage).map_err(anyhow::Error::msg)?,
            recorded_at: Self::from_naive(recorded_at),
            envelope: serde_json::from_str(&envelope).context("Corrupt envelope in session log")?,
        })
    }
}

#[async_trait::async_trait]
impl SessionStore for SqliteSessionStore {
    async fn append(&self, session_id: &str, stage: Stage, envelope: &ResultEnvelope) -> Result<()> {
        let body = serde_json::to_string(envelope).context("Failed to encode envelope")?;

        sqlx::query(
            r#"
            INSERT INTO session_logs (session_id, stage, status, recorded_at, envelope)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(session_id)
        .bind(stage.as_str())
        .bind(envelope.status.as_str())
        .bind(Self::to_naive(Utc::now()))
        .bind(body)
        .execute(&self.pool)
        .await
        .context("Failed to append session log")?;

        Ok(())
    }

    async fn fetch_history(&self, stage: Stage, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, stage, recorded_at, envelope
            FROM session_logs
            WHERE stage = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(stage.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch history")?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, stage, recorded_at, envelope
            FROM session_logs
            WHERE session_id IN (
                SELECT session_id FROM session_logs
                GROUP BY session_id
                ORDER BY MAX(id) DESC
                LIMIT ?1
            )
            ORDER BY id
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list sessions")?;

        let entries = rows
            .iter()
            .map(Self::entry_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(summarize(&entries))
    }

    async fn load_session(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, stage, recorded_at, envelope
            FROM session_logs
            WHERE session_id = ?1
            ORDER BY id
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load session")?;

        rows.iter().map(Self::entry_from_row).collect()
    }
}
