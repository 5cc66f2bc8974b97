//! SQLite-based execution store

use crate::core::{Execution, ExecutionStatus, StepResult};
use crate::persistence::ExecutionStore;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "SELECT id, pipeline_id, status, current_step, total_steps, started_at, completed_at, results FROM executions";

/// SQLite execution store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Open (or create) a store at `db_path`; ":memory:" gives a private database
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);

        // every in-memory connection is its own database
        let max_connections = if db_path == ":memory:" { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Default database location under the user's local data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("agent-pipeline")
            .join("executions.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        Self::open(&Self::default_path()).await
    }

    /// Open a store at a file path, creating parent directories
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("Database path is not valid UTF-8: {}", path.display()))?;
        Self::new(path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                pipeline_id TEXT NOT NULL,
                status TEXT NOT NULL,
                current_step INTEGER NOT NULL DEFAULT 0,
                total_steps INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                results TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_pipeline_id ON executions(pipeline_id);
            CREATE INDEX IF NOT EXISTS idx_started_at ON executions(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn from_row(row: &SqliteRow) -> Result<Execution> {
        let results: Vec<StepResult> = serde_json::from_str(&row.get::<String, _>("results"))
            .context("Corrupt step results")?;
        let status = row
            .get::<String, _>("status")
            .parse::<ExecutionStatus>()
            .map_err(|e| anyhow!(e))?;

        Ok(Execution {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_id: row.get("pipeline_id"),
            status,
            current_step: row.get::<i64, _>("current_step") as usize,
            total_steps: row.get::<i64, _>("total_steps") as usize,
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            results,
        })
    }

    async fn write(&self, execution: &Execution, insert: &str) -> Result<()> {
        let results = serde_json::to_string(&execution.results)?;
        sqlx::query(&format!(
            "{} INTO executions \
             (id, pipeline_id, status, current_step, total_steps, started_at, completed_at, results) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            insert
        ))
        .bind(execution.id.to_string())
        .bind(&execution.pipeline_id)
        .bind(execution.status.as_str())
        .bind(execution.current_step as i64)
        .bind(execution.total_steps as i64)
        .bind(Self::to_naive(execution.started_at))
        .bind(execution.completed_at.map(Self::to_naive))
        .bind(results)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn create(&self, execution: &Execution) -> Result<()> {
        self.write(execution, "INSERT")
            .await
            .with_context(|| format!("Failed to create execution {}", execution.id))
    }

    async fn update(&self, execution: &Execution) -> Result<()> {
        self.write(execution, "INSERT OR REPLACE")
            .await
            .with_context(|| format!("Failed to save execution {}", execution.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Execution>> {
        let row = sqlx::query(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load execution")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list(&self, pipeline_id: Option<&str>, limit: usize) -> Result<Vec<Execution>> {
        let rows = match pipeline_id {
            Some(pipeline_id) => {
                sqlx::query(&format!(
                    "{} WHERE pipeline_id = ?1 ORDER BY started_at DESC LIMIT ?2",
                    SELECT_COLUMNS
                ))
                .bind(pipeline_id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!("{} ORDER BY started_at DESC LIMIT ?1", SELECT_COLUMNS))
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .context("Failed to list executions")?;

        rows.iter().map(Self::from_row).collect()
    }
}
