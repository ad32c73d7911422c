//! SQLite job store.
//!
//! One table, created on connect if missing. Timestamps are stored as
//! RFC 3339 text so the file stays readable with the `sqlite3` shell.
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    Row,
    sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow},
};
use tracing::debug;

use crate::{
    core::job::Job,
    ports::job_store::{JobStore, StoreError, StoreResult},
};

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Self::connect_with_options(database_url, 5).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
    ) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// A private in-memory database. Pinned to one connection that is never
    /// reaped, since each SQLite memory connection is its own database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job (
                job_key TEXT NOT NULL UNIQUE,
                input_text TEXT NOT NULL,
                output_text TEXT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        debug!("job table ready");
        Ok(())
    }

    fn parse_job_row(row: &SqliteRow) -> StoreResult<Job> {
        let key: String = row
            .try_get("job_key")
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let input_text: String = row
            .try_get("input_text")
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let output_text: Option<String> = row
            .try_get("output_text")
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let updated_at_str: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(Job {
            key,
            input_text,
            output_text,
            created_at: parse_timestamp(&created_at_str)?,
            updated_at: parse_timestamp(&updated_at_str)?,
        })
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("{raw}: {e}")))
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn find_by_key(&self, key: &str) -> StoreResult<Option<Job>> {
        let row = sqlx::query(
            "SELECT job_key, input_text, output_text, created_at, updated_at FROM job WHERE job_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        row.as_ref().map(Self::parse_job_row).transpose()
    }

    async fn insert(&self, job: &Job) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO job (job_key, input_text, output_text, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&job.key)
        .bind(&job.input_text)
        .bind(&job.output_text)
        .bind(format_timestamp(&job.created_at))
        .bind(format_timestamp(&job.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate(job.key.clone())
            }
            other => StoreError::Query(other.to_string()),
        })?;

        Ok(())
    }

    async fn update(&self, job: &Job) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE job SET input_text = ?, output_text = ?, updated_at = ? WHERE job_key = ?",
        )
        .bind(&job.input_text)
        .bind(&job.output_text)
        .bind(format_timestamp(&job.updated_at))
        .bind(&job.key)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(job.key.clone()));
        }
        Ok(())
    }
}
