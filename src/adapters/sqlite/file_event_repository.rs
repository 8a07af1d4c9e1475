//! SQLite implementation of the FileEventStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FileAction, QualityCheck, VerifiedFileEvent};
use crate::domain::ports::FileEventStore;

#[derive(Clone)]
pub struct SqliteFileEventStore {
    pool: SqlitePool,
}

impl SqliteFileEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FileEventRow {
    id: String,
    task_id: String,
    step: i64,
    path: String,
    action: String,
    byte_size: i64,
    checks_passed: String,
    warnings: String,
    recorded_at: String,
}

impl TryFrom<FileEventRow> for VerifiedFileEvent {
    type Error = DomainError;

    fn try_from(row: FileEventRow) -> Result<Self, Self::Error> {
        let action = FileAction::from_str(&row.action)
            .ok_or_else(|| DomainError::SerializationError(format!("bad action: {}", row.action)))?;
        let checks_passed: Vec<QualityCheck> = serde_json::from_str(&row.checks_passed)?;
        let warnings: Vec<String> = serde_json::from_str(&row.warnings)?;

        Ok(VerifiedFileEvent {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            task_id: Uuid::parse_str(&row.task_id)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            step: row.step as u32,
            path: row.path,
            action,
            byte_size: row.byte_size as u64,
            checks_passed,
            warnings,
            recorded_at: DateTime::parse_from_rfc3339(&row.recorded_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
        })
    }
}

#[async_trait]
impl FileEventStore for SqliteFileEventStore {
    async fn append(&self, event: &VerifiedFileEvent) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO verified_file_events (id, task_id, step, path, action,
               byte_size, checks_passed, warnings, recorded_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(event.task_id.to_string())
        .bind(event.step as i64)
        .bind(&event.path)
        .bind(event.action.as_str())
        .bind(event.byte_size as i64)
        .bind(serde_json::to_string(&event.checks_passed)?)
        .bind(serde_json::to_string(&event.warnings)?)
        .bind(event.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn for_task(&self, task_id: Uuid) -> DomainResult<Vec<VerifiedFileEvent>> {
        let rows: Vec<FileEventRow> = sqlx::query_as(
            "SELECT * FROM verified_file_events WHERE task_id = ? ORDER BY recorded_at ASC",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VerifiedFileEvent::try_from).collect()
    }
}
