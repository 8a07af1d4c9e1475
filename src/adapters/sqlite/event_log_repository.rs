//! SQLite implementation of the durable event log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::services::event_bus::{EventKind, EventPayload, TaskEvent};
use crate::services::event_log::{EventLog, EventLogError};

#[derive(Clone)]
pub struct SqliteEventLog {
    pool: SqlitePool,
}

impl SqliteEventLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    task_id: String,
    seq: i64,
    kind: String,
    payload: String,
    recorded_at: String,
}

impl TryFrom<EventRow> for TaskEvent {
    type Error = EventLogError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let payload: EventPayload = serde_json::from_str(&row.payload)
            .map_err(|e| EventLogError::Serialization(e.to_string()))?;
        let kind = EventKind::from_str(&row.kind).unwrap_or_else(|| payload.kind());

        Ok(TaskEvent {
            task_id: Uuid::parse_str(&row.task_id)
                .map_err(|e| EventLogError::Serialization(e.to_string()))?,
            seq: row.seq as u64,
            kind,
            timestamp: DateTime::parse_from_rfc3339(&row.recorded_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| EventLogError::Serialization(e.to_string()))?,
            payload,
        })
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn append(&self, event: &TaskEvent) -> Result<(), EventLogError> {
        let payload = serde_json::to_string(&event.payload)
            .map_err(|e| EventLogError::Serialization(e.to_string()))?;

        sqlx::query(
            "INSERT INTO task_events (task_id, seq, kind, payload, recorded_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.task_id.to_string())
        .bind(event.seq as i64)
        .bind(event.kind.as_str())
        .bind(payload)
        .bind(event.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| EventLogError::Append(e.to_string()))?;

        Ok(())
    }

    async fn since(
        &self,
        task_id: Uuid,
        after: Option<u64>,
    ) -> Result<Vec<TaskEvent>, EventLogError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT * FROM task_events WHERE task_id = ? AND seq > ? ORDER BY seq ASC",
        )
        .bind(task_id.to_string())
        .bind(after.map(|a| a as i64).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EventLogError::Query(e.to_string()))?;

        rows.into_iter().map(TaskEvent::try_from).collect()
    }

    async fn latest_seq(&self, task_id: Uuid) -> Result<Option<u64>, EventLogError> {
        // MAX over an empty set yields NULL.
        let (seq,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(seq) FROM task_events WHERE task_id = ?")
                .bind(task_id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| EventLogError::Query(e.to_string()))?;

        Ok(seq.map(|s| s as u64))
    }
}
