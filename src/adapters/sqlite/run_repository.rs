//! SQLite implementation of the RunStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentRole, AgentRun, ToolInvocation};
use crate::domain::ports::RunStore;

#[derive(Clone)]
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    task_id: String,
    step: i64,
    role: String,
    title: String,
    subtitle: String,
    reasoning: String,
    invocations: String,
    confidence: f64,
    requires_review: i64,
    duration_ms: Option<i64>,
    created_at: String,
}

impl TryFrom<RunRow> for AgentRun {
    type Error = DomainError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let invocations: Vec<ToolInvocation> = serde_json::from_str(&row.invocations)?;
        let role = AgentRole::from_str(&row.role)
            .ok_or_else(|| DomainError::SerializationError(format!("bad role: {}", row.role)))?;

        Ok(AgentRun {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            task_id: Uuid::parse_str(&row.task_id)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            step: row.step as u32,
            role,
            title: row.title,
            subtitle: row.subtitle,
            reasoning: row.reasoning,
            invocations,
            confidence: row.confidence,
            requires_review: row.requires_review != 0,
            duration_ms: row.duration_ms.map(|d| d as u64),
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
        })
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn append(&self, run: &AgentRun) -> DomainResult<()> {
        let invocations_json = serde_json::to_string(&run.invocations)?;

        sqlx::query(
            r#"INSERT INTO agent_runs (id, task_id, step, role, title, subtitle,
               reasoning, invocations, confidence, requires_review, duration_ms, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.task_id.to_string())
        .bind(run.step as i64)
        .bind(run.role.as_str())
        .bind(&run.title)
        .bind(&run.subtitle)
        .bind(&run.reasoning)
        .bind(&invocations_json)
        .bind(run.confidence)
        .bind(run.requires_review as i64)
        .bind(run.duration_ms.map(|d| d as i64))
        .bind(run.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn for_task(&self, task_id: Uuid) -> DomainResult<Vec<AgentRun>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            "SELECT * FROM agent_runs WHERE task_id = ? ORDER BY step ASC, created_at ASC",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AgentRun::try_from).collect()
    }

    async fn count_for_step(&self, task_id: Uuid, step: u32) -> DomainResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM agent_runs WHERE task_id = ? AND step = ?")
                .bind(task_id.to_string())
                .bind(step as i64)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}
