//! SQLite implementation of the TaskStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult, ErrorKind};
use crate::domain::models::{AgentRole, Plan, Task, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskStore};

#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    parent_id: Option<String>,
    repo_id: String,
    user_request: String,
    depends_on: String,
    title: Option<String>,
    status: String,
    current_role: Option<String>,
    current_step: i64,
    plan: Option<String>,
    retry_count: i64,
    fix_depth: i64,
    requires_review: i64,
    error_message: Option<String>,
    error_kind: Option<String>,
    paused_from: Option<String>,
    heartbeat_at: String,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
    version: i64,
}

fn parse_uuid(s: &str) -> Result<Uuid, DomainError> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DomainError::SerializationError(e.to_string()))
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("bad status: {}", row.status)))?;
        let plan: Option<Plan> = match row.plan {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        let depends_on: Vec<Uuid> = serde_json::from_str(&row.depends_on)?;

        Ok(Task {
            id: parse_uuid(&row.id)?,
            parent_id: row.parent_id.as_deref().map(parse_uuid).transpose()?,
            repo_id: parse_uuid(&row.repo_id)?,
            user_request: row.user_request,
            depends_on,
            title: row.title,
            status,
            current_role: row.current_role.as_deref().and_then(AgentRole::from_str),
            current_step: row.current_step as u32,
            plan,
            retry_count: row.retry_count as u32,
            fix_depth: row.fix_depth as u32,
            requires_review: row.requires_review != 0,
            error_message: row.error_message,
            error_kind: row.error_kind.as_deref().and_then(ErrorKind::from_str),
            paused_from: row.paused_from.as_deref().and_then(TaskStatus::from_str),
            heartbeat_at: parse_time(&row.heartbeat_at)?,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
            completed_at: row.completed_at.as_deref().map(parse_time).transpose()?,
            version: row.version as u64,
        })
    }
}

impl SqliteTaskStore {
    fn bind_task<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        task: &'q Task,
        plan_json: &'q Option<String>,
        depends_json: &'q str,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        query
            .bind(task.parent_id.map(|id| id.to_string()))
            .bind(task.repo_id.to_string())
            .bind(&task.user_request)
            .bind(depends_json)
            .bind(&task.title)
            .bind(task.status.as_str())
            .bind(task.current_role.map(|r| r.as_str()))
            .bind(task.current_step as i64)
            .bind(plan_json.as_deref())
            .bind(task.retry_count as i64)
            .bind(task.fix_depth as i64)
            .bind(task.requires_review as i64)
            .bind(&task.error_message)
            .bind(task.error_kind.map(|k| k.as_str()))
            .bind(task.paused_from.map(|s| s.as_str()))
            .bind(task.heartbeat_at.to_rfc3339())
            .bind(task.created_at.to_rfc3339())
            .bind(task.updated_at.to_rfc3339())
            .bind(task.completed_at.map(|t| t.to_rfc3339()))
            .bind(task.version as i64)
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        task.validate().map_err(DomainError::ValidationFailed)?;

        let plan_json = task.plan.as_ref().map(serde_json::to_string).transpose()?;
        let depends_json = serde_json::to_string(&task.depends_on)?;

        let query = sqlx::query(
            r#"INSERT INTO tasks (id, parent_id, repo_id, user_request, depends_on, title,
               status, current_role, current_step, plan, retry_count, fix_depth,
               requires_review, error_message, error_kind, paused_from, heartbeat_at,
               created_at, updated_at, completed_at, version)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string());
        Self::bind_task(query, task, &plan_json, &depends_json)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn update_expecting(&self, task: &Task, expected: TaskStatus) -> DomainResult<()> {
        let plan_json = task.plan.as_ref().map(serde_json::to_string).transpose()?;
        let depends_json = serde_json::to_string(&task.depends_on)?;

        let query = sqlx::query(
            r#"UPDATE tasks SET parent_id = ?, repo_id = ?, user_request = ?, depends_on = ?,
               title = ?, status = ?, current_role = ?, current_step = ?, plan = ?,
               retry_count = ?, fix_depth = ?, requires_review = ?, error_message = ?,
               error_kind = ?, paused_from = ?, heartbeat_at = ?, created_at = ?,
               updated_at = ?, completed_at = ?, version = ?
               WHERE id = ? AND status = ?"#,
        );
        let result = Self::bind_task(query, task, &plan_json, &depends_json)
            .bind(task.id.to_string())
            .bind(expected.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM tasks WHERE id = ?")
                .bind(task.id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            return match exists {
                Some(_) => Err(DomainError::ConcurrencyConflict { task_id: task.id, expected }),
                None => Err(DomainError::TaskNotFound(task.id)),
            };
        }

        Ok(())
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        self.update_expecting(task, task.status).await
    }

    async fn delete_cascade(&self, id: Uuid) -> DomainResult<()> {
        // parent_id, agent_runs, verified_file_events, and task_events all
        // declare ON DELETE CASCADE; one delete removes the whole subtree.
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(id));
        }
        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(repo_id) = &filter.repo_id {
            query.push_str(" AND repo_id = ?");
            bindings.push(repo_id.to_string());
        }
        if let Some(parent_id) = &filter.parent_id {
            query.push_str(" AND parent_id = ?");
            bindings.push(parent_id.to_string());
        }
        if filter.roots_only {
            query.push_str(" AND parent_id IS NULL");
        }

        query.push_str(" ORDER BY created_at ASC");
        if let Some(limit) = filter.limit {
            query.push_str(" LIMIT ?");
            bindings.push(limit.to_string());
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn children(&self, parent_id: Uuid) -> DomainResult<Vec<Task>> {
        self.list(TaskFilter { parent_id: Some(parent_id), ..Default::default() })
            .await
    }

    async fn heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query("UPDATE tasks SET heartbeat_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(id));
        }
        Ok(())
    }

    async fn expired_leases(&self, cutoff: DateTime<Utc>) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"SELECT * FROM tasks
               WHERE status IN ('planning', 'executing', 'testing', 'documenting')
               AND heartbeat_at < ?
               ORDER BY heartbeat_at ASC"#,
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }
}
