//! Task persistence port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskStatus};

/// Filter criteria for task queries. Fields combine with AND logic.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub repo_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    /// When true, match only tasks with no parent.
    pub roots_only: bool,
    pub limit: Option<usize>,
}

/// Repository interface for task persistence.
///
/// Per-task writes are serializable: `update_expecting` commits only if
/// the row's current status matches the caller's expectation, which is
/// how concurrent engine/sweeper/API writers detect each other.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task.
    async fn create(&self, task: &Task) -> DomainResult<()>;

    /// Fetch a task by id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Replace a task's row, guarded by the expected current status.
    ///
    /// Returns `DomainError::ConcurrencyConflict` when the row's status
    /// no longer matches `expected`.
    async fn update_expecting(&self, task: &Task, expected: TaskStatus) -> DomainResult<()>;

    /// Unconditional update. Reserved for fields outside the state
    /// machine (review flags, titles); transitions go through
    /// `update_expecting`.
    async fn update(&self, task: &Task) -> DomainResult<()>;

    /// Delete a task and all descendants, runs, file events, and
    /// event-log rows.
    async fn delete_cascade(&self, id: Uuid) -> DomainResult<()>;

    /// List tasks matching the filter, oldest first.
    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    /// Direct children of a task, oldest first.
    async fn children(&self, parent_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Touch the heartbeat column only.
    async fn heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()>;

    /// Tasks in a leased status whose heartbeat is older than `cutoff`.
    async fn expired_leases(&self, cutoff: DateTime<Utc>) -> DomainResult<Vec<Task>>;
}
