//! Agent run persistence port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::AgentRun;

/// Append-only store of agent runs, ordered by `(task_id, step, created_at)`.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn append(&self, run: &AgentRun) -> DomainResult<()>;

    async fn for_task(&self, task_id: Uuid) -> DomainResult<Vec<AgentRun>>;

    /// Count runs recorded for a given step of a task.
    async fn count_for_step(&self, task_id: Uuid, step: u32) -> DomainResult<u64>;
}
