//! Verified file event persistence port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::VerifiedFileEvent;

/// Append-only store of verified filesystem effects.
#[async_trait]
pub trait FileEventStore: Send + Sync {
    async fn append(&self, event: &VerifiedFileEvent) -> DomainResult<()>;

    async fn for_task(&self, task_id: Uuid) -> DomainResult<Vec<VerifiedFileEvent>>;
}
