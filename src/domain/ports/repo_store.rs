//! Repository registration persistence port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Repository;

#[async_trait]
pub trait RepoStore: Send + Sync {
    async fn create(&self, repo: &Repository) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Repository>>;

    async fn list(&self) -> DomainResult<Vec<Repository>>;

    /// Delete a repository; tasks cascade at the database layer.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;
}
