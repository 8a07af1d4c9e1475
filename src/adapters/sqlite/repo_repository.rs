//! SQLite implementation of the RepoStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Repository;
use crate::domain::ports::RepoStore;

#[derive(Clone)]
pub struct SqliteRepoStore {
    pool: SqlitePool,
}

impl SqliteRepoStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RepoRow {
    id: String,
    name: String,
    path: String,
    project_type: Option<String>,
    framework: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<RepoRow> for Repository {
    type Error = DomainError;

    fn try_from(row: RepoRow) -> Result<Self, Self::Error> {
        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| DomainError::SerializationError(e.to_string()))
        };
        Ok(Repository {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            name: row.name,
            path: row.path,
            project_type: row.project_type,
            framework: row.framework,
            created_at: parse(&row.created_at)?,
            updated_at: parse(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl RepoStore for SqliteRepoStore {
    async fn create(&self, repo: &Repository) -> DomainResult<()> {
        repo.validate().map_err(DomainError::ValidationFailed)?;

        sqlx::query(
            r#"INSERT INTO repositories (id, name, path, project_type, framework, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(repo.id.to_string())
        .bind(&repo.name)
        .bind(&repo.path)
        .bind(&repo.project_type)
        .bind(&repo.framework)
        .bind(repo.created_at.to_rfc3339())
        .bind(repo.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Repository>> {
        let row: Option<RepoRow> = sqlx::query_as("SELECT * FROM repositories WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Repository::try_from).transpose()
    }

    async fn list(&self) -> DomainResult<Vec<Repository>> {
        let rows: Vec<RepoRow> =
            sqlx::query_as("SELECT * FROM repositories ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Repository::try_from).collect()
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM repositories WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::RepositoryNotFound(id));
        }
        Ok(())
    }
}
