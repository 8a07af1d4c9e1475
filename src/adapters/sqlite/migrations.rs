//! Embedded, versioned schema migrations.
//!
//! The binary refuses to serve until the schema is at the current
//! version; `ensure_current` is the gate.

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to execute migration {version}: {source}")]
    ExecutionError {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to get schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
    #[error("Schema version {found} is behind required version {required}; run migrations first")]
    SchemaBehind { found: i64, required: i64 },
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

pub fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema",
        sql: include_str!("../../../migrations/001_initial_schema.sql"),
    }]
}

/// Highest version the code requires.
pub fn required_version() -> i64 {
    all_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply all pending migrations, returning how many ran.
    pub async fn run(&self) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;
        let current = self.current_version().await?;
        let pending: Vec<_> = all_migrations()
            .into_iter()
            .filter(|m| m.version > current)
            .collect();

        for migration in &pending {
            sqlx::raw_sql(migration.sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MigrationError::ExecutionError {
                    version: migration.version,
                    source: e,
                })?;
            sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
                .bind(migration.version)
                .bind(migration.description)
                .execute(&self.pool)
                .await
                .map_err(|e| MigrationError::ExecutionError {
                    version: migration.version,
                    source: e,
                })?;
        }

        Ok(pending.len())
    }

    /// Fail unless the schema is at the required version.
    pub async fn ensure_current(&self) -> Result<(), MigrationError> {
        self.ensure_migrations_table().await?;
        let found = self.current_version().await?;
        let required = required_version();
        if found < required {
            return Err(MigrationError::SchemaBehind { found, required });
        }
        Ok(())
    }

    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        let result: Option<(i64,)> =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_optional(&self.pool)
                .await
                .map_err(MigrationError::VersionCheckError)?;
        Ok(result.map(|(v,)| v).unwrap_or(0))
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MigrationError::ExecutionError { version: 0, source: e })?;
        Ok(())
    }
}
