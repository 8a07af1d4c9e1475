//! SQLite adapters for the store ports.

pub mod connection;
pub mod event_log_repository;
pub mod file_event_repository;
pub mod migrations;
pub mod repo_repository;
pub mod run_repository;
pub mod task_repository;

pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError};
pub use event_log_repository::SqliteEventLog;
pub use file_event_repository::SqliteFileEventStore;
pub use migrations::{all_migrations, required_version, MigrationError, Migrator};
pub use repo_repository::SqliteRepoStore;
pub use run_repository::SqliteRunStore;
pub use task_repository::SqliteTaskStore;
