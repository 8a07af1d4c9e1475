//! Domain models for the foreman orchestrator.

pub mod agent_run;
pub mod config;
pub mod file_event;
pub mod plan;
pub mod repository;
pub mod task;

pub use agent_run::{AgentRun, ToolErrorKind, ToolInvocation, ToolOutcome};
pub use config::{
    ApiConfig, Config, DatabaseConfig, EngineConfig, LlmConfig, LoggingConfig, RetryConfig,
};
pub use file_event::{FileAction, QualityCheck, VerifiedFileEvent};
pub use plan::{Plan, PlanError, PlanStep};
pub use repository::Repository;
pub use task::{generate_title, AgentRole, Task, TaskStatus};
