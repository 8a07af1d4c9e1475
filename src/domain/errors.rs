//! Domain errors for the foreman system.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::TaskStatus;

/// Domain-level errors.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    #[error("Concurrency conflict: task {task_id} no longer in status {expected}")]
    ConcurrencyConflict { task_id: Uuid, expected: TaskStatus },

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Stable failure kinds carried by failed tasks for programmatic handling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CyclicPlan,
    InvalidPlan,
    PlanRejected,
    LeaseExpired,
    Cancelled,
    ParentCancelled,
    DependencyFailed,
    AgentFailed,
    TestsFailed,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CyclicPlan => "cyclic_plan",
            Self::InvalidPlan => "invalid_plan",
            Self::PlanRejected => "plan_rejected",
            Self::LeaseExpired => "lease_expired",
            Self::Cancelled => "cancelled",
            Self::ParentCancelled => "parent_cancelled",
            Self::DependencyFailed => "dependency_failed",
            Self::AgentFailed => "agent_failed",
            Self::TestsFailed => "tests_failed",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cyclic_plan" => Some(Self::CyclicPlan),
            "invalid_plan" => Some(Self::InvalidPlan),
            "plan_rejected" => Some(Self::PlanRejected),
            "lease_expired" => Some(Self::LeaseExpired),
            "cancelled" => Some(Self::Cancelled),
            "parent_cancelled" => Some(Self::ParentCancelled),
            "dependency_failed" => Some(Self::DependencyFailed),
            "agent_failed" => Some(Self::AgentFailed),
            "tests_failed" => Some(Self::TestsFailed),
            "timeout" => Some(Self::Timeout),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
