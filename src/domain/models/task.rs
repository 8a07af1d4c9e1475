//! Task domain model.
//!
//! A task is one user request against a repository. It moves through the
//! pipeline pending → planning → plan_review? → executing → testing →
//! documenting → completed, with paused and failed reachable from any
//! non-terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::plan::Plan;
use crate::domain::errors::ErrorKind;

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is created but no worker has picked it up
    Pending,
    /// Planner agent is decomposing the request
    Planning,
    /// Plan confidence was below the auto-approve threshold; waiting for a human
    PlanReview,
    /// Coder agents are working through plan steps
    Executing,
    /// QA agent is running tests
    Testing,
    /// Docs agent is updating documentation
    Documenting,
    /// Cooperatively suspended; `paused_from` records the prior status
    Paused,
    /// Terminal success
    Completed,
    /// Terminal failure
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planning => "planning",
            Self::PlanReview => "plan_review",
            Self::Executing => "executing",
            Self::Testing => "testing",
            Self::Documenting => "documenting",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "planning" => Some(Self::Planning),
            "plan_review" => Some(Self::PlanReview),
            "executing" => Some(Self::Executing),
            "testing" => Some(Self::Testing),
            "documenting" => Some(Self::Documenting),
            "paused" => Some(Self::Paused),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Statuses in which a worker holds a lease and must heartbeat.
    pub fn is_leased(&self) -> bool {
        matches!(
            self,
            Self::Planning | Self::Executing | Self::Testing | Self::Documenting
        )
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Pending => vec![Self::Planning, Self::Paused, Self::Failed],
            Self::Planning => vec![
                Self::Executing,
                Self::PlanReview,
                Self::Paused,
                Self::Failed,
            ],
            Self::PlanReview => vec![Self::Executing, Self::Paused, Self::Failed],
            Self::Executing => vec![Self::Testing, Self::Paused, Self::Failed],
            Self::Testing => vec![
                Self::Executing, // fix child spawned, parent awaits it
                Self::Documenting,
                Self::Paused,
                Self::Failed,
            ],
            Self::Documenting => vec![Self::Completed, Self::Paused, Self::Failed],
            // Resume restores the status recorded at pause time.
            Self::Paused => vec![
                Self::Pending,
                Self::Planning,
                Self::PlanReview,
                Self::Executing,
                Self::Testing,
                Self::Documenting,
                Self::Failed,
            ],
            Self::Completed => vec![],
            Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role of the agent driving a pipeline phase or plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    CoderBackend,
    CoderFrontend,
    CoderInfra,
    Qa,
    Docs,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::CoderBackend => "coder_be",
            Self::CoderFrontend => "coder_fe",
            Self::CoderInfra => "coder_infra",
            Self::Qa => "qa",
            Self::Docs => "docs",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "planner" => Some(Self::Planner),
            "coder_be" => Some(Self::CoderBackend),
            "coder_fe" => Some(Self::CoderFrontend),
            "coder_infra" => Some(Self::CoderInfra),
            "qa" => Some(Self::Qa),
            "docs" => Some(Self::Docs),
            _ => None,
        }
    }

    /// Whether this role is one of the coder specialties.
    pub fn is_coder(&self) -> bool {
        matches!(
            self,
            Self::CoderBackend | Self::CoderFrontend | Self::CoderInfra
        )
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One user request against a repository, driven through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Parent task (for fix / write-tests children)
    pub parent_id: Option<Uuid>,
    /// Target repository
    pub repo_id: Uuid,
    /// Free-text engineering request
    pub user_request: String,
    /// Tasks that must complete before this one becomes ready
    pub depends_on: Vec<Uuid>,
    /// Human-friendly title
    pub title: Option<String>,
    /// Current status
    pub status: TaskStatus,
    /// Role currently driving the task
    pub current_role: Option<AgentRole>,
    /// Index of the plan step being executed (0 until execution starts)
    pub current_step: u32,
    /// Planner output, null until the planner has run
    pub plan: Option<Plan>,
    /// Fix-loop retries consumed
    pub retry_count: u32,
    /// Depth in the fix-child chain (root = 0)
    pub fix_depth: u32,
    /// Low confidence somewhere in the pipeline flagged human review
    pub requires_review: bool,
    /// Human-readable failure description
    pub error_message: Option<String>,
    /// Stable failure kind for programmatic handling
    pub error_kind: Option<ErrorKind>,
    /// Status to restore when a paused task resumes
    pub paused_from: Option<TaskStatus>,
    /// Last worker heartbeat; lease expiry is judged against this
    pub heartbeat_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Version for optimistic locking
    pub version: u64,
}

impl Task {
    /// Create a new root task. Title is auto-generated from the request.
    pub fn new(repo_id: Uuid, user_request: impl Into<String>) -> Self {
        let user_request = user_request.into();
        let title = generate_title(&user_request);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            repo_id,
            user_request,
            depends_on: Vec::new(),
            title: Some(title),
            status: TaskStatus::default(),
            current_role: None,
            current_step: 0,
            plan: None,
            retry_count: 0,
            fix_depth: 0,
            requires_review: false,
            error_message: None,
            error_kind: None,
            paused_from: None,
            heartbeat_at: now,
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 1,
        }
    }

    /// Set parent task.
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Override the auto-generated title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the fix-chain depth.
    pub fn with_fix_depth(mut self, depth: u32) -> Self {
        self.fix_depth = depth;
        self
    }

    /// Add a cross-task dependency.
    pub fn with_dependency(mut self, task_id: Uuid) -> Self {
        if !self.depends_on.contains(&task_id) && task_id != self.id {
            self.depends_on.push(task_id);
        }
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, updating bookkeeping fields.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        if new_status == TaskStatus::Paused {
            self.paused_from = Some(self.status);
        } else if self.status == TaskStatus::Paused {
            self.paused_from = None;
        }

        self.status = new_status;
        self.updated_at = Utc::now();
        self.version += 1;

        if new_status.is_terminal() {
            self.completed_at = Some(Utc::now());
            self.current_role = None;
        }

        Ok(())
    }

    /// Mark the task failed with a stable error kind.
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) -> Result<(), String> {
        self.error_kind = Some(kind);
        self.error_message = Some(message.into());
        self.transition_to(TaskStatus::Failed)
    }

    /// Validate the task before insertion.
    pub fn validate(&self) -> Result<(), String> {
        if self.user_request.trim().is_empty() {
            return Err("task request cannot be empty".to_string());
        }
        if self.parent_id == Some(self.id) {
            return Err("task cannot be its own parent".to_string());
        }
        if self.depends_on.contains(&self.id) {
            return Err("task cannot depend on itself".to_string());
        }
        Ok(())
    }
}

/// Generate a short title from a request string.
/// Takes the first line, truncates at ~80 chars on a word boundary.
pub fn generate_title(request: &str) -> String {
    let first_line = request.lines().next().unwrap_or(request).trim();
    if first_line.is_empty() {
        return "Untitled task".to_string();
    }
    let max_len = 80;
    if first_line.len() <= max_len {
        return first_line.to_string();
    }
    match first_line[..max_len].rfind(' ') {
        Some(pos) => format!("{}...", &first_line[..pos]),
        None => format!("{}...", &first_line[..max_len]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new(Uuid::new_v4(), "Add GET /healthz returning 200");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.title.as_deref(), Some("Add GET /healthz returning 200"));
        assert!(task.plan.is_none());
        assert_eq!(task.current_step, 0);
    }

    #[test]
    fn test_generate_title() {
        assert_eq!(generate_title("Short request"), "Short request");
        assert_eq!(generate_title("First line\nSecond line"), "First line");

        let long = "This is a very long engineering request that exceeds eighty characters and should be truncated at a word boundary";
        let title = generate_title(long);
        assert!(title.len() <= 84);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_pipeline_transitions() {
        let mut task = Task::new(Uuid::new_v4(), "do the thing");

        task.transition_to(TaskStatus::Planning).unwrap();
        task.transition_to(TaskStatus::Executing).unwrap();
        task.transition_to(TaskStatus::Testing).unwrap();
        task.transition_to(TaskStatus::Documenting).unwrap();
        task.transition_to(TaskStatus::Completed).unwrap();

        assert!(task.is_terminal());
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_plan_review_gate() {
        let mut task = Task::new(Uuid::new_v4(), "risky change");
        task.transition_to(TaskStatus::Planning).unwrap();
        task.transition_to(TaskStatus::PlanReview).unwrap();

        // Cannot jump to testing from review
        assert!(!task.can_transition_to(TaskStatus::Testing));
        task.transition_to(TaskStatus::Executing).unwrap();
    }

    #[test]
    fn test_fix_loop_reentry() {
        let mut task = Task::new(Uuid::new_v4(), "flaky feature");
        task.transition_to(TaskStatus::Planning).unwrap();
        task.transition_to(TaskStatus::Executing).unwrap();
        task.transition_to(TaskStatus::Testing).unwrap();
        // Tests failed, fix child spawned, parent re-enters executing
        task.transition_to(TaskStatus::Executing).unwrap();
        task.transition_to(TaskStatus::Testing).unwrap();
        task.transition_to(TaskStatus::Documenting).unwrap();
    }

    #[test]
    fn test_pause_records_prior_status() {
        let mut task = Task::new(Uuid::new_v4(), "pausable");
        task.transition_to(TaskStatus::Planning).unwrap();
        task.transition_to(TaskStatus::Executing).unwrap();

        task.transition_to(TaskStatus::Paused).unwrap();
        assert_eq!(task.paused_from, Some(TaskStatus::Executing));

        task.transition_to(TaskStatus::Executing).unwrap();
        assert!(task.paused_from.is_none());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut task = Task::new(Uuid::new_v4(), "done");
        task.fail(ErrorKind::Internal, "boom").unwrap();
        assert!(task.is_terminal());
        assert!(!task.can_transition_to(TaskStatus::Pending));
        assert_eq!(task.error_kind, Some(ErrorKind::Internal));
    }

    #[test]
    fn test_leased_statuses() {
        assert!(TaskStatus::Executing.is_leased());
        assert!(TaskStatus::Planning.is_leased());
        assert!(!TaskStatus::Pending.is_leased());
        assert!(!TaskStatus::Paused.is_leased());
        assert!(!TaskStatus::PlanReview.is_leased());
    }

    #[test]
    fn test_validation() {
        let task = Task::new(Uuid::new_v4(), "   ");
        assert!(task.validate().is_err());

        let task = Task::new(Uuid::new_v4(), "valid request");
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_role_round_trip() {
        for role in [
            AgentRole::Planner,
            AgentRole::CoderBackend,
            AgentRole::CoderFrontend,
            AgentRole::CoderInfra,
            AgentRole::Qa,
            AgentRole::Docs,
        ] {
            assert_eq!(AgentRole::from_str(role.as_str()), Some(role));
        }
    }
}
