//! Task engine: drives one task through the pipeline.
//!
//! A worker owns exactly one task and runs this engine over it. Every
//! state transition is a compare-and-swap against the expected current
//! status, so concurrent writers (API pause/delete, lease sweeper) are
//! detected rather than overwritten. The engine heartbeats for the
//! whole time it owns the task, observes pause before every phase and
//! step, and spawns fix / write-tests children inline when testing
//! demands them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult, ErrorKind};
use crate::domain::models::{
    AgentRole, EngineConfig, Plan, Repository, Task, TaskStatus,
};
use crate::domain::ports::{Clock, RepoStore, RunStore, TaskStore};

use super::agent_runtime::{AgentOutcome, AgentRuntime, QaVerdict};
use super::event_bus::{EventBus, EventPayload};
use super::prompts;
use super::tools::ToolContext;

/// How an engine run over a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    /// Task reached `completed`.
    Completed,
    /// Task reached `failed`.
    Failed,
    /// Task yielded without reaching a terminal state (paused, awaiting
    /// plan review, or an external writer took over).
    Suspended,
}

/// Single-task driver.
pub struct TaskEngine {
    tasks: Arc<dyn TaskStore>,
    runs: Arc<dyn RunStore>,
    repos: Arc<dyn RepoStore>,
    bus: Arc<EventBus>,
    runtime: Arc<AgentRuntime>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl TaskEngine {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        runs: Arc<dyn RunStore>,
        repos: Arc<dyn RepoStore>,
        bus: Arc<EventBus>,
        runtime: Arc<AgentRuntime>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            tasks,
            runs,
            repos,
            bus,
            runtime,
            clock,
            config,
        }
    }

    /// Drive a task as far as it will go in this ownership window.
    pub async fn run(&self, task_id: Uuid, cancel: CancellationToken) -> DomainResult<EngineExit> {
        let Some(mut task) = self.tasks.get(task_id).await? else {
            return Err(DomainError::TaskNotFound(task_id));
        };

        let Some(repo) = self.repos.get(task.repo_id).await? else {
            self.fail(&mut task, ErrorKind::Internal, "repository not found")
                .await?;
            return Ok(EngineExit::Failed);
        };

        let heartbeat = self.start_heartbeat(task_id);
        let result = self.drive(task, &repo, &cancel).await;
        heartbeat.abort();
        result
    }

    async fn drive(
        &self,
        mut task: Task,
        repo: &Repository,
        cancel: &CancellationToken,
    ) -> DomainResult<EngineExit> {
        let ctx = ToolContext {
            repo_root: std::path::PathBuf::from(&repo.path),
            cancel: cancel.clone(),
        };

        loop {
            if cancel.is_cancelled() {
                self.fail(&mut task, ErrorKind::Cancelled, "cancelled").await?;
                return Ok(EngineExit::Failed);
            }

            match task.status {
                TaskStatus::Pending => {
                    self.commit(&mut task, TaskStatus::Planning).await?;
                }
                TaskStatus::Planning => match self.planning_phase(&mut task, repo, &ctx).await? {
                    PhaseResult::Advance => {}
                    PhaseResult::Yield(exit) => return Ok(exit),
                },
                TaskStatus::PlanReview => {
                    // Waiting on an external approve/reject.
                    return Ok(EngineExit::Suspended);
                }
                TaskStatus::Executing => match self.executing_phase(&mut task, repo, &ctx).await? {
                    PhaseResult::Advance => {}
                    PhaseResult::Yield(exit) => return Ok(exit),
                },
                TaskStatus::Testing => match self.testing_phase(&mut task, repo, &ctx).await? {
                    PhaseResult::Advance => {}
                    PhaseResult::Yield(exit) => return Ok(exit),
                },
                TaskStatus::Documenting => {
                    match self.documenting_phase(&mut task, repo, &ctx).await? {
                        PhaseResult::Advance => {}
                        PhaseResult::Yield(exit) => return Ok(exit),
                    }
                }
                TaskStatus::Paused => return Ok(EngineExit::Suspended),
                TaskStatus::Completed => return Ok(EngineExit::Completed),
                TaskStatus::Failed => return Ok(EngineExit::Failed),
            }
        }
    }

    // =====================================================================
    // Phases
    // =====================================================================

    async fn planning_phase(
        &self,
        task: &mut Task,
        repo: &Repository,
        ctx: &ToolContext,
    ) -> DomainResult<PhaseResult> {
        task.current_role = Some(AgentRole::Planner);
        self.tasks.update(task).await?;

        let task_id = task.id;
        let prompt = prompts::planning_prompt(&task.user_request, &repo.name);
        let outcome = match self
            .invoke_with_retry(task, || async {
                self.runtime.run_planner(task_id, &prompt, ctx).await
            })
            .await?
        {
            Some(outcome) => outcome,
            None => {
                self.fail(task, ErrorKind::AgentFailed, "planner failed after retry")
                    .await?;
                return Ok(PhaseResult::Yield(EngineExit::Failed));
            }
        };

        let Some(plan) = outcome.plan.clone() else {
            self.record_and_publish(task, &outcome).await?;
            self.fail(task, ErrorKind::AgentFailed, "planner returned no plan")
                .await?;
            return Ok(PhaseResult::Yield(EngineExit::Failed));
        };

        // A malformed plan never reaches an executor.
        if let Err(e) = plan.validate() {
            let kind = if e.is_cycle() {
                ErrorKind::CyclicPlan
            } else {
                ErrorKind::InvalidPlan
            };
            self.record_and_publish(task, &outcome).await?;
            self.fail(task, kind, e.to_string()).await?;
            return Ok(PhaseResult::Yield(EngineExit::Failed));
        }

        if let Err(e) = validate_plan_roles(&plan, &ctx.repo_root) {
            self.record_and_publish(task, &outcome).await?;
            self.fail(task, ErrorKind::InvalidPlan, e).await?;
            return Ok(PhaseResult::Yield(EngineExit::Failed));
        }

        task.plan = Some(plan.clone());
        task.requires_review |= outcome.requires_review;

        self.bus
            .publish(
                task.id,
                EventPayload::PlanReady {
                    summary: plan.summary.clone(),
                    step_count: plan.total_steps(),
                    confidence: outcome.confidence,
                },
            )
            .await;
        self.record_and_publish(task, &outcome).await?;

        if outcome.confidence >= self.config.auto_approve_confidence && !outcome.requires_review {
            self.commit(task, TaskStatus::Executing).await?;
            Ok(PhaseResult::Advance)
        } else {
            self.commit(task, TaskStatus::PlanReview).await?;
            tracing::info!(task_id = %task.id, confidence = outcome.confidence, "plan awaiting review");
            Ok(PhaseResult::Yield(EngineExit::Suspended))
        }
    }

    async fn executing_phase(
        &self,
        task: &mut Task,
        _repo: &Repository,
        ctx: &ToolContext,
    ) -> DomainResult<PhaseResult> {
        let Some(plan) = task.plan.clone() else {
            self.fail(task, ErrorKind::Internal, "executing without a plan")
                .await?;
            return Ok(PhaseResult::Yield(EngineExit::Failed));
        };

        let steps: Vec<_> = plan.ordered_steps().into_iter().cloned().collect();

        while (task.current_step as usize) < steps.len() {
            // Pause / external-writer checkpoint before each step.
            if let Some(exit) = self.observe_external(task, ctx).await? {
                return Ok(PhaseResult::Yield(exit));
            }

            let step = steps[task.current_step as usize].clone();
            task.current_role = Some(step.role);
            self.tasks.update(task).await?;

            let task_id = task.id;
            let prompt = prompts::step_prompt(&task.user_request, &step.description, &step.files);
            let outcome = match self
                .invoke_with_retry(task, || async {
                    self.runtime
                        .run_agent(task_id, step.role, step.order, &prompt, &step.files, ctx)
                        .await
                })
                .await?
            {
                Some(outcome) => outcome,
                None => {
                    self.fail(
                        task,
                        ErrorKind::AgentFailed,
                        format!("step {} failed after retry", step.order),
                    )
                    .await?;
                    return Ok(PhaseResult::Yield(EngineExit::Failed));
                }
            };

            self.record_and_publish(task, &outcome).await?;

            task.requires_review |= outcome.requires_review;
            task.current_step += 1;
            self.tasks
                .update_expecting(task, TaskStatus::Executing)
                .await?;
        }

        // All steps done. A non-terminal child (paused mid-fix, or parked
        // for review) means this task is waiting, not ready to test.
        if self.has_active_children(task.id).await? {
            return Ok(PhaseResult::Yield(EngineExit::Suspended));
        }

        self.commit(task, TaskStatus::Testing).await?;
        Ok(PhaseResult::Advance)
    }

    async fn testing_phase(
        &self,
        task: &mut Task,
        repo: &Repository,
        ctx: &ToolContext,
    ) -> DomainResult<PhaseResult> {
        if let Some(exit) = self.observe_external(task, ctx).await? {
            return Ok(PhaseResult::Yield(exit));
        }

        if self.has_active_children(task.id).await? {
            return Ok(PhaseResult::Yield(EngineExit::Suspended));
        }

        task.current_role = Some(AgentRole::Qa);
        self.tasks.update(task).await?;

        let command = test_command(repo, &ctx.repo_root);
        let prompt = prompts::qa_prompt(&task.user_request, &command);
        let step = task.current_step;
        let task_id = task.id;
        let outcome = match self
            .invoke_with_retry(task, || async {
                self.runtime
                    .run_agent(task_id, AgentRole::Qa, step, &prompt, &[], ctx)
                    .await
            })
            .await?
        {
            Some(outcome) => outcome,
            None => {
                self.fail(task, ErrorKind::AgentFailed, "qa agent failed after retry")
                    .await?;
                return Ok(PhaseResult::Yield(EngineExit::Failed));
            }
        };

        self.record_and_publish(task, &outcome).await?;

        let verdict = outcome.verdict.clone().unwrap_or(QaVerdict::NoTestsExecuted);

        match verdict {
            QaVerdict::Passed => {
                self.commit(task, TaskStatus::Documenting).await?;
                Ok(PhaseResult::Advance)
            }
            QaVerdict::NoTestsExecuted => {
                let request = prompts::write_tests_request(&task.user_request);
                let title = format!(
                    "Write tests for: {}",
                    task.title.as_deref().unwrap_or("task")
                );
                self.spawn_and_run_child(task, ctx, request, title).await
            }
            QaVerdict::Failed { diagnostics } => {
                let request = prompts::fix_request(&task.user_request, &diagnostics);
                let title = format!("Fix: {}", task.title.as_deref().unwrap_or("task"));
                self.spawn_and_run_child(task, ctx, request, title).await
            }
        }
    }

    async fn documenting_phase(
        &self,
        task: &mut Task,
        _repo: &Repository,
        ctx: &ToolContext,
    ) -> DomainResult<PhaseResult> {
        if let Some(exit) = self.observe_external(task, ctx).await? {
            return Ok(PhaseResult::Yield(exit));
        }

        task.current_role = Some(AgentRole::Docs);
        self.tasks.update(task).await?;

        let changed = task
            .plan
            .as_ref()
            .map(|p| p.affected_files.clone())
            .unwrap_or_default();
        let prompt = prompts::docs_prompt(&task.user_request, &changed);
        let step = task.current_step;

        // Documentation failure is non-fatal; the zero-confidence run is
        // still recorded for the audit trail.
        let task_id = task.id;
        let outcome = self
            .timed_invoke(|| async {
                self.runtime
                    .run_agent(task_id, AgentRole::Docs, step, &prompt, &[], ctx)
                    .await
            })
            .await;
        match outcome {
            Some(outcome) => {
                self.record_and_publish(task, &outcome).await?;
                if !outcome.succeeded() {
                    tracing::warn!(
                        task_id = %task.id,
                        failure = %outcome.failure.as_ref().map(ToString::to_string).unwrap_or_default(),
                        "docs phase failed, continuing to completion"
                    );
                }
            }
            None => {
                tracing::warn!(task_id = %task.id, "docs phase timed out, continuing to completion");
            }
        }

        self.commit(task, TaskStatus::Completed).await?;
        self.bus.publish(task.id, EventPayload::Complete).await;
        Ok(PhaseResult::Yield(EngineExit::Completed))
    }

    // =====================================================================
    // Fix-loop children
    // =====================================================================

    /// Spawn a child task and drive it inline inside this worker slot.
    ///
    /// Returns to testing when the child completes, spawns again (budget
    /// permitting) when it fails.
    async fn spawn_and_run_child(
        &self,
        task: &mut Task,
        ctx: &ToolContext,
        request: String,
        title: String,
    ) -> DomainResult<PhaseResult> {
        if task.retry_count >= self.config.max_fix_spawns
            || task.fix_depth >= self.config.max_fix_depth
        {
            self.fail(
                task,
                ErrorKind::TestsFailed,
                format!(
                    "tests still failing after {} fix attempts",
                    task.retry_count
                ),
            )
            .await?;
            return Ok(PhaseResult::Yield(EngineExit::Failed));
        }

        let child = Task::new(task.repo_id, request)
            .with_parent(task.id)
            .with_title(title)
            .with_fix_depth(task.fix_depth + 1);
        let child_id = child.id;
        self.tasks.create(&child).await?;

        task.retry_count += 1;
        // Parent returns to executing while the child works.
        self.commit(task, TaskStatus::Executing).await?;

        tracing::info!(
            parent = %task.id,
            child = %child_id,
            retry = task.retry_count,
            "spawned child task"
        );

        let child_exit = self.run_boxed(child_id, ctx.cancel.clone()).await?;

        // Reload the parent; the child run may have taken a while and an
        // external writer may have paused or cancelled us.
        let Some(reloaded) = self.tasks.get(task.id).await? else {
            return Err(DomainError::TaskNotFound(task.id));
        };
        *task = reloaded;
        if let Some(exit) = self.observe_external(task, ctx).await? {
            return Ok(PhaseResult::Yield(exit));
        }

        match child_exit {
            EngineExit::Completed => {
                // Parent retries testing.
                self.commit(task, TaskStatus::Testing).await?;
                Ok(PhaseResult::Advance)
            }
            EngineExit::Suspended => {
                // Child paused or parked for review; the parent stays in
                // executing and resumes when the child reaches a verdict.
                Ok(PhaseResult::Yield(EngineExit::Suspended))
            }
            EngineExit::Failed => {
                if task.retry_count >= self.config.max_fix_spawns {
                    self.fail(
                        task,
                        ErrorKind::TestsFailed,
                        format!("fix child failed and retry budget ({}) exhausted", self.config.max_fix_spawns),
                    )
                    .await?;
                    return Ok(PhaseResult::Yield(EngineExit::Failed));
                }
                // Re-enter testing; it will evaluate and spawn again.
                self.commit(task, TaskStatus::Testing).await?;
                Ok(PhaseResult::Advance)
            }
        }
    }

    async fn has_active_children(&self, task_id: Uuid) -> DomainResult<bool> {
        Ok(self
            .tasks
            .children(task_id)
            .await?
            .iter()
            .any(|c| !c.is_terminal()))
    }

    /// Recursion point for inline child execution.
    fn run_boxed(
        &self,
        task_id: Uuid,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = DomainResult<EngineExit>> + Send + '_>> {
        Box::pin(self.run(task_id, cancel))
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    /// Invoke an agent with the phase timeout, retrying once per engine
    /// policy. Failed attempts are recorded here; the successful outcome
    /// is returned unrecorded so the phase can order its events. `None`
    /// means the retry budget is spent.
    async fn invoke_with_retry<F, Fut>(
        &self,
        task: &mut Task,
        invoke: F,
    ) -> DomainResult<Option<AgentOutcome>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AgentOutcome>,
    {
        for attempt in 0..=self.config.max_agent_retries {
            let Some(outcome) = self.timed_invoke(&invoke).await else {
                tracing::warn!(task_id = %task.id, attempt, "agent invocation timed out");
                continue;
            };

            if outcome.succeeded() {
                return Ok(Some(outcome));
            }

            self.record_and_publish(task, &outcome).await?;
            tracing::warn!(
                task_id = %task.id,
                attempt,
                failure = %outcome.failure.as_ref().map(ToString::to_string).unwrap_or_default(),
                "agent invocation failed"
            );
        }
        Ok(None)
    }

    async fn timed_invoke<F, Fut>(&self, invoke: F) -> Option<AgentOutcome>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AgentOutcome>,
    {
        tokio::time::timeout(self.config.phase_timeout(), invoke())
            .await
            .ok()
    }

    /// Append the agent run, publish its `agent_log` event, then the
    /// `file_verified` events its tool calls produced.
    async fn record_and_publish(&self, task: &Task, outcome: &AgentOutcome) -> DomainResult<()> {
        let mut run = crate::domain::models::AgentRun::new(task.id, task.current_step, outcome.role);
        run.title = outcome.title.clone();
        run.subtitle = outcome.subtitle.clone();
        run.reasoning = outcome.reasoning.clone();
        run.invocations = outcome.invocations.clone();
        run.confidence = outcome.confidence;
        run.requires_review = outcome.requires_review;
        run.duration_ms = Some(outcome.duration_ms);
        self.runs.append(&run).await?;

        self.bus
            .publish(
                task.id,
                EventPayload::AgentLog {
                    role: outcome.role,
                    step: task.current_step,
                    title: outcome.title.clone(),
                    subtitle: outcome.subtitle.clone(),
                    confidence: outcome.confidence,
                    requires_review: outcome.requires_review,
                },
            )
            .await;

        for event in &outcome.file_events {
            self.bus
                .publish(
                    task.id,
                    EventPayload::FileVerified {
                        step: event.step,
                        path: event.path.clone(),
                        action: event.action,
                        byte_size: event.byte_size,
                        warnings: event.warnings.clone(),
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Reload the task and yield if an external writer changed it under us.
    async fn observe_external(
        &self,
        task: &mut Task,
        ctx: &ToolContext,
    ) -> DomainResult<Option<EngineExit>> {
        if ctx.cancel.is_cancelled() {
            self.fail(task, ErrorKind::Cancelled, "cancelled").await?;
            return Ok(Some(EngineExit::Failed));
        }

        let Some(current) = self.tasks.get(task.id).await? else {
            return Ok(Some(EngineExit::Suspended));
        };

        match current.status {
            TaskStatus::Paused => {
                *task = current;
                tracing::info!(task_id = %task.id, "task paused, yielding at checkpoint");
                Ok(Some(EngineExit::Suspended))
            }
            TaskStatus::Failed => {
                *task = current;
                Ok(Some(EngineExit::Failed))
            }
            TaskStatus::Completed => {
                *task = current;
                Ok(Some(EngineExit::Completed))
            }
            _ => {
                *task = current;
                Ok(None)
            }
        }
    }

    /// CAS transition with a bounded read-modify-write retry, publishing
    /// the status event on commit.
    async fn commit(&self, task: &mut Task, to: TaskStatus) -> DomainResult<()> {
        const MAX_ATTEMPTS: u32 = 3;

        let mut attempts = 0;
        loop {
            let expected = task.status;
            task.transition_to(to).map_err(|_| {
                DomainError::InvalidStateTransition { from: expected, to }
            })?;
            task.heartbeat_at = self.clock.now();

            match self.tasks.update_expecting(task, expected).await {
                Ok(()) => break,
                Err(DomainError::ConcurrencyConflict { .. }) if attempts < MAX_ATTEMPTS => {
                    attempts += 1;
                    let Some(current) = self.tasks.get(task.id).await? else {
                        return Err(DomainError::TaskNotFound(task.id));
                    };
                    *task = current;
                    // External writers win; only retry when the reloaded
                    // state still allows this transition.
                    if !task.status.can_transition_to(to) {
                        return Err(DomainError::ConcurrencyConflict {
                            task_id: task.id,
                            expected,
                        });
                    }
                }
                Err(e) => return Err(e),
            }
        }

        self.bus
            .publish(task.id, EventPayload::Status { status: task.status })
            .await;
        Ok(())
    }

    /// Fail the task and publish the status + error events.
    async fn fail(
        &self,
        task: &mut Task,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> DomainResult<()> {
        let message = message.into();
        let expected = task.status;
        if task.fail(kind, message.clone()).is_err() {
            // Already terminal; nothing to record.
            return Ok(());
        }
        task.heartbeat_at = self.clock.now();

        if let Err(e) = self.tasks.update_expecting(task, expected).await {
            tracing::warn!(task_id = %task.id, error = %e, "failed to persist failure");
            return Ok(());
        }

        self.bus
            .publish(task.id, EventPayload::Status { status: TaskStatus::Failed })
            .await;
        self.bus
            .publish(task.id, EventPayload::Error { kind, message })
            .await;
        Ok(())
    }

    /// Heartbeat ticker for the duration of engine ownership.
    fn start_heartbeat(&self, task_id: Uuid) -> tokio::task::JoinHandle<()> {
        let tasks = self.tasks.clone();
        let clock = self.clock.clone();
        let period = self.config.heartbeat();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = tasks.heartbeat(task_id, clock.now()).await {
                    tracing::debug!(%task_id, error = %e, "heartbeat write failed");
                }
            }
        })
    }
}

enum PhaseResult {
    /// Continue the drive loop with the task's new status.
    Advance,
    /// Stop driving and return this exit.
    Yield(EngineExit),
}

/// Planner-shape rules that need the filesystem: new files may only be
/// created by coder steps, and plan steps never carry the planner role.
fn validate_plan_roles(plan: &Plan, repo_root: &std::path::Path) -> Result<(), String> {
    for step in &plan.steps {
        if step.role == AgentRole::Planner {
            return Err(format!("step {} assigns the planner role", step.order));
        }
        if !step.role.is_coder() {
            for file in &step.files {
                let exists = super::tools::resolve_repo_path(repo_root, file)
                    .map(|p| p.exists())
                    .unwrap_or(false);
                if !exists {
                    return Err(format!(
                        "step {} ({}) declares new file {} but only coder steps may create files",
                        step.order, step.role, file
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Pick the test command for a repository: explicit project type first,
/// then build-file detection, then the pytest default.
fn test_command(repo: &Repository, repo_root: &std::path::Path) -> String {
    let by_type = repo.project_type.as_deref().and_then(|t| match t {
        "rust" => Some("cargo test"),
        "python" => Some("pytest"),
        "node" | "javascript" | "typescript" => Some("npm test --silent"),
        "go" => Some("go test ./..."),
        _ => None,
    });
    if let Some(command) = by_type {
        return command.to_string();
    }

    if repo_root.join("Cargo.toml").exists() {
        "cargo test".to_string()
    } else if repo_root.join("package.json").exists() {
        "npm test --silent".to_string()
    } else if repo_root.join("go.mod").exists() {
        "go test ./...".to_string()
    } else {
        "pytest".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_command_inference() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut repo = Repository::new("r", dir.path().to_string_lossy());

        assert_eq!(test_command(&repo, dir.path()), "pytest");

        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        assert_eq!(test_command(&repo, dir.path()), "cargo test");

        repo.project_type = Some("python".to_string());
        assert_eq!(test_command(&repo, dir.path()), "pytest");
    }

    #[test]
    fn test_plan_role_validation() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("README.md"), "# readme").unwrap();

        let plan = Plan {
            summary: "s".to_string(),
            steps: vec![crate::domain::models::PlanStep {
                order: 0,
                description: "update docs".to_string(),
                role: AgentRole::Docs,
                files: vec!["README.md".to_string()],
                depends_on: vec![],
            }],
            estimated_complexity: 1,
            affected_files: vec![],
            risks: vec![],
        };
        assert!(validate_plan_roles(&plan, dir.path()).is_ok());

        let plan_new_file = Plan {
            steps: vec![crate::domain::models::PlanStep {
                order: 0,
                description: "write new docs".to_string(),
                role: AgentRole::Docs,
                files: vec!["GUIDE.md".to_string()],
                depends_on: vec![],
            }],
            ..plan.clone()
        };
        assert!(validate_plan_roles(&plan_new_file, dir.path()).is_err());

        let plan_planner_step = Plan {
            steps: vec![crate::domain::models::PlanStep {
                order: 0,
                description: "plan more".to_string(),
                role: AgentRole::Planner,
                files: vec![],
                depends_on: vec![],
            }],
            ..plan
        };
        assert!(validate_plan_roles(&plan_planner_step, dir.path()).is_err());
    }
}
