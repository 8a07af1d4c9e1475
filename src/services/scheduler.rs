//! DAG scheduler.
//!
//! Computes the ready frontier (pending tasks whose cross-task
//! dependencies are all completed), dispatches it FIFO into a
//! semaphore-bounded worker pool, and cascades failure to dependents.
//! A task is never dispatched twice: the in-flight set is checked under
//! the same lock that inserts into it. At most one task runs per
//! repository at a time unless the candidates' planner-declared
//! affected-file sets are disjoint.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, ErrorKind};
use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskStore};

use super::event_bus::{EventBus, EventPayload};
use super::task_engine::TaskEngine;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker pool size.
    pub max_workers: usize,
    /// Frontier poll period.
    pub poll_period: std::time::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_period: std::time::Duration::from_secs(2),
        }
    }
}

struct Inflight {
    cancel: CancellationToken,
    repo_id: Uuid,
    /// Planner-declared affected files, empty when unplanned (treated as
    /// overlapping with everything in the same repository).
    affected_files: HashSet<String>,
}

/// Dispatches ready tasks to workers.
pub struct Scheduler {
    tasks: Arc<dyn TaskStore>,
    engine: Arc<TaskEngine>,
    bus: Arc<EventBus>,
    slots: Arc<Semaphore>,
    inflight: Arc<Mutex<HashMap<Uuid, Inflight>>>,
    shutdown: CancellationToken,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        engine: Arc<TaskEngine>,
        bus: Arc<EventBus>,
        config: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tasks,
            engine,
            bus,
            slots: Arc::new(Semaphore::new(config.max_workers)),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
            config,
        }
    }

    /// Main loop: recompute the frontier on every bus event and on a
    /// polling interval, until shutdown.
    pub async fn run(self: Arc<Self>) {
        let mut events = self.bus.subscribe();
        let mut interval = tokio::time::interval(self.config.poll_period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(workers = self.config.max_workers, "scheduler started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {}
                event = events.recv() => {
                    match event {
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(missed = n, "scheduler lagged behind event bus");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }

            if let Err(e) = self.dispatch_pass().await {
                tracing::warn!(error = %e, "dispatch pass failed");
            }
        }
    }

    /// One frontier computation + dispatch round.
    pub async fn dispatch_pass(&self) -> DomainResult<()> {
        self.cascade_dependency_failures().await?;

        let candidates = self.dispatchable().await?;
        for task in candidates {
            if self.slots.available_permits() == 0 {
                // Saturated; tasks stay queued, no timeout.
                break;
            }
            self.try_dispatch(task).await?;
        }
        Ok(())
    }

    /// Tasks eligible for a worker slot, FIFO by creation time.
    ///
    /// Pending tasks form the classic ready frontier. Tasks sitting in a
    /// mid-pipeline status without an owner (resumed from pause, approved
    /// plans, recovered parents) are re-dispatched the same way.
    async fn dispatchable(&self) -> DomainResult<Vec<Task>> {
        let mut out = Vec::new();
        let inflight = self.inflight.lock().await;

        for status in [
            TaskStatus::Pending,
            TaskStatus::Planning,
            TaskStatus::Executing,
            TaskStatus::Testing,
            TaskStatus::Documenting,
        ] {
            let tasks = self
                .tasks
                .list(TaskFilter { status: Some(status), ..Default::default() })
                .await?;
            for task in tasks {
                if inflight.contains_key(&task.id) {
                    continue;
                }
                // Children of an in-flight parent run inline inside the
                // parent's worker; dispatching them here would run them twice.
                if task
                    .parent_id
                    .map(|p| inflight.contains_key(&p))
                    .unwrap_or(false)
                {
                    continue;
                }
                if status == TaskStatus::Pending && !self.frontier_ready(&task).await? {
                    continue;
                }
                out.push(task);
            }
        }

        out.sort_by_key(|t| t.created_at);
        Ok(out)
    }

    /// Ready iff every cross-task dependency is completed.
    async fn frontier_ready(&self, task: &Task) -> DomainResult<bool> {
        for dep_id in &task.depends_on {
            match self.tasks.get(*dep_id).await? {
                Some(dep) if dep.status == TaskStatus::Completed => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Fail pending tasks whose dependencies have failed. A failed task
    /// does not touch its siblings, only its dependents.
    async fn cascade_dependency_failures(&self) -> DomainResult<()> {
        let pending = self
            .tasks
            .list(TaskFilter { status: Some(TaskStatus::Pending), ..Default::default() })
            .await?;

        for mut task in pending {
            let mut failed_dep = None;
            for dep_id in &task.depends_on {
                if let Some(dep) = self.tasks.get(*dep_id).await? {
                    if dep.status == TaskStatus::Failed {
                        failed_dep = Some(*dep_id);
                        break;
                    }
                }
            }

            if let Some(dep_id) = failed_dep {
                let message = format!("dependency {dep_id} failed");
                if task.fail(ErrorKind::DependencyFailed, message.clone()).is_ok()
                    && self
                        .tasks
                        .update_expecting(&task, TaskStatus::Pending)
                        .await
                        .is_ok()
                {
                    self.bus
                        .publish(task.id, EventPayload::Status { status: TaskStatus::Failed })
                        .await;
                    self.bus
                        .publish(
                            task.id,
                            EventPayload::Error { kind: ErrorKind::DependencyFailed, message },
                        )
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Dispatch one task if repository serialization allows it.
    async fn try_dispatch(&self, task: Task) -> DomainResult<()> {
        let mut inflight = self.inflight.lock().await;

        if inflight.contains_key(&task.id) {
            return Ok(());
        }

        let affected: HashSet<String> = task
            .plan
            .as_ref()
            .map(|p| p.affected_files.iter().cloned().collect())
            .unwrap_or_default();

        // One task per repository unless both declared file sets are
        // known and disjoint. An unplanned task has an unknown footprint
        // and serializes with everything in its repository.
        let conflict = inflight.values().any(|running| {
            running.repo_id == task.repo_id
                && (affected.is_empty()
                    || running.affected_files.is_empty()
                    || !running.affected_files.is_disjoint(&affected))
        });
        if conflict {
            return Ok(());
        }

        let Ok(permit) = self.slots.clone().try_acquire_owned() else {
            return Ok(());
        };

        let cancel = self.shutdown.child_token();
        inflight.insert(
            task.id,
            Inflight {
                cancel: cancel.clone(),
                repo_id: task.repo_id,
                affected_files: affected,
            },
        );
        drop(inflight);

        let engine = self.engine.clone();
        let inflight_map = self.inflight.clone();
        let task_id = task.id;

        tracing::info!(%task_id, status = %task.status, "dispatching task");

        tokio::spawn(async move {
            let result = engine.run(task_id, cancel).await;
            match &result {
                Ok(exit) => tracing::debug!(%task_id, ?exit, "worker finished"),
                Err(e) => tracing::warn!(%task_id, error = %e, "worker errored"),
            }
            inflight_map.lock().await.remove(&task_id);
            drop(permit);
        });

        Ok(())
    }

    /// Cancel the in-flight workers for a task and its stored descendants.
    ///
    /// Inline children share their parent's token, so cancelling the
    /// parent propagates transitively.
    pub async fn cancel_subtree(&self, root: Uuid) -> DomainResult<()> {
        let mut ids = vec![root];
        let mut queue = vec![root];
        while let Some(id) = queue.pop() {
            for child in self.tasks.children(id).await? {
                ids.push(child.id);
                queue.push(child.id);
            }
        }

        let inflight = self.inflight.lock().await;
        for id in ids {
            if let Some(entry) = inflight.get(&id) {
                entry.cancel.cancel();
            }
        }
        Ok(())
    }

    /// Whether a worker currently owns the task.
    pub async fn is_inflight(&self, task_id: Uuid) -> bool {
        self.inflight.lock().await.contains_key(&task_id)
    }
}
