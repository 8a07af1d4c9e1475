//! Command API.
//!
//! JSON endpoints for task and repository lifecycle commands, mirroring
//! the state machine: wrong-state commands return 409 without touching
//! the task.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::domain::errors::{DomainError, ErrorKind};
use crate::domain::models::{AgentRun, ApiConfig, Repository, Task, TaskStatus};
use crate::domain::ports::{RepoStore, RunStore, TaskFilter, TaskStore};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::Scheduler;

use super::stream::{file_tree, stream_task};

/// Shared state for the API.
pub struct ApiState {
    pub tasks: Arc<dyn TaskStore>,
    pub runs: Arc<dyn RunStore>,
    pub repos: Arc<dyn RepoStore>,
    pub bus: Arc<EventBus>,
    pub scheduler: Arc<Scheduler>,
    pub config: ApiConfig,
}

/// API server over the orchestrator state.
pub struct ApiServer {
    state: Arc<ApiState>,
}

impl ApiServer {
    pub fn new(state: Arc<ApiState>) -> Self {
        Self { state }
    }

    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/tasks", post(create_task).get(list_tasks))
            .route("/tasks/{id}", get(get_task).delete(delete_task))
            .route("/tasks/{id}/approve", post(approve_task))
            .route("/tasks/{id}/reject", post(reject_task))
            .route("/tasks/{id}/pause", post(pause_task))
            .route("/tasks/{id}/resume", post(resume_task))
            .route("/stream/task/{id}", get(stream_task))
            .route("/files/tree", get(file_tree))
            .route("/repos", post(create_repo).get(list_repos))
            .route("/repos/{id}", get(get_repo).delete(delete_repo))
            .route("/health", get(health))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.state.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router
    }

    pub async fn serve_with_shutdown<F>(
        self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr =
            format!("{}:{}", self.state.config.host, self.state.config.port).parse()?;
        let router = self.build_router();

        tracing::info!("api listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

// =========================================================================
// Wire types
// =========================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse { error: error.into(), code: code.to_string() }),
    )
}

fn internal_error(e: DomainError) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub repo_id: Uuid,
    pub user_request: String,
    #[serde(default)]
    pub parent_task_id: Option<Uuid>,
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub repo_id: Option<Uuid>,
    #[serde(default)]
    pub parent_task_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub parent_task_id: Option<Uuid>,
    pub repo_id: Uuid,
    pub user_request: String,
    pub title: Option<String>,
    pub status: String,
    pub current_role: Option<String>,
    pub current_step: u32,
    pub plan: Option<crate::domain::models::Plan>,
    pub retry_count: u32,
    pub requires_review: bool,
    pub error_message: Option<String>,
    pub error_kind: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl From<Task> for TaskResponse {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            parent_task_id: t.parent_id,
            repo_id: t.repo_id,
            user_request: t.user_request,
            title: t.title,
            status: t.status.as_str().to_string(),
            current_role: t.current_role.map(|r| r.as_str().to_string()),
            current_step: t.current_step,
            plan: t.plan,
            retry_count: t.retry_count,
            requires_review: t.requires_review,
            error_message: t.error_message,
            error_kind: t.error_kind.map(|k| k.as_str().to_string()),
            created_at: t.created_at.to_rfc3339(),
            updated_at: t.updated_at.to_rfc3339(),
            completed_at: t.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AgentRunResponse {
    pub id: Uuid,
    pub step: u32,
    pub role: String,
    pub title: String,
    pub subtitle: String,
    pub reasoning: String,
    pub invocations: Vec<crate::domain::models::ToolInvocation>,
    pub confidence: f64,
    pub requires_review: bool,
    pub duration_ms: Option<u64>,
    pub created_at: String,
}

impl From<AgentRun> for AgentRunResponse {
    fn from(r: AgentRun) -> Self {
        Self {
            id: r.id,
            step: r.step,
            role: r.role.as_str().to_string(),
            title: r.title,
            subtitle: r.subtitle,
            reasoning: r.reasoning,
            invocations: r.invocations,
            confidence: r.confidence,
            requires_review: r.requires_review,
            duration_ms: r.duration_ms,
            created_at: r.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: TaskResponse,
    pub runs: Vec<AgentRunResponse>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRepoRequest {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RepoResponse {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub project_type: Option<String>,
    pub framework: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Repository> for RepoResponse {
    fn from(r: Repository) -> Self {
        Self {
            id: r.id,
            name: r.name,
            path: r.path,
            project_type: r.project_type,
            framework: r.framework,
            created_at: r.created_at.to_rfc3339(),
            updated_at: r.updated_at.to_rfc3339(),
        }
    }
}

// =========================================================================
// Task handlers
// =========================================================================

async fn create_task(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    if body.user_request.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "user_request cannot be empty",
        ));
    }

    let repo = state
        .repos
        .get(body.repo_id)
        .await
        .map_err(internal_error)?;
    if repo.is_none() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            "repo_not_found",
            format!("repository {} not found", body.repo_id),
        ));
    }

    if let Some(parent_id) = body.parent_task_id {
        if state
            .tasks
            .get(parent_id)
            .await
            .map_err(internal_error)?
            .is_none()
        {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                format!("parent task {parent_id} not found"),
            ));
        }
    }

    let mut task = Task::new(body.repo_id, body.user_request);
    if let Some(parent_id) = body.parent_task_id {
        task = task.with_parent(parent_id);
    }
    for dep in body.depends_on {
        task = task.with_dependency(dep);
    }

    state.tasks.create(&task).await.map_err(|e| match e {
        DomainError::ValidationFailed(msg) => {
            api_error(StatusCode::BAD_REQUEST, "invalid_request", msg)
        }
        other => internal_error(other),
    })?;

    // The first stream event is the pending -> planning transition once
    // a worker picks the task up; creation itself publishes nothing.
    Ok(Json(task.into()))
}

async fn list_tasks(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(s) => Some(TaskStatus::from_str(s).ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, "invalid_request", format!("unknown status: {s}"))
        })?),
        None => None,
    };

    let tasks = state
        .tasks
        .list(TaskFilter {
            repo_id: query.repo_id,
            parent_id: query.parent_task_id,
            status,
            ..Default::default()
        })
        .await
        .map_err(internal_error)?;

    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

async fn get_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDetailResponse>, ApiError> {
    let task = load_task(&state, id).await?;
    let runs = state.runs.for_task(id).await.map_err(internal_error)?;

    Ok(Json(TaskDetailResponse {
        task: task.into(),
        runs: runs.into_iter().map(AgentRunResponse::from).collect(),
    }))
}

/// Delete a task tree: cancel running workers, fail everything
/// non-terminal (error event last), then remove the rows.
async fn delete_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let root = load_task(&state, id).await?;

    state
        .scheduler
        .cancel_subtree(id)
        .await
        .map_err(internal_error)?;

    // Children first so the root's error event carries the tree's final
    // sequence number.
    let mut subtree = Vec::new();
    let mut queue = vec![root.clone()];
    while let Some(task) = queue.pop() {
        let children = state.tasks.children(task.id).await.map_err(internal_error)?;
        queue.extend(children);
        subtree.push(task);
    }
    subtree.reverse();

    for mut task in subtree {
        if task.is_terminal() {
            continue;
        }
        let expected = task.status;
        let kind = if task.id == id {
            ErrorKind::Cancelled
        } else {
            ErrorKind::ParentCancelled
        };
        let message = if task.id == id {
            "task deleted".to_string()
        } else {
            "parent cancelled".to_string()
        };
        if task.fail(kind, message.clone()).is_ok()
            && state.tasks.update_expecting(&task, expected).await.is_ok()
        {
            state
                .bus
                .publish(task.id, EventPayload::Status { status: TaskStatus::Failed })
                .await;
            state
                .bus
                .publish(task.id, EventPayload::Error { kind, message })
                .await;
        }
    }

    state.tasks.delete_cascade(id).await.map_err(|e| match e {
        DomainError::TaskNotFound(_) => {
            api_error(StatusCode::NOT_FOUND, "task_not_found", "task not found")
        }
        other => internal_error(other),
    })?;

    Ok(StatusCode::NO_CONTENT)
}

async fn approve_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut task = load_task(&state, id).await?;

    if task.status != TaskStatus::PlanReview {
        return Err(wrong_state(task.status, "approve requires plan_review"));
    }

    task.transition_to(TaskStatus::Executing)
        .map_err(|e| api_error(StatusCode::CONFLICT, "wrong_state", e))?;
    state
        .tasks
        .update_expecting(&task, TaskStatus::PlanReview)
        .await
        .map_err(conflict_or_internal)?;

    state
        .bus
        .publish(task.id, EventPayload::Status { status: task.status })
        .await;

    Ok(StatusCode::NO_CONTENT)
}

async fn reject_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectRequest>,
) -> Result<StatusCode, ApiError> {
    let mut task = load_task(&state, id).await?;

    if task.status != TaskStatus::PlanReview {
        return Err(wrong_state(task.status, "reject requires plan_review"));
    }

    let message = match body.feedback {
        Some(feedback) if !feedback.trim().is_empty() => {
            format!("plan rejected: {feedback}")
        }
        _ => "plan rejected by user".to_string(),
    };

    task.fail(ErrorKind::PlanRejected, message.clone())
        .map_err(|e| api_error(StatusCode::CONFLICT, "wrong_state", e))?;
    state
        .tasks
        .update_expecting(&task, TaskStatus::PlanReview)
        .await
        .map_err(conflict_or_internal)?;

    state
        .bus
        .publish(task.id, EventPayload::Status { status: TaskStatus::Failed })
        .await;
    state
        .bus
        .publish(
            task.id,
            EventPayload::Error { kind: ErrorKind::PlanRejected, message },
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

async fn pause_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut task = load_task(&state, id).await?;

    if task.is_terminal() {
        return Err(wrong_state(task.status, "cannot pause a terminal task"));
    }
    if task.status == TaskStatus::Paused {
        return Err(wrong_state(task.status, "task is already paused"));
    }

    let expected = task.status;
    task.transition_to(TaskStatus::Paused)
        .map_err(|e| api_error(StatusCode::CONFLICT, "wrong_state", e))?;
    state
        .tasks
        .update_expecting(&task, expected)
        .await
        .map_err(conflict_or_internal)?;

    state
        .bus
        .publish(task.id, EventPayload::Status { status: TaskStatus::Paused })
        .await;

    Ok(StatusCode::NO_CONTENT)
}

async fn resume_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut task = load_task(&state, id).await?;

    if task.status != TaskStatus::Paused {
        return Err(wrong_state(task.status, "resume requires paused"));
    }

    let restored = task.paused_from.unwrap_or(TaskStatus::Pending);
    task.transition_to(restored)
        .map_err(|e| api_error(StatusCode::CONFLICT, "wrong_state", e))?;
    state
        .tasks
        .update_expecting(&task, TaskStatus::Paused)
        .await
        .map_err(conflict_or_internal)?;

    state
        .bus
        .publish(task.id, EventPayload::Status { status: task.status })
        .await;

    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// Repository handlers
// =========================================================================

async fn create_repo(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateRepoRequest>,
) -> Result<Json<RepoResponse>, ApiError> {
    if !std::path::Path::new(&body.path).is_dir() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("path is not a directory: {}", body.path),
        ));
    }

    let mut repo = Repository::new(body.name, body.path);
    repo.project_type = body.project_type;
    repo.framework = body.framework;

    state.repos.create(&repo).await.map_err(|e| match e {
        DomainError::ValidationFailed(msg) => {
            api_error(StatusCode::BAD_REQUEST, "invalid_request", msg)
        }
        other => internal_error(other),
    })?;

    Ok(Json(repo.into()))
}

async fn list_repos(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<RepoResponse>>, ApiError> {
    let repos = state.repos.list().await.map_err(internal_error)?;
    Ok(Json(repos.into_iter().map(RepoResponse::from).collect()))
}

async fn get_repo(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RepoResponse>, ApiError> {
    let repo = state
        .repos
        .get(id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| {
            api_error(StatusCode::NOT_FOUND, "repo_not_found", "repository not found")
        })?;
    Ok(Json(repo.into()))
}

async fn delete_repo(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.repos.delete(id).await.map_err(|e| match e {
        DomainError::RepositoryNotFound(_) => {
            api_error(StatusCode::NOT_FOUND, "repo_not_found", "repository not found")
        }
        other => internal_error(other),
    })?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    subscribers: usize,
}

async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        subscribers: state.bus.subscriber_count(),
    })
}

// =========================================================================
// Helpers
// =========================================================================

pub(super) async fn load_task(state: &ApiState, id: Uuid) -> Result<Task, ApiError> {
    state
        .tasks
        .get(id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "task_not_found", "task not found"))
}

fn wrong_state(current: TaskStatus, detail: &str) -> ApiError {
    api_error(
        StatusCode::CONFLICT,
        "wrong_state",
        format!("{detail} (current status: {current})"),
    )
}

fn conflict_or_internal(e: DomainError) -> ApiError {
    match e {
        DomainError::ConcurrencyConflict { .. } => api_error(
            StatusCode::CONFLICT,
            "wrong_state",
            "task changed state concurrently",
        ),
        DomainError::TaskNotFound(_) => {
            api_error(StatusCode::NOT_FOUND, "task_not_found", "task not found")
        }
        other => internal_error(other),
    }
}
