//! Full-stack harness over an in-memory database, a temp repository,
//! and a scripted generative client.

use std::sync::Arc;
use tempfile::TempDir;

use foreman::adapters::sqlite::{
    SqliteEventLog, SqliteFileEventStore, SqliteRepoStore, SqliteRunStore, SqliteTaskStore,
};
use foreman::domain::models::{EngineConfig, Repository};
use foreman::domain::ports::{RepoStore, SystemClock};
use foreman::infrastructure::llm::MockGenerativeClient;
use foreman::services::{
    AgentRuntime, AgentRuntimeConfig, EventBus, EventBusConfig, RealityVerifier, TaskEngine,
    ToolRegistryBuilder, VerifierTimeouts,
};

use super::database::setup_test_db;

pub struct Harness {
    pub pool: sqlx::SqlitePool,
    pub tasks: Arc<SqliteTaskStore>,
    pub runs: Arc<SqliteRunStore>,
    pub repos: Arc<SqliteRepoStore>,
    pub file_events: Arc<SqliteFileEventStore>,
    pub bus: Arc<EventBus>,
    pub engine: Arc<TaskEngine>,
    pub mock: Arc<MockGenerativeClient>,
    pub repo: Repository,
    pub repo_dir: TempDir,
}

pub async fn build_harness() -> Harness {
    build_harness_with(EngineConfig::default()).await
}

pub async fn build_harness_with(engine_config: EngineConfig) -> Harness {
    let pool = setup_test_db().await;

    let tasks = Arc::new(SqliteTaskStore::new(pool.clone()));
    let runs = Arc::new(SqliteRunStore::new(pool.clone()));
    let repos = Arc::new(SqliteRepoStore::new(pool.clone()));
    let file_events = Arc::new(SqliteFileEventStore::new(pool.clone()));
    let event_log = Arc::new(SqliteEventLog::new(pool.clone()));

    let bus = Arc::new(EventBus::new(EventBusConfig::default(), event_log));

    let repo_dir = TempDir::new().expect("failed to create repo dir");
    let repo = Repository::new("fixture", repo_dir.path().to_string_lossy());
    repos.create(&repo).await.expect("failed to register repo");

    let registry = Arc::new(ToolRegistryBuilder::new().with_builtin_tools().build());
    let verifier = Arc::new(RealityVerifier::new(
        registry.clone(),
        file_events.clone(),
        VerifierTimeouts::default(),
    ));

    let mock = Arc::new(MockGenerativeClient::new());
    let runtime = Arc::new(AgentRuntime::new(
        mock.clone(),
        verifier,
        registry,
        AgentRuntimeConfig::default(),
    ));

    let engine = Arc::new(TaskEngine::new(
        tasks.clone(),
        runs.clone(),
        repos.clone(),
        bus.clone(),
        runtime,
        Arc::new(SystemClock),
        engine_config,
    ));

    Harness {
        pool,
        tasks,
        runs,
        repos,
        file_events,
        bus,
        engine,
        mock,
        repo,
        repo_dir,
    }
}

/// Structured planner output with one coder step touching `file`.
pub fn single_step_plan(file: &str, confidence: f64) -> serde_json::Value {
    serde_json::json!({
        "summary": format!("Create {file}"),
        "steps": [{
            "order": 0,
            "description": format!("Write {file}"),
            "role": "coder_be",
            "files": [file],
            "depends_on": []
        }],
        "estimated_complexity": 2,
        "affected_files": [file],
        "risks": [],
        "confidence": confidence,
        "title": "Plan created",
        "subtitle": "One step",
        "reasoning": "{}"
    })
}

/// Final-summary JSON a tool-looping agent ends with.
pub fn final_summary(title: &str, confidence: f64) -> String {
    serde_json::json!({
        "title": title,
        "subtitle": "done",
        "reasoning": "{}",
        "confidence": confidence
    })
    .to_string()
}
