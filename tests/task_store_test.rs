mod helpers;

use foreman::adapters::sqlite::{SqliteRepoStore, SqliteRunStore, SqliteTaskStore};
use foreman::domain::models::{AgentRole, AgentRun, Repository, Task, TaskStatus};
use foreman::domain::ports::{RepoStore, RunStore, TaskFilter, TaskStore};
use foreman::{DomainError, ErrorKind};
use uuid::Uuid;

use helpers::database::setup_test_db;

async fn setup() -> (sqlx::SqlitePool, SqliteTaskStore, Repository) {
    let pool = setup_test_db().await;
    let repos = SqliteRepoStore::new(pool.clone());
    let repo = Repository::new("store-test", "/srv/repos/store-test");
    repos.create(&repo).await.unwrap();
    (pool.clone(), SqliteTaskStore::new(pool), repo)
}

#[tokio::test]
async fn test_insert_and_get_round_trip() {
    let (_pool, store, repo) = setup().await;

    let task = Task::new(repo.id, "Round trip me");
    store.create(&task).await.unwrap();

    let loaded = store.get(task.id).await.unwrap().unwrap();
    assert_eq!(loaded, task);
}

#[tokio::test]
async fn test_get_missing_returns_none() {
    let (_pool, store, _repo) = setup().await;
    assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_expecting_detects_conflict() {
    let (_pool, store, repo) = setup().await;

    let mut task = Task::new(repo.id, "Contended task");
    store.create(&task).await.unwrap();

    // Writer A commits pending -> planning.
    let mut a = task.clone();
    a.transition_to(TaskStatus::Planning).unwrap();
    store.update_expecting(&a, TaskStatus::Pending).await.unwrap();

    // Writer B still expects pending and must lose.
    task.transition_to(TaskStatus::Paused).unwrap();
    let err = store
        .update_expecting(&task, TaskStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ConcurrencyConflict { .. }));

    // The store kept writer A's state.
    let current = store.get(task.id).await.unwrap().unwrap();
    assert_eq!(current.status, TaskStatus::Planning);
}

#[tokio::test]
async fn test_update_expecting_missing_task() {
    let (_pool, store, repo) = setup().await;

    let task = Task::new(repo.id, "Ghost");
    let err = store
        .update_expecting(&task, TaskStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::TaskNotFound(_)));
}

#[tokio::test]
async fn test_list_filters() {
    let (_pool, store, repo) = setup().await;

    let root = Task::new(repo.id, "root");
    store.create(&root).await.unwrap();

    let child = Task::new(repo.id, "child").with_parent(root.id);
    store.create(&child).await.unwrap();

    let mut failed = Task::new(repo.id, "failed one");
    failed.fail(ErrorKind::Internal, "boom").unwrap();
    store.create(&failed).await.unwrap();

    let pending = store
        .list(TaskFilter { status: Some(TaskStatus::Pending), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);

    let roots = store
        .list(TaskFilter { roots_only: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(roots.len(), 2); // root + failed

    let children = store.children(root.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, child.id);
}

#[tokio::test]
async fn test_heartbeat_and_expired_leases() {
    let (_pool, store, repo) = setup().await;

    let mut task = Task::new(repo.id, "leased work");
    task.transition_to(TaskStatus::Planning).unwrap();
    store.create(&task).await.unwrap();

    let stale_cutoff = chrono::Utc::now() - chrono::Duration::seconds(45);
    assert!(store.expired_leases(stale_cutoff).await.unwrap().is_empty());

    // Age the heartbeat past the cutoff.
    let old = chrono::Utc::now() - chrono::Duration::seconds(120);
    store.heartbeat(task.id, old).await.unwrap();

    let expired = store.expired_leases(stale_cutoff).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, task.id);
}

#[tokio::test]
async fn test_delete_cascades_to_descendants_and_runs() {
    let (_pool, store, repo) = setup().await;
    let runs = SqliteRunStore::new(_pool.clone());

    let root = Task::new(repo.id, "root");
    store.create(&root).await.unwrap();
    let child = Task::new(repo.id, "child").with_parent(root.id);
    store.create(&child).await.unwrap();
    let grandchild = Task::new(repo.id, "grandchild").with_parent(child.id);
    store.create(&grandchild).await.unwrap();

    let run = AgentRun::new(child.id, 0, AgentRole::CoderBackend);
    runs.append(&run).await.unwrap();

    store.delete_cascade(root.id).await.unwrap();

    assert!(store.get(root.id).await.unwrap().is_none());
    assert!(store.get(child.id).await.unwrap().is_none());
    assert!(store.get(grandchild.id).await.unwrap().is_none());
    assert!(runs.for_task(child.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_plan_round_trips_as_json() {
    use foreman::domain::models::{Plan, PlanStep};

    let (_pool, store, repo) = setup().await;

    let mut task = Task::new(repo.id, "planned work");
    task.plan = Some(Plan {
        summary: "two steps".to_string(),
        steps: vec![
            PlanStep {
                order: 0,
                description: "first".to_string(),
                role: AgentRole::CoderBackend,
                files: vec!["src/a.rs".to_string()],
                depends_on: vec![],
            },
            PlanStep {
                order: 1,
                description: "second".to_string(),
                role: AgentRole::Docs,
                files: vec!["README.md".to_string()],
                depends_on: vec![0],
            },
        ],
        estimated_complexity: 4,
        affected_files: vec!["src/a.rs".to_string(), "README.md".to_string()],
        risks: vec!["touches public API".to_string()],
    });
    store.create(&task).await.unwrap();

    let loaded = store.get(task.id).await.unwrap().unwrap();
    assert_eq!(loaded.plan, task.plan);
}

#[tokio::test]
async fn test_run_ordering() {
    let (pool, store, repo) = setup().await;
    let runs = SqliteRunStore::new(pool);

    let task = Task::new(repo.id, "ordered runs");
    store.create(&task).await.unwrap();

    for step in [1u32, 0, 2] {
        let run = AgentRun::new(task.id, step, AgentRole::Qa);
        runs.append(&run).await.unwrap();
    }

    let loaded = runs.for_task(task.id).await.unwrap();
    let steps: Vec<u32> = loaded.iter().map(|r| r.step).collect();
    assert_eq!(steps, vec![0, 1, 2]);

    assert_eq!(runs.count_for_step(task.id, 2).await.unwrap(), 1);
    assert_eq!(runs.count_for_step(task.id, 9).await.unwrap(), 0);
}
