mod helpers;

use std::sync::Arc;
use std::time::Duration;

use foreman::adapters::sqlite::{SqliteEventLog, SqliteTaskStore};
use foreman::domain::models::{Task, TaskStatus};
use foreman::domain::ports::{Clock, ManualClock, TaskStore};
use foreman::services::{EventBus, EventBusConfig, EventKind, LeaseSweeper, LeaseSweeperConfig};
use foreman::ErrorKind;
use uuid::Uuid;

use helpers::database::setup_test_db;

struct Fixture {
    pool: sqlx::SqlitePool,
    tasks: Arc<SqliteTaskStore>,
    bus: Arc<EventBus>,
    clock: Arc<ManualClock>,
    sweeper: LeaseSweeper,
    repo_id: Uuid,
}

async fn fixture() -> Fixture {
    let pool = setup_test_db().await;
    let tasks = Arc::new(SqliteTaskStore::new(pool.clone()));
    let bus = Arc::new(EventBus::new(
        EventBusConfig::default(),
        Arc::new(SqliteEventLog::new(pool.clone())),
    ));
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));

    let repo_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO repositories (id, name, path, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(repo_id.to_string())
    .bind("fixture")
    .bind("/tmp/fixture")
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&pool)
    .await
    .unwrap();

    let sweeper = LeaseSweeper::new(
        tasks.clone(),
        bus.clone(),
        clock.clone(),
        LeaseSweeperConfig {
            period: Duration::from_secs(15),
            lease: Duration::from_secs(45),
        },
    );

    Fixture {
        pool,
        tasks,
        bus,
        clock,
        sweeper,
        repo_id,
    }
}

async fn executing_task(f: &Fixture) -> Task {
    let mut task = Task::new(f.repo_id, "long-running work");
    task.transition_to(TaskStatus::Planning).unwrap();
    task.transition_to(TaskStatus::Executing).unwrap();
    task.heartbeat_at = f.clock.now();
    f.tasks.create(&task).await.unwrap();
    task
}

#[tokio::test]
async fn test_fresh_heartbeat_not_reclaimed() {
    let f = fixture().await;
    let task = executing_task(&f).await;

    let reclaimed = f.sweeper.sweep().await.unwrap();
    assert_eq!(reclaimed, 0);

    let current = f.tasks.get(task.id).await.unwrap().unwrap();
    assert_eq!(current.status, TaskStatus::Executing);
}

#[tokio::test]
async fn test_expired_lease_reclaimed() {
    let f = fixture().await;
    let task = executing_task(&f).await;

    f.clock.advance(chrono::Duration::seconds(60));
    let reclaimed = f.sweeper.sweep().await.unwrap();
    assert_eq!(reclaimed, 1);

    let failed = f.tasks.get(task.id).await.unwrap().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error_kind, Some(ErrorKind::LeaseExpired));

    // A reclaimed lease never spawns a fix child.
    assert!(f.tasks.children(task.id).await.unwrap().is_empty());

    // Status and error events were published for the stream.
    let events = f.bus.replay(task.id, None).await.unwrap();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Status, EventKind::Error]);
}

#[tokio::test]
async fn test_unleased_statuses_ignored() {
    let f = fixture().await;

    // Pending, paused, and plan_review tasks hold no lease.
    let pending = Task::new(f.repo_id, "still queued");
    f.tasks.create(&pending).await.unwrap();

    let mut paused = Task::new(f.repo_id, "paused work");
    paused.transition_to(TaskStatus::Paused).unwrap();
    f.tasks.create(&paused).await.unwrap();

    let mut review = Task::new(f.repo_id, "awaiting approval");
    review.transition_to(TaskStatus::Planning).unwrap();
    review.transition_to(TaskStatus::PlanReview).unwrap();
    f.tasks.create(&review).await.unwrap();

    f.clock.advance(chrono::Duration::hours(2));
    let reclaimed = f.sweeper.sweep().await.unwrap();
    assert_eq!(reclaimed, 0);
}

#[tokio::test]
async fn test_verified_events_retained_after_reclaim() {
    use foreman::adapters::sqlite::SqliteFileEventStore;
    use foreman::domain::models::{FileAction, VerifiedFileEvent};
    use foreman::domain::ports::FileEventStore;

    let f = fixture().await;
    let task = executing_task(&f).await;

    // A verified write happened in step 2 before the worker vanished.
    let store = SqliteFileEventStore::new(f.pool.clone());
    let event = VerifiedFileEvent::new(task.id, 2, "src/half_done.rs", FileAction::Create, 128);
    store.append(&event).await.unwrap();

    f.clock.advance(chrono::Duration::seconds(60));
    f.sweeper.sweep().await.unwrap();

    // No rollback: the event (and the file effect it certifies) remain.
    let events = store.for_task(task.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].path, "src/half_done.rs");
}
