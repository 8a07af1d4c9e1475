mod helpers;

use std::collections::HashSet;
use std::sync::Arc;

use foreman::adapters::sqlite::{SqliteEventLog, SqliteRepoStore, SqliteTaskStore};
use foreman::domain::models::{Repository, Task, TaskStatus};
use foreman::domain::ports::{RepoStore, TaskStore};
use foreman::services::event_log::EventLog;
use foreman::services::{EventBus, EventBusConfig, EventPayload};
use uuid::Uuid;

use helpers::database::setup_test_db;

async fn setup() -> (Arc<EventBus>, Arc<SqliteEventLog>, Uuid) {
    let pool = setup_test_db().await;

    // Satisfy the task_events foreign key with a real task row.
    let repos = SqliteRepoStore::new(pool.clone());
    let repo = Repository::new("events", "/srv/repos/events");
    repos.create(&repo).await.unwrap();
    let tasks = SqliteTaskStore::new(pool.clone());
    let task = Task::new(repo.id, "event fixture");
    tasks.create(&task).await.unwrap();

    let log = Arc::new(SqliteEventLog::new(pool));
    let bus = Arc::new(EventBus::new(EventBusConfig::default(), log.clone()));
    (bus, log, task.id)
}

#[tokio::test]
async fn test_events_are_persisted_then_broadcast() {
    let (bus, log, task_id) = setup().await;
    let mut rx = bus.subscribe();

    bus.publish(task_id, EventPayload::Status { status: TaskStatus::Planning })
        .await;
    bus.publish(task_id, EventPayload::Complete).await;

    let live1 = rx.recv().await.unwrap();
    let live2 = rx.recv().await.unwrap();
    assert_eq!(live1.seq, 0);
    assert_eq!(live2.seq, 1);

    let stored = log.since(task_id, None).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0], live1);
    assert_eq!(stored[1], live2);
}

#[tokio::test]
async fn test_replay_then_live_has_no_gap() {
    let (bus, _log, task_id) = setup().await;

    bus.publish(task_id, EventPayload::Status { status: TaskStatus::Planning })
        .await;
    bus.publish(task_id, EventPayload::Status { status: TaskStatus::Executing })
        .await;

    // A reconnecting subscriber replays, then follows live.
    let mut rx = bus.subscribe();
    let replayed = bus.replay(task_id, None).await.unwrap();
    assert_eq!(replayed.len(), 2);

    bus.publish(task_id, EventPayload::Complete).await;
    let live = rx.recv().await.unwrap();
    assert_eq!(live.seq, 2);

    // Replay + live covers 0..=2 densely.
    let mut seqs: Vec<u64> = replayed.iter().map(|e| e.seq).collect();
    seqs.push(live.seq);
    assert_eq!(seqs, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_duplicate_delivery_is_idempotent_by_key() {
    let (bus, _log, task_id) = setup().await;

    bus.publish(task_id, EventPayload::Status { status: TaskStatus::Planning })
        .await;
    bus.publish(task_id, EventPayload::Complete).await;

    // At-least-once delivery: feed the same replay twice into a consumer
    // that keys on (task_id, seq). State is unchanged by the second pass.
    let replay1 = bus.replay(task_id, None).await.unwrap();
    let replay2 = bus.replay(task_id, None).await.unwrap();

    let mut seen: HashSet<(Uuid, u64)> = HashSet::new();
    let mut applied = 0;
    for event in replay1.iter().chain(replay2.iter()) {
        if seen.insert((event.task_id, event.seq)) {
            applied += 1;
        }
    }
    assert_eq!(applied, 2);
}

#[tokio::test]
async fn test_log_rejects_duplicate_sequence() {
    let (bus, log, task_id) = setup().await;

    let event = bus.publish(task_id, EventPayload::Complete).await;
    assert!(log.append(&event).await.is_err());
}

#[tokio::test]
async fn test_timestamps_monotonic_within_topic() {
    let (bus, _log, task_id) = setup().await;

    for status in [TaskStatus::Planning, TaskStatus::Executing, TaskStatus::Testing] {
        bus.publish(task_id, EventPayload::Status { status }).await;
    }

    let events = bus.replay(task_id, None).await.unwrap();
    for pair in events.windows(2) {
        assert!(pair[0].seq < pair[1].seq);
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}
