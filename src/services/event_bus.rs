//! Event bus: per-task sequenced state deltas.
//!
//! Topics are keyed by task id. Every event is assigned the next
//! sequence number for its task, persisted to the durable log, and then
//! broadcast to in-process subscribers. Within a topic events are
//! totally ordered; across topics no ordering is guaranteed. Delivery
//! to broadcast subscribers is at-least-once; consumers key idempotence
//! on `(task_id, seq)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::domain::errors::ErrorKind;
use crate::domain::models::{AgentRole, FileAction, TaskStatus};

use super::event_log::EventLog;

/// Kind discriminator carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    PlanReady,
    AgentLog,
    FileVerified,
    Complete,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::PlanReady => "plan_ready",
            Self::AgentLog => "agent_log",
            Self::FileVerified => "file_verified",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "status" => Some(Self::Status),
            "plan_ready" => Some(Self::PlanReady),
            "agent_log" => Some(Self::AgentLog),
            "file_verified" => Some(Self::FileVerified),
            "complete" => Some(Self::Complete),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Status {
        status: TaskStatus,
    },
    PlanReady {
        summary: String,
        step_count: u32,
        confidence: f64,
    },
    AgentLog {
        role: AgentRole,
        step: u32,
        title: String,
        subtitle: String,
        confidence: f64,
        requires_review: bool,
    },
    FileVerified {
        step: u32,
        path: String,
        action: FileAction,
        byte_size: u64,
        warnings: Vec<String>,
    },
    Complete,
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Status { .. } => EventKind::Status,
            Self::PlanReady { .. } => EventKind::PlanReady,
            Self::AgentLog { .. } => EventKind::AgentLog,
            Self::FileVerified { .. } => EventKind::FileVerified,
            Self::Complete => EventKind::Complete,
            Self::Error { .. } => EventKind::Error,
        }
    }
}

/// An event on a task's topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: Uuid,
    /// Monotonically increasing per task, assigned by the bus.
    pub seq: u64,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Configuration for the event bus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Capacity of the in-process broadcast channel.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { channel_capacity: 1024 }
    }
}

/// Central bus fanning task events to subscribers.
///
/// Two transports sit behind this one interface: the in-process
/// broadcast channel for live delivery, and the durable log for replay.
pub struct EventBus {
    sender: broadcast::Sender<TaskEvent>,
    /// Next sequence per task. Guarded across persist so a topic's
    /// commit order matches its sequence order.
    seqs: Mutex<HashMap<Uuid, u64>>,
    log: Arc<dyn EventLog>,
}

impl EventBus {
    pub fn new(config: EventBusConfig, log: Arc<dyn EventLog>) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self {
            sender,
            seqs: Mutex::new(HashMap::new()),
            log,
        }
    }

    /// Publish an event on a task's topic.
    ///
    /// The sequence is assigned under the lock and the event is
    /// persisted before it is broadcast, so replay-from-log followed by
    /// live delivery never skips a sequence.
    pub async fn publish(&self, task_id: Uuid, payload: EventPayload) -> TaskEvent {
        let mut seqs = self.seqs.lock().await;

        let next = match seqs.get(&task_id) {
            Some(&n) => n,
            None => {
                // Resume numbering across restarts.
                match self.log.latest_seq(task_id).await {
                    Ok(Some(latest)) => latest + 1,
                    Ok(None) => 0,
                    Err(e) => {
                        tracing::warn!(%task_id, error = %e, "failed to read latest sequence, starting at 0");
                        0
                    }
                }
            }
        };

        let event = TaskEvent {
            task_id,
            seq: next,
            kind: payload.kind(),
            timestamp: Utc::now(),
            payload,
        };

        if let Err(e) = self.log.append(&event).await {
            tracing::warn!(%task_id, seq = next, error = %e, "failed to persist event");
        }
        seqs.insert(task_id, next + 1);
        drop(seqs);

        // Ignore send errors: there may be no live subscribers.
        let _ = self.sender.send(event.clone());
        event
    }

    /// Subscribe to the live stream. Callers filter by task id.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Replay a task's events with `seq > after` from the durable log.
    pub async fn replay(
        &self,
        task_id: Uuid,
        after: Option<u64>,
    ) -> Result<Vec<TaskEvent>, super::event_log::EventLogError> {
        self.log.since(task_id, after).await
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::event_log::InMemoryEventLog;

    fn bus() -> EventBus {
        EventBus::new(EventBusConfig::default(), Arc::new(InMemoryEventLog::new()))
    }

    #[tokio::test]
    async fn test_per_task_sequence_assignment() {
        let bus = bus();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let e0 = bus
            .publish(a, EventPayload::Status { status: TaskStatus::Planning })
            .await;
        let e1 = bus
            .publish(a, EventPayload::Status { status: TaskStatus::Executing })
            .await;
        let other = bus
            .publish(b, EventPayload::Status { status: TaskStatus::Planning })
            .await;

        assert_eq!(e0.seq, 0);
        assert_eq!(e1.seq, 1);
        // Topics sequence independently.
        assert_eq!(other.seq, 0);
    }

    #[tokio::test]
    async fn test_persist_before_broadcast() {
        let bus = bus();
        let task_id = Uuid::new_v4();

        let mut rx = bus.subscribe();
        bus.publish(task_id, EventPayload::Complete).await;

        let live = rx.recv().await.unwrap();
        let replayed = bus.replay(task_id, None).await.unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0], live);
    }

    #[tokio::test]
    async fn test_replay_after_cursor() {
        let bus = bus();
        let task_id = Uuid::new_v4();

        for status in [TaskStatus::Planning, TaskStatus::Executing, TaskStatus::Testing] {
            bus.publish(task_id, EventPayload::Status { status }).await;
        }

        let tail = bus.replay(task_id, Some(0)).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].seq, 1);
        assert_eq!(tail[1].seq, 2);
    }

    #[tokio::test]
    async fn test_sequence_resumes_from_log() {
        let log = Arc::new(InMemoryEventLog::new());
        let first = EventBus::new(EventBusConfig::default(), log.clone());
        let task_id = Uuid::new_v4();

        first
            .publish(task_id, EventPayload::Status { status: TaskStatus::Planning })
            .await;
        first
            .publish(task_id, EventPayload::Status { status: TaskStatus::Executing })
            .await;
        drop(first);

        // A fresh bus over the same log continues the numbering.
        let second = EventBus::new(EventBusConfig::default(), log);
        let e = second.publish(task_id, EventPayload::Complete).await;
        assert_eq!(e.seq, 2);
    }

    #[test]
    fn test_kind_matches_payload() {
        assert_eq!(
            EventPayload::Status { status: TaskStatus::Pending }.kind(),
            EventKind::Status
        );
        assert_eq!(EventPayload::Complete.kind(), EventKind::Complete);
        assert_eq!(
            EventPayload::Error { kind: ErrorKind::Cancelled, message: String::new() }.kind(),
            EventKind::Error
        );
    }
}
