//! Durable per-task event log.
//!
//! The log is the replay side of the event bus: the bus persists every
//! event here before broadcasting, and reconnecting subscribers read
//! `since` to catch up before switching to live delivery.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::event_bus::TaskEvent;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("failed to append event: {0}")]
    Append(String),

    #[error("failed to query events: {0}")]
    Query(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persistence interface for task events.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event. `(task_id, seq)` is unique; re-appending the
    /// same pair is an error at the storage layer.
    async fn append(&self, event: &TaskEvent) -> Result<(), EventLogError>;

    /// Events for a task with `seq > after`, ascending.
    async fn since(&self, task_id: Uuid, after: Option<u64>) -> Result<Vec<TaskEvent>, EventLogError>;

    /// Highest sequence recorded for a task.
    async fn latest_seq(&self, task_id: Uuid) -> Result<Option<u64>, EventLogError>;
}

/// In-memory event log for tests.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    events: RwLock<Vec<TaskEvent>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, event: &TaskEvent) -> Result<(), EventLogError> {
        let mut events = self.events.write().await;
        if events
            .iter()
            .any(|e| e.task_id == event.task_id && e.seq == event.seq)
        {
            return Err(EventLogError::Append(format!(
                "duplicate event ({}, {})",
                event.task_id, event.seq
            )));
        }
        events.push(event.clone());
        Ok(())
    }

    async fn since(&self, task_id: Uuid, after: Option<u64>) -> Result<Vec<TaskEvent>, EventLogError> {
        let events = self.events.read().await;
        let mut result: Vec<TaskEvent> = events
            .iter()
            .filter(|e| e.task_id == task_id && after.is_none_or(|a| e.seq > a))
            .cloned()
            .collect();
        result.sort_by_key(|e| e.seq);
        Ok(result)
    }

    async fn latest_seq(&self, task_id: Uuid) -> Result<Option<u64>, EventLogError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.task_id == task_id)
            .map(|e| e.seq)
            .max())
    }
}
