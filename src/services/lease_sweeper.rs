//! Lease sweeper.
//!
//! A worker's claim on a task is maintained by heartbeats. This
//! background loop scans for tasks in a leased status whose heartbeat
//! has gone stale and fails them with `lease_expired`. A reclaimed
//! lease never spawns a fix child, and already-verified file effects
//! are retained.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainResult, ErrorKind};
use crate::domain::models::TaskStatus;
use crate::domain::ports::{Clock, TaskStore};

use super::event_bus::{EventBus, EventPayload};

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct LeaseSweeperConfig {
    /// Scan period.
    pub period: Duration,
    /// Lease timeout; a heartbeat older than this is expired.
    pub lease: Duration,
}

impl Default for LeaseSweeperConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(15),
            lease: Duration::from_secs(45),
        }
    }
}

/// Reclaims tasks whose worker has vanished.
pub struct LeaseSweeper {
    tasks: Arc<dyn TaskStore>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: LeaseSweeperConfig,
}

impl LeaseSweeper {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: LeaseSweeperConfig,
    ) -> Self {
        Self {
            tasks,
            bus,
            clock,
            config,
        }
    }

    /// Run until shutdown.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(lease_secs = self.config.lease.as_secs(), "lease sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("lease sweeper shutting down");
                    break;
                }
                _ = interval.tick() => {}
            }

            if let Err(e) = self.sweep().await {
                tracing::warn!(error = %e, "lease sweep failed");
            }
        }
    }

    /// One scan: fail every task whose lease has expired.
    pub async fn sweep(&self) -> DomainResult<usize> {
        let cutoff = self.clock.now()
            - chrono::Duration::from_std(self.config.lease).unwrap_or(chrono::Duration::zero());

        let expired = self.tasks.expired_leases(cutoff).await?;
        let mut reclaimed = 0;

        for mut task in expired {
            let expected = task.status;
            let message = format!(
                "lease expired: no heartbeat since {}",
                task.heartbeat_at.to_rfc3339()
            );

            if task.fail(ErrorKind::LeaseExpired, message.clone()).is_err() {
                continue;
            }

            // The owning worker may have committed in the meantime; it wins.
            match self.tasks.update_expecting(&task, expected).await {
                Ok(()) => {
                    tracing::warn!(task_id = %task.id, status = %expected, "reclaimed expired lease");
                    self.bus
                        .publish(task.id, EventPayload::Status { status: TaskStatus::Failed })
                        .await;
                    self.bus
                        .publish(
                            task.id,
                            EventPayload::Error { kind: ErrorKind::LeaseExpired, message },
                        )
                        .await;
                    reclaimed += 1;
                }
                Err(e) => {
                    tracing::debug!(task_id = %task.id, error = %e, "lease reclaim lost the race");
                }
            }
        }

        Ok(reclaimed)
    }
}
