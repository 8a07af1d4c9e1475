//! Service layer: orchestration logic over the domain ports.

pub mod agent_runtime;
pub mod event_bus;
pub mod event_log;
pub mod lease_sweeper;
pub mod prompts;
pub mod scheduler;
pub mod task_engine;
pub mod tools;
pub mod verifier;

pub use agent_runtime::{AgentFailure, AgentOutcome, AgentRuntime, AgentRuntimeConfig, QaVerdict};
pub use event_bus::{EventBus, EventBusConfig, EventKind, EventPayload, TaskEvent};
pub use event_log::{EventLog, EventLogError, InMemoryEventLog};
pub use lease_sweeper::{LeaseSweeper, LeaseSweeperConfig};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use task_engine::{EngineExit, TaskEngine};
pub use tools::{ToolContext, ToolRegistry, ToolRegistryBuilder};
pub use verifier::{RealityVerifier, VerifiedInvocation, VerifierTimeouts};
