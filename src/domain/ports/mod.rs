//! Ports: interfaces the domain and services depend on, implemented by
//! adapters and infrastructure.

pub mod clock;
pub mod file_event_store;
pub mod generative;
pub mod repo_store;
pub mod run_store;
pub mod task_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use file_event_store::FileEventStore;
pub use generative::{
    GenerativeClient, GenerativeError, RequestedCall, ToolCallRequest, ToolCallResponse,
    ToolChoice, ToolDescriptor, TranscriptEntry,
};
pub use repo_store::RepoStore;
pub use run_store::RunStore;
pub use task_store::{TaskFilter, TaskStore};
