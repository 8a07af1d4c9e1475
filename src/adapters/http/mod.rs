//! HTTP adapters: the command API and the event stream.

pub mod api;
pub mod stream;

pub use api::{ApiServer, ApiState};
