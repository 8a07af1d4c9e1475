//! Infrastructure: concrete clients and process-level plumbing.

pub mod config;
pub mod llm;
pub mod logging;
