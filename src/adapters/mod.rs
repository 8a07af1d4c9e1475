//! Adapters implementing the domain ports over concrete technology.

pub mod http;
pub mod sqlite;
