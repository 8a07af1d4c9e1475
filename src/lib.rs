//! Foreman - autonomous multi-agent task orchestrator.
//!
//! Accepts free-text engineering requests against registered
//! repositories, decomposes them into typed sub-task DAGs, drives each
//! through plan → execute → test → fix → document with role-specialized
//! generative agents, verifies every filesystem effect before
//! acknowledging it, and streams state deltas to subscribers.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::{DomainError, DomainResult, ErrorKind};
