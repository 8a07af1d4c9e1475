//! Application configuration model.
//!
//! All tunables live here; the loader in `infrastructure::config`
//! merges defaults, project YAML, local overrides, and environment
//! variables into this tree.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker pool size: how many tasks may execute concurrently.
    pub max_workers: usize,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub engine: EngineConfig,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: 4,
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            engine: EngineConfig::default(),
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path (or `sqlite::memory:`)
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".foreman/foreman.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    /// SSE keep-alive interval in milliseconds.
    pub sse_keepalive_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8780,
            enable_cors: true,
            sse_keepalive_ms: 15_000,
        }
    }
}

/// Policy knobs for the task engine and scheduler.
///
/// Thresholds and retry budgets are deliberately separate from the role
/// prompts; prompts are data, policy lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Plans at or above this confidence skip human review.
    pub auto_approve_confidence: f64,
    /// Agent outcomes below this confidence are flagged for review.
    pub review_confidence: f64,
    /// Fix children spawned per task before it fails.
    pub max_fix_spawns: u32,
    /// Depth bound on the fix-child chain.
    pub max_fix_depth: u32,
    /// Agent invocation retries per phase.
    pub max_agent_retries: u32,
    /// Iterations allowed inside one agent invocation.
    pub max_agent_iterations: u32,
    /// Coder re-prompts when declared files remain untouched.
    pub max_coder_reprompts: u32,
    /// Heartbeat period while a worker owns a task.
    pub heartbeat_secs: u64,
    /// Lease timeout; expiry triggers reclamation.
    pub lease_secs: u64,
    /// Lease sweeper scan period.
    pub sweeper_period_secs: u64,
    /// Scheduler frontier poll period.
    pub poll_period_secs: u64,
    /// Budget for one pipeline phase.
    pub phase_timeout_secs: u64,
    /// Budget for one agent iteration.
    pub agent_timeout_secs: u64,
    /// Budget for a file tool invocation.
    pub file_tool_timeout_secs: u64,
    /// Budget for a command tool invocation.
    pub command_tool_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_approve_confidence: 0.7,
            review_confidence: 0.7,
            max_fix_spawns: 3,
            max_fix_depth: 3,
            max_agent_retries: 1,
            max_agent_iterations: 8,
            max_coder_reprompts: 3,
            heartbeat_secs: 15,
            lease_secs: 45,
            sweeper_period_secs: 15,
            poll_period_secs: 2,
            phase_timeout_secs: 1200,
            agent_timeout_secs: 120,
            file_tool_timeout_secs: 60,
            command_tool_timeout_secs: 300,
        }
    }
}

impl EngineConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key; usually injected via FOREMAN_LLM__API_KEY.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.1,
            max_tokens: 8192,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of: trace, debug, info, warn, error
    pub level: String,
    /// One of: json, pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_recommendations() {
        let config = Config::default();
        assert_eq!(config.engine.auto_approve_confidence, 0.7);
        assert_eq!(config.engine.heartbeat_secs, 15);
        // Lease is three heartbeats
        assert_eq!(config.engine.lease_secs, 3 * config.engine.heartbeat_secs);
        assert_eq!(config.engine.max_agent_iterations, 8);
        assert_eq!(config.engine.phase_timeout_secs, 1200);
    }
}
