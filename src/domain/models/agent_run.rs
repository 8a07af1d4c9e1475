//! Agent run and tool invocation models.
//!
//! Every agent action is recorded with both a user-facing explanation
//! and the technical reasoning behind it, forming the audit trail that
//! feeds the per-task event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::task::AgentRole;

/// Why a tool invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Resolved path escaped the repository root
    PathEscape,
    /// Command matched the danger blocklist
    UnsafeCommand,
    /// Tool reported success but the filesystem disagrees
    RealityMismatch,
    /// Tool exceeded its time budget
    Timeout,
    /// Target file or tool does not exist
    NotFound,
    /// Arguments failed schema or semantic validation
    InvalidArgs,
    /// Underlying I/O failure
    Io,
    /// Invocation was cancelled at a checkpoint
    Cancelled,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PathEscape => "path_escape",
            Self::UnsafeCommand => "unsafe_command",
            Self::RealityMismatch => "reality_mismatch",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::InvalidArgs => "invalid_args",
            Self::Io => "io",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok { result: String },
    Err { kind: ToolErrorKind, detail: String },
}

impl ToolOutcome {
    pub fn ok(result: impl Into<String>) -> Self {
        Self::Ok { result: result.into() }
    }

    pub fn err(kind: ToolErrorKind, detail: impl Into<String>) -> Self {
        Self::Err { kind, detail: detail.into() }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match self {
            Self::Ok { .. } => None,
            Self::Err { kind, .. } => Some(*kind),
        }
    }
}

/// One call by an agent to a named capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: Uuid,
    /// Name of the tool that was called
    pub tool: String,
    /// Arguments as a JSON object
    pub args: Value,
    pub outcome: ToolOutcome,
    pub duration_ms: u64,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, args: Value, outcome: ToolOutcome, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool: tool.into(),
            args,
            outcome,
            duration_ms,
        }
    }
}

/// One invocation of an agent during a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: Uuid,
    pub task_id: Uuid,
    /// Plan step index this run belongs to (0 for planning)
    pub step: u32,
    pub role: AgentRole,
    /// Short, user-facing header
    pub title: String,
    /// User-facing explanation of what the action means
    pub subtitle: String,
    /// Opaque technical reasoning, possibly JSON
    pub reasoning: String,
    /// Tool invocations performed, in order
    pub invocations: Vec<ToolInvocation>,
    /// Self-reported confidence in [0, 1]
    pub confidence: f64,
    /// True when confidence fell below the review threshold
    pub requires_review: bool,
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl AgentRun {
    pub fn new(task_id: Uuid, step: u32, role: AgentRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            step,
            role,
            title: String::new(),
            subtitle: String::new(),
            reasoning: String::new(),
            invocations: Vec::new(),
            confidence: 1.0,
            requires_review: false,
            duration_ms: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_outcome_tagging() {
        let ok = ToolOutcome::ok("written");
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["result"], "written");

        let err = ToolOutcome::err(ToolErrorKind::RealityMismatch, "file missing after write");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "err");
        assert_eq!(json["kind"], "reality_mismatch");
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = ToolOutcome::ok("fine");
        assert!(ok.is_ok());
        assert!(ok.error_kind().is_none());

        let err = ToolOutcome::err(ToolErrorKind::PathEscape, "../../etc/passwd");
        assert!(!err.is_ok());
        assert_eq!(err.error_kind(), Some(ToolErrorKind::PathEscape));
    }

    #[test]
    fn test_invocation_round_trip() {
        let inv = ToolInvocation::new(
            "write_file",
            json!({"path": "src/lib.rs", "content": "pub fn x() {}"}),
            ToolOutcome::ok("12 bytes"),
            42,
        );
        let encoded = serde_json::to_string(&inv).unwrap();
        let decoded: ToolInvocation = serde_json::from_str(&encoded).unwrap();
        assert_eq!(inv, decoded);
    }
}
