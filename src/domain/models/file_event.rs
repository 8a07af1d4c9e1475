//! Verified filesystem effect model.
//!
//! A `VerifiedFileEvent` is only ever constructed by the reality
//! verifier, after the on-disk state has been checked against the
//! effect a tool reported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of filesystem effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Create,
    Update,
    Delete,
}

impl FileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "update" | "modify" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Closed set of quality check names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCheck {
    FileExists,
    SizeMatches,
    HashMatches,
    NonEmpty,
    SyntaxValid,
    SubstantiveBody,
}

impl QualityCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileExists => "file_exists",
            Self::SizeMatches => "size_matches",
            Self::HashMatches => "hash_matches",
            Self::NonEmpty => "non_empty",
            Self::SyntaxValid => "syntax_valid",
            Self::SubstantiveBody => "substantive_body",
        }
    }
}

/// A confirmed filesystem side effect attributable to a task and step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedFileEvent {
    pub id: Uuid,
    pub task_id: Uuid,
    pub step: u32,
    /// Repo-relative path
    pub path: String,
    pub action: FileAction,
    /// Size on disk after the effect (0 for delete)
    pub byte_size: u64,
    pub checks_passed: Vec<QualityCheck>,
    pub warnings: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

impl VerifiedFileEvent {
    pub fn new(
        task_id: Uuid,
        step: u32,
        path: impl Into<String>,
        action: FileAction,
        byte_size: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            step,
            path: path.into(),
            action,
            byte_size,
            checks_passed: Vec::new(),
            warnings: Vec::new(),
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip() {
        for action in [FileAction::Create, FileAction::Update, FileAction::Delete] {
            assert_eq!(FileAction::from_str(action.as_str()), Some(action));
        }
        // Legacy alias from older planner outputs
        assert_eq!(FileAction::from_str("modify"), Some(FileAction::Update));
    }

    #[test]
    fn test_delete_has_zero_size() {
        let event = VerifiedFileEvent::new(
            Uuid::new_v4(),
            2,
            "src/old_module.rs",
            FileAction::Delete,
            0,
        );
        assert_eq!(event.byte_size, 0);
        assert!(event.checks_passed.is_empty());
    }
}
