//! Registered repository model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A codebase that agents can operate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Absolute filesystem path, unique across registrations
    pub path: String,
    /// Detected project type (e.g. "rust", "python")
    pub project_type: Option<String>,
    /// Detected framework (e.g. "axum", "fastapi")
    pub framework: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            path: path.into(),
            project_type: None,
            framework: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("repository name cannot be empty".to_string());
        }
        if !std::path::Path::new(&self.path).is_absolute() {
            return Err(format!("repository path must be absolute: {}", self.path));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        let repo = Repository::new("demo", "/srv/repos/demo");
        assert!(repo.validate().is_ok());

        let repo = Repository::new("", "/srv/repos/demo");
        assert!(repo.validate().is_err());

        let repo = Repository::new("demo", "relative/path");
        assert!(repo.validate().is_err());
    }
}
