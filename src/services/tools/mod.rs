//! Tool registry and contract.
//!
//! Tools are named capabilities an agent can request. Each declares a
//! JSON-schema parameter descriptor and, on execution, reports its
//! intended filesystem side effects so the reality verifier knows what
//! to check. The registry is assembled once at process start through
//! `ToolRegistryBuilder`; there is no way to register a tool after
//! `build()`.

mod command;
mod fs_tools;

pub use command::RunCommandTool;
pub use fs_tools::{DeleteFileTool, EditFileTool, ListFilesTool, ReadFileTool, WriteFileTool};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{FileAction, ToolErrorKind, ToolOutcome};
use crate::domain::ports::ToolDescriptor;

/// Broad classification used to pick the invocation timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Reads or writes files; short timeout.
    FileOp,
    /// Runs a subprocess; long timeout.
    Command,
}

/// An intended filesystem effect, declared by a tool for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct SideEffect {
    /// Repo-relative path
    pub path: String,
    pub action: FileAction,
    /// Bytes the tool claims are on disk after the effect (0 for delete).
    pub claimed_size: u64,
    /// SHA-256 of the content the tool claims to have written.
    pub claimed_hash: Option<String>,
}

/// Result of executing a tool, before verification.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub outcome: ToolOutcome,
    pub side_effects: Vec<SideEffect>,
}

impl ToolOutput {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            outcome: ToolOutcome::ok(result),
            side_effects: Vec::new(),
        }
    }

    pub fn err(kind: ToolErrorKind, detail: impl Into<String>) -> Self {
        Self {
            outcome: ToolOutcome::err(kind, detail),
            side_effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: SideEffect) -> Self {
        self.side_effects.push(effect);
        self
    }
}

/// Execution context handed to every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Absolute root of the target repository.
    pub repo_root: PathBuf,
    pub cancel: CancellationToken,
}

/// A named capability available to agents.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema for the arguments object.
    fn parameters(&self) -> Value;

    fn kind(&self) -> ToolKind;

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> ToolOutput;
}

/// Builder for the tool registry. Consumed by `build()`, after which the
/// tool set is fixed.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.name(), tool);
        self
    }

    /// Register the built-in tool set.
    pub fn with_builtin_tools(self) -> Self {
        self.register(Arc::new(WriteFileTool))
            .register(Arc::new(EditFileTool))
            .register(Arc::new(DeleteFileTool))
            .register(Arc::new(ReadFileTool))
            .register(Arc::new(ListFilesTool))
            .register(Arc::new(RunCommandTool::default()))
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

/// Immutable registry of tools, shared across the process.
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    /// Descriptors for the named subset, in the order given.
    /// Unknown names are skipped.
    pub fn descriptors(&self, names: &[&str]) -> Vec<ToolDescriptor> {
        names
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }
}

/// Resolve a repo-relative path, refusing anything that escapes the
/// repository root. The path need not exist yet, so this is a lexical
/// check: absolute paths are only accepted when already under the root,
/// and `..` components may not pop past it.
pub fn resolve_repo_path(repo_root: &Path, raw: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(raw);

    let relative = if candidate.is_absolute() {
        match candidate.strip_prefix(repo_root) {
            Ok(rest) => rest.to_path_buf(),
            Err(_) => return Err(format!("path escapes repository root: {raw}")),
        }
    } else {
        candidate.to_path_buf()
    };

    let mut depth: i64 = 0;
    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                depth += 1;
                normalized.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("path escapes repository root: {raw}"));
                }
                normalized.pop();
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("path escapes repository root: {raw}"));
            }
        }
    }

    Ok(repo_root.join(normalized))
}

/// Repo-relative rendering of a resolved path, for events and logs.
pub fn relative_path(repo_root: &Path, absolute: &Path) -> String {
    absolute
        .strip_prefix(repo_root)
        .unwrap_or(absolute)
        .to_string_lossy()
        .into_owned()
}

/// Pull a required string argument out of a JSON object.
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing required string argument '{key}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_path() {
        let root = Path::new("/srv/repo");
        let resolved = resolve_repo_path(root, "src/main.rs").unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/repo/src/main.rs"));
    }

    #[test]
    fn test_resolve_refuses_escape() {
        let root = Path::new("/srv/repo");
        assert!(resolve_repo_path(root, "../outside.txt").is_err());
        assert!(resolve_repo_path(root, "src/../../outside.txt").is_err());
        assert!(resolve_repo_path(root, "/etc/passwd").is_err());
    }

    #[test]
    fn test_resolve_allows_internal_dotdot() {
        let root = Path::new("/srv/repo");
        let resolved = resolve_repo_path(root, "src/../docs/README.md").unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/repo/docs/README.md"));
    }

    #[test]
    fn test_resolve_accepts_absolute_inside_root() {
        let root = Path::new("/srv/repo");
        let resolved = resolve_repo_path(root, "/srv/repo/src/lib.rs").unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/repo/src/lib.rs"));
    }

    #[test]
    fn test_registry_is_fixed_after_build() {
        let registry = ToolRegistryBuilder::new().with_builtin_tools().build();
        assert!(registry.get("write_file").is_some());
        assert!(registry.get("run_command").is_some());
        assert!(registry.get("no_such_tool").is_none());

        let descriptors = registry.descriptors(&["edit_file", "read_file"]);
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].name, "edit_file");
    }
}
