//! Built-in filesystem tools.
//!
//! Every path argument is resolved against the repository root and
//! refused if it escapes. Write-shaped tools declare their intended
//! side effects (with claimed size and content hash) for the reality
//! verifier; read-shaped tools declare none.

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::domain::models::{FileAction, ToolErrorKind};

use super::{relative_path, resolve_repo_path, str_arg, SideEffect, Tool, ToolContext, ToolKind, ToolOutput};

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Write a file, creating parent directories as needed.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write a complete file to the repository, creating parent directories. \
         Overwrites the file if it already exists."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Repo-relative file path" },
                "content": { "type": "string", "description": "Full file content" }
            },
            "required": ["path", "content"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::FileOp
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> ToolOutput {
        let (path, content) = match (str_arg(args, "path"), str_arg(args, "content")) {
            (Ok(p), Ok(c)) => (p, c),
            (Err(e), _) | (_, Err(e)) => return ToolOutput::err(ToolErrorKind::InvalidArgs, e),
        };

        let absolute = match resolve_repo_path(&ctx.repo_root, path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(ToolErrorKind::PathEscape, e),
        };

        let action = if absolute.exists() {
            FileAction::Update
        } else {
            FileAction::Create
        };

        if let Some(parent) = absolute.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(ToolErrorKind::Io, e.to_string());
            }
        }

        if let Err(e) = tokio::fs::write(&absolute, content).await {
            return ToolOutput::err(ToolErrorKind::Io, e.to_string());
        }

        let rel = relative_path(&ctx.repo_root, &absolute);
        ToolOutput::ok(format!(
            "wrote {} bytes to {rel}",
            content.len()
        ))
        .with_effect(SideEffect {
            path: rel,
            action,
            claimed_size: content.len() as u64,
            claimed_hash: Some(sha256_hex(content)),
        })
    }
}

/// Replace a snippet inside an existing file.
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Replace an exact snippet in an existing file. The original snippet \
         must appear in the file; occurrence selects which match to replace \
         (1-indexed, 0 replaces all)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Repo-relative file path" },
                "original": { "type": "string", "description": "Exact text to replace" },
                "replacement": { "type": "string", "description": "Replacement text" },
                "occurrence": {
                    "type": "integer",
                    "description": "Which occurrence to replace (1-indexed, 0 = all)",
                    "default": 1
                }
            },
            "required": ["path", "original", "replacement"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::FileOp
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> ToolOutput {
        let path = match str_arg(args, "path") {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(ToolErrorKind::InvalidArgs, e),
        };
        let original = match str_arg(args, "original") {
            Ok(o) => o,
            Err(e) => return ToolOutput::err(ToolErrorKind::InvalidArgs, e),
        };
        let replacement = match str_arg(args, "replacement") {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(ToolErrorKind::InvalidArgs, e),
        };
        let occurrence = args.get("occurrence").and_then(Value::as_u64).unwrap_or(1);

        let absolute = match resolve_repo_path(&ctx.repo_root, path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(ToolErrorKind::PathEscape, e),
        };

        let current = match tokio::fs::read_to_string(&absolute).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolOutput::err(
                    ToolErrorKind::NotFound,
                    format!("cannot edit non-existent file: {path}"),
                );
            }
            Err(e) => return ToolOutput::err(ToolErrorKind::Io, e.to_string()),
        };

        if !current.contains(original) {
            return ToolOutput::err(
                ToolErrorKind::InvalidArgs,
                format!("original snippet not found in {path}"),
            );
        }

        let modified = if occurrence == 0 {
            current.replace(original, replacement)
        } else {
            let mut idx = None;
            let mut from = 0;
            for _ in 0..occurrence {
                match current[from..].find(original) {
                    Some(offset) => {
                        idx = Some(from + offset);
                        from = from + offset + original.len();
                    }
                    None => {
                        return ToolOutput::err(
                            ToolErrorKind::InvalidArgs,
                            format!("occurrence {occurrence} of snippet not found in {path}"),
                        );
                    }
                }
            }
            let idx = idx.unwrap_or(0);
            format!(
                "{}{}{}",
                &current[..idx],
                replacement,
                &current[idx + original.len()..]
            )
        };

        if let Err(e) = tokio::fs::write(&absolute, &modified).await {
            return ToolOutput::err(ToolErrorKind::Io, e.to_string());
        }

        let rel = relative_path(&ctx.repo_root, &absolute);
        ToolOutput::ok(format!(
            "replaced {} bytes with {} bytes in {rel}",
            original.len(),
            replacement.len()
        ))
        .with_effect(SideEffect {
            path: rel,
            action: FileAction::Update,
            claimed_size: modified.len() as u64,
            claimed_hash: Some(sha256_hex(&modified)),
        })
    }
}

/// Delete a file.
pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &'static str {
        "delete_file"
    }

    fn description(&self) -> &'static str {
        "Delete a single file from the repository."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Repo-relative file path" }
            },
            "required": ["path"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::FileOp
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> ToolOutput {
        let path = match str_arg(args, "path") {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(ToolErrorKind::InvalidArgs, e),
        };

        let absolute = match resolve_repo_path(&ctx.repo_root, path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(ToolErrorKind::PathEscape, e),
        };

        match tokio::fs::remove_file(&absolute).await {
            Ok(()) => {
                let rel = relative_path(&ctx.repo_root, &absolute);
                ToolOutput::ok(format!("deleted {rel}")).with_effect(SideEffect {
                    path: rel,
                    action: FileAction::Delete,
                    claimed_size: 0,
                    claimed_hash: None,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ToolOutput::err(ToolErrorKind::NotFound, format!("file does not exist: {path}"))
            }
            Err(e) => ToolOutput::err(ToolErrorKind::Io, e.to_string()),
        }
    }
}

/// Read a file's content.
pub struct ReadFileTool;

const READ_LIMIT: usize = 64 * 1024;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file from the repository. Output is truncated at 64 KiB."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Repo-relative file path" }
            },
            "required": ["path"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::FileOp
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> ToolOutput {
        let path = match str_arg(args, "path") {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(ToolErrorKind::InvalidArgs, e),
        };

        let absolute = match resolve_repo_path(&ctx.repo_root, path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(ToolErrorKind::PathEscape, e),
        };

        match tokio::fs::read_to_string(&absolute).await {
            Ok(mut content) => {
                if content.len() > READ_LIMIT {
                    content.truncate(READ_LIMIT);
                    content.push_str("\n... [truncated]");
                }
                ToolOutput::ok(content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ToolOutput::err(ToolErrorKind::NotFound, format!("file does not exist: {path}"))
            }
            Err(e) => ToolOutput::err(ToolErrorKind::Io, e.to_string()),
        }
    }
}

/// List files under a directory.
pub struct ListFilesTool;

const LIST_LIMIT: usize = 500;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &'static str {
        "list_files"
    }

    fn description(&self) -> &'static str {
        "List files under a repository directory, recursively, skipping \
         hidden entries and dependency/build directories."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Repo-relative directory (default: repository root)",
                    "default": "."
                }
            },
            "required": []
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::FileOp
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> ToolOutput {
        let path = args.get("path").and_then(Value::as_str).unwrap_or(".");

        let absolute = match resolve_repo_path(&ctx.repo_root, path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(ToolErrorKind::PathEscape, e),
        };

        let root = ctx.repo_root.clone();
        let listing = tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            // depth 0 is the walk root itself; only filter below it.
            for entry in walkdir::WalkDir::new(&absolute)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    e.depth() == 0 || !is_ignored(e.file_name().to_string_lossy().as_ref())
                })
            {
                let entry = match entry {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                if entry.file_type().is_file() {
                    entries.push(relative_path(&root, entry.path()));
                    if entries.len() >= LIST_LIMIT {
                        break;
                    }
                }
            }
            entries
        })
        .await;

        match listing {
            Ok(entries) => ToolOutput::ok(entries.join("\n")),
            Err(e) => ToolOutput::err(ToolErrorKind::Io, e.to_string()),
        }
    }
}

fn is_ignored(name: &str) -> bool {
    name.starts_with('.') && name != "."
        || matches!(
            name,
            "node_modules" | "target" | "__pycache__" | "venv" | "dist" | "build"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn ctx(dir: &TempDir) -> ToolContext {
        ToolContext {
            repo_root: dir.path().to_path_buf(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let out = WriteFileTool
            .execute(
                &json!({"path": "src/deep/module.rs", "content": "pub fn f() {}"}),
                &ctx(&dir),
            )
            .await;

        assert!(out.outcome.is_ok());
        assert_eq!(out.side_effects.len(), 1);
        assert_eq!(out.side_effects[0].action, FileAction::Create);
        assert_eq!(out.side_effects[0].path, "src/deep/module.rs");
        assert!(dir.path().join("src/deep/module.rs").exists());
    }

    #[tokio::test]
    async fn test_write_existing_is_update() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old").unwrap();

        let out = WriteFileTool
            .execute(&json!({"path": "a.txt", "content": "new"}), &ctx(&dir))
            .await;
        assert_eq!(out.side_effects[0].action, FileAction::Update);
    }

    #[tokio::test]
    async fn test_write_refuses_escape() {
        let dir = TempDir::new().unwrap();
        let out = WriteFileTool
            .execute(&json!({"path": "../evil.txt", "content": "x"}), &ctx(&dir))
            .await;
        assert_eq!(out.outcome.error_kind(), Some(ToolErrorKind::PathEscape));
        assert!(out.side_effects.is_empty());
    }

    #[tokio::test]
    async fn test_edit_replaces_occurrence() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), "aaa bbb aaa").unwrap();

        let out = EditFileTool
            .execute(
                &json!({"path": "f.txt", "original": "aaa", "replacement": "ccc", "occurrence": 2}),
                &ctx(&dir),
            )
            .await;
        assert!(out.outcome.is_ok());
        let content = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(content, "aaa bbb ccc");
    }

    #[tokio::test]
    async fn test_edit_missing_snippet() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), "hello").unwrap();

        let out = EditFileTool
            .execute(
                &json!({"path": "f.txt", "original": "absent", "replacement": "x"}),
                &ctx(&dir),
            )
            .await;
        assert_eq!(out.outcome.error_kind(), Some(ToolErrorKind::InvalidArgs));
    }

    #[tokio::test]
    async fn test_delete_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("gone.txt"), "bye").unwrap();

        let out = DeleteFileTool
            .execute(&json!({"path": "gone.txt"}), &ctx(&dir))
            .await;
        assert!(out.outcome.is_ok());
        assert_eq!(out.side_effects[0].action, FileAction::Delete);
        assert!(!dir.path().join("gone.txt").exists());
    }

    #[tokio::test]
    async fn test_read_and_list() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub mod x;").unwrap();

        let read = ReadFileTool
            .execute(&json!({"path": "src/lib.rs"}), &ctx(&dir))
            .await;
        assert!(matches!(
            read.outcome,
            crate::domain::models::ToolOutcome::Ok { ref result } if result == "pub mod x;"
        ));

        let list = ListFilesTool.execute(&json!({}), &ctx(&dir)).await;
        match list.outcome {
            crate::domain::models::ToolOutcome::Ok { result } => {
                assert!(result.contains("src/lib.rs"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
