//! Role prompts and output schemas.
//!
//! Prompts are data. Policy (confidence thresholds, retry budgets,
//! iteration caps) lives in `EngineConfig`, never in these strings.

use serde_json::{json, Value};

use crate::domain::models::AgentRole;

pub const PLANNER_SYSTEM: &str = "\
You are a senior technical planner. Given an engineering request and a \
repository, decompose the work into the smallest ordered set of steps \
that fully satisfies the request.

Rules:
- Steps are 0-indexed with unique `order` values.
- `depends_on` lists earlier step orders only; never reference a later step.
- Assign `coder_be`, `coder_fe`, or `coder_infra` to steps that create or \
modify code. Any step that creates a new file MUST be a coder step.
- Assign `docs` only to steps that edit existing documentation files.
- List every file each step will touch, and aggregate them in `affected_files`.
- Estimate complexity from 1 (trivial) to 10 (very complex).
- Report your confidence in the plan between 0.0 and 1.0.";

pub const CODER_SYSTEM: &str = "\
You are a senior software engineer executing one step of an approved plan. \
Make the change described in the step using the file tools, then finish \
with a JSON summary.

Rules:
- You MUST physically write your changes with the tools; claiming a change \
without a tool call accomplishes nothing.
- Touch every file the step declares. Keep changes minimal and complete.
- When you are done, reply with JSON: \
{\"title\": ..., \"subtitle\": ..., \"reasoning\": ..., \"confidence\": 0.0-1.0}.";

pub const QA_SYSTEM: &str = "\
You are a quality engineer. Run the repository's test suite with \
run_command, read the output carefully, and report what actually happened.

Rules:
- Exit code 0 with output showing that zero tests were collected or run \
means NO tests executed; that is not a pass.
- On failure, include the decisive diagnostic excerpt in your reasoning.
- When you are done, reply with JSON: \
{\"title\": ..., \"subtitle\": ..., \"reasoning\": ..., \"confidence\": 0.0-1.0}.";

pub const DOCS_SYSTEM: &str = "\
You are a technical writer. Update existing documentation to reflect the \
changes just made. You may only edit files that already exist; never \
create new ones.

When you are done, reply with JSON: \
{\"title\": ..., \"subtitle\": ..., \"reasoning\": ..., \"confidence\": 0.0-1.0}.";

pub fn system_prompt(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Planner => PLANNER_SYSTEM,
        AgentRole::CoderBackend | AgentRole::CoderFrontend | AgentRole::CoderInfra => CODER_SYSTEM,
        AgentRole::Qa => QA_SYSTEM,
        AgentRole::Docs => DOCS_SYSTEM,
    }
}

/// Tools each role may call.
pub fn allowed_tools(role: AgentRole) -> &'static [&'static str] {
    match role {
        AgentRole::Planner => &["read_file", "list_files"],
        AgentRole::CoderBackend | AgentRole::CoderFrontend | AgentRole::CoderInfra => &[
            "read_file",
            "list_files",
            "write_file",
            "edit_file",
            "delete_file",
            "run_command",
        ],
        AgentRole::Qa => &["run_command", "read_file", "list_files"],
        // Docs edits existing files only; no create, no delete.
        AgentRole::Docs => &["edit_file", "read_file", "list_files"],
    }
}

/// JSON schema for the planner's structured output.
pub fn plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "order": { "type": "integer", "minimum": 0 },
                        "description": { "type": "string" },
                        "role": {
                            "type": "string",
                            "enum": ["coder_be", "coder_fe", "coder_infra", "qa", "docs"]
                        },
                        "files": { "type": "array", "items": { "type": "string" } },
                        "depends_on": { "type": "array", "items": { "type": "integer" } }
                    },
                    "required": ["order", "description", "role"]
                }
            },
            "estimated_complexity": { "type": "integer", "minimum": 1, "maximum": 10 },
            "affected_files": { "type": "array", "items": { "type": "string" } },
            "risks": { "type": "array", "items": { "type": "string" } },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "title": { "type": "string" },
            "subtitle": { "type": "string" },
            "reasoning": { "type": "string" }
        },
        "required": ["summary", "steps", "estimated_complexity", "confidence"]
    })
}

pub fn planning_prompt(user_request: &str, repo_name: &str) -> String {
    format!(
        "Repository: {repo_name}\n\nEngineering request:\n{user_request}\n\n\
         Produce the plan as structured output."
    )
}

pub fn step_prompt(user_request: &str, step_description: &str, files: &[String]) -> String {
    let files = if files.is_empty() {
        "none declared".to_string()
    } else {
        files.join(", ")
    };
    format!(
        "Overall request:\n{user_request}\n\nYour step:\n{step_description}\n\n\
         Files this step must touch: {files}"
    )
}

pub fn coder_residual_prompt(untouched: &[String]) -> String {
    format!(
        "You have not yet produced a verified write to these declared files: {}. \
         Use the file tools to complete the step, then reply with the JSON summary.",
        untouched.join(", ")
    )
}

pub fn qa_prompt(user_request: &str, test_command: &str) -> String {
    format!(
        "The request under test:\n{user_request}\n\n\
         Run the test suite with run_command (suggested command: `{test_command}`) \
         and report the outcome."
    )
}

pub fn docs_prompt(user_request: &str, changed_files: &[String]) -> String {
    let changed = if changed_files.is_empty() {
        "none recorded".to_string()
    } else {
        changed_files.join(", ")
    };
    format!(
        "The following request was just implemented:\n{user_request}\n\n\
         Files changed: {changed}\n\n\
         Update any existing documentation that these changes make stale."
    )
}

/// Request text for a fix child spawned after failing tests.
pub fn fix_request(parent_request: &str, diagnostics: &str) -> String {
    format!(
        "Tests failed after implementing the following request:\n{parent_request}\n\n\
         Failure output:\n{diagnostics}\n\n\
         Identify the root cause and fix it so the test suite passes."
    )
}

/// Request text for a write-tests child spawned when no tests executed.
pub fn write_tests_request(parent_request: &str) -> String {
    format!(
        "No tests executed for the following implemented request:\n{parent_request}\n\n\
         Write tests that cover the new behavior so the suite meaningfully \
         exercises it."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docs_role_cannot_create_files() {
        let tools = allowed_tools(AgentRole::Docs);
        assert!(!tools.contains(&"write_file"));
        assert!(!tools.contains(&"delete_file"));
        assert!(tools.contains(&"edit_file"));
    }

    #[test]
    fn test_planner_is_read_only() {
        for tool in allowed_tools(AgentRole::Planner) {
            assert!(matches!(*tool, "read_file" | "list_files"));
        }
    }

    #[test]
    fn test_plan_schema_is_object() {
        let schema = plan_schema();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["steps"].is_object());
    }
}
