//! Agent runtime.
//!
//! Drives one agent invocation: issue a request to the generative
//! client, execute any requested tools through the reality verifier,
//! append results to the transcript, and repeat until the agent returns
//! a final result or a budget runs out. Cancellation is honored before
//! each iteration and before each tool execution.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::domain::models::{
    AgentRole, Plan, PlanStep, ToolErrorKind, ToolInvocation, ToolOutcome, VerifiedFileEvent,
};
use crate::domain::ports::{
    GenerativeClient, GenerativeError, ToolCallRequest, ToolCallResponse, ToolChoice,
    TranscriptEntry,
};

use super::prompts;
use super::tools::ToolContext;
use super::verifier::RealityVerifier;

/// Why an agent invocation failed.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentFailure {
    /// Final output did not match the expected shape.
    InvalidOutput(String),
    /// Iteration budget exhausted without a final result.
    ExceededIterations,
    /// Cancelled at a checkpoint.
    Cancelled,
    /// Iteration exceeded its time budget.
    Timeout,
    /// A coder finished without a single verified write.
    NoVerifiedWrites,
    /// The generative backend failed permanently.
    Backend(String),
}

impl std::fmt::Display for AgentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOutput(detail) => write!(f, "invalid agent output: {detail}"),
            Self::ExceededIterations => write!(f, "agent exceeded its iteration budget"),
            Self::Cancelled => write!(f, "agent invocation cancelled"),
            Self::Timeout => write!(f, "agent iteration timed out"),
            Self::NoVerifiedWrites => write!(f, "coder produced no verified writes"),
            Self::Backend(detail) => write!(f, "generative backend error: {detail}"),
        }
    }
}

/// Semantic verdict of a QA invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum QaVerdict {
    Passed,
    Failed { diagnostics: String },
    /// Exit code 0 but nothing was actually tested.
    NoTestsExecuted,
}

/// Structured result of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub role: AgentRole,
    pub title: String,
    pub subtitle: String,
    pub reasoning: String,
    pub invocations: Vec<ToolInvocation>,
    /// File events certified by the verifier during this invocation.
    /// Persisted already; the engine publishes them after the run log.
    pub file_events: Vec<VerifiedFileEvent>,
    pub confidence: f64,
    pub requires_review: bool,
    pub duration_ms: u64,
    /// Present for successful planner invocations.
    pub plan: Option<Plan>,
    /// Present for successful QA invocations.
    pub verdict: Option<QaVerdict>,
    pub failure: Option<AgentFailure>,
}

impl AgentOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Policy knobs for the runtime, extracted from engine config.
#[derive(Debug, Clone)]
pub struct AgentRuntimeConfig {
    pub max_iterations: u32,
    pub max_coder_reprompts: u32,
    pub iteration_timeout: Duration,
    pub review_confidence: f64,
    pub temperature: f32,
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            max_coder_reprompts: 3,
            iteration_timeout: Duration::from_secs(120),
            review_confidence: 0.7,
            temperature: 0.1,
        }
    }
}

/// Final JSON summary expected from tool-looping roles.
#[derive(Debug, Deserialize)]
struct FinalSummary {
    title: Option<String>,
    subtitle: Option<String>,
    reasoning: Option<String>,
    confidence: Option<f64>,
}

/// Planner structured output envelope.
#[derive(Debug, Deserialize)]
struct PlannerOutput {
    summary: String,
    steps: Vec<PlannerStep>,
    estimated_complexity: u8,
    #[serde(default)]
    affected_files: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
    confidence: f64,
    title: Option<String>,
    subtitle: Option<String>,
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlannerStep {
    order: u32,
    description: String,
    role: String,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    depends_on: Vec<u32>,
}

/// Drives role-specialized agent invocations.
pub struct AgentRuntime {
    client: Arc<dyn GenerativeClient>,
    verifier: Arc<RealityVerifier>,
    registry: Arc<super::tools::ToolRegistry>,
    config: AgentRuntimeConfig,
}

impl AgentRuntime {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        verifier: Arc<RealityVerifier>,
        registry: Arc<super::tools::ToolRegistry>,
        config: AgentRuntimeConfig,
    ) -> Self {
        Self {
            client,
            verifier,
            registry,
            config,
        }
    }

    /// Run the planner: a single structured-output request.
    pub async fn run_planner(
        &self,
        task_id: Uuid,
        user_prompt: &str,
        ctx: &ToolContext,
    ) -> AgentOutcome {
        let started = Instant::now();
        let mut outcome = self.empty_outcome(AgentRole::Planner);

        if ctx.cancel.is_cancelled() {
            outcome.failure = Some(AgentFailure::Cancelled);
            return outcome;
        }

        let schema = prompts::plan_schema();
        let result = tokio::time::timeout(
            self.config.iteration_timeout,
            self.client.structured(
                prompts::PLANNER_SYSTEM,
                user_prompt,
                &schema,
                self.config.temperature,
                &ctx.cancel,
            ),
        )
        .await;

        outcome.duration_ms = started.elapsed().as_millis() as u64;

        let value = match result {
            Err(_) => {
                outcome.failure = Some(AgentFailure::Timeout);
                return outcome;
            }
            Ok(Err(GenerativeError::Cancelled)) => {
                outcome.failure = Some(AgentFailure::Cancelled);
                return outcome;
            }
            Ok(Err(GenerativeError::InvalidOutput(detail))) => {
                outcome.failure = Some(AgentFailure::InvalidOutput(detail));
                return outcome;
            }
            Ok(Err(e)) => {
                outcome.failure = Some(AgentFailure::Backend(e.to_string()));
                return outcome;
            }
            Ok(Ok(value)) => value,
        };

        let parsed: PlannerOutput = match serde_json::from_value(value) {
            Ok(p) => p,
            Err(e) => {
                outcome.failure = Some(AgentFailure::InvalidOutput(e.to_string()));
                return outcome;
            }
        };

        let mut steps = Vec::with_capacity(parsed.steps.len());
        for step in parsed.steps {
            let Some(role) = AgentRole::from_str(&step.role) else {
                outcome.failure = Some(AgentFailure::InvalidOutput(format!(
                    "unknown role '{}' in step {}",
                    step.role, step.order
                )));
                return outcome;
            };
            steps.push(PlanStep {
                order: step.order,
                description: step.description,
                role,
                files: step.files,
                depends_on: step.depends_on,
            });
        }

        outcome.title = parsed.title.unwrap_or_else(|| "Plan created".to_string());
        outcome.subtitle = parsed
            .subtitle
            .unwrap_or_else(|| parsed.summary.clone());
        outcome.reasoning = parsed.reasoning.unwrap_or_default();
        outcome.confidence = parsed.confidence.clamp(0.0, 1.0);
        outcome.requires_review = outcome.confidence < self.config.review_confidence;
        outcome.plan = Some(Plan {
            summary: parsed.summary,
            steps,
            estimated_complexity: parsed.estimated_complexity,
            affected_files: parsed.affected_files,
            risks: parsed.risks,
        });

        tracing::debug!(%task_id, confidence = outcome.confidence, "planner finished");
        outcome
    }

    /// Run a tool-looping agent (coder / qa / docs).
    pub async fn run_agent(
        &self,
        task_id: Uuid,
        role: AgentRole,
        step: u32,
        user_prompt: &str,
        declared_files: &[String],
        ctx: &ToolContext,
    ) -> AgentOutcome {
        let started = Instant::now();
        let mut outcome = self.empty_outcome(role);
        let tools = self.registry.descriptors(prompts::allowed_tools(role));
        let allowed: Vec<&str> = prompts::allowed_tools(role).to_vec();

        let mut transcript = vec![TranscriptEntry::User(user_prompt.to_string())];
        let mut touched: Vec<String> = Vec::new();
        let mut reprompts = 0u32;
        let mut iterations = 0u32;

        let final_summary = loop {
            // Checkpoint before each iteration.
            if ctx.cancel.is_cancelled() {
                outcome.failure = Some(AgentFailure::Cancelled);
                outcome.duration_ms = started.elapsed().as_millis() as u64;
                return outcome;
            }
            if iterations >= self.config.max_iterations {
                outcome.failure = Some(AgentFailure::ExceededIterations);
                outcome.duration_ms = started.elapsed().as_millis() as u64;
                return outcome;
            }
            iterations += 1;

            let request = ToolCallRequest {
                system_prompt: prompts::system_prompt(role).to_string(),
                transcript: transcript.clone(),
                tools: tools.clone(),
                tool_choice: ToolChoice::Auto,
                temperature: self.config.temperature,
            };

            let response = match tokio::time::timeout(
                self.config.iteration_timeout,
                self.client.tool_call(request, &ctx.cancel),
            )
            .await
            {
                Err(_) => {
                    outcome.failure = Some(AgentFailure::Timeout);
                    outcome.duration_ms = started.elapsed().as_millis() as u64;
                    return outcome;
                }
                Ok(Err(GenerativeError::Cancelled)) => {
                    outcome.failure = Some(AgentFailure::Cancelled);
                    outcome.duration_ms = started.elapsed().as_millis() as u64;
                    return outcome;
                }
                Ok(Err(e)) => {
                    outcome.failure = Some(AgentFailure::Backend(e.to_string()));
                    outcome.duration_ms = started.elapsed().as_millis() as u64;
                    return outcome;
                }
                Ok(Ok(response)) => response,
            };

            match response {
                ToolCallResponse::Calls(calls) => {
                    for call in calls {
                        // Checkpoint before each tool execution.
                        if ctx.cancel.is_cancelled() {
                            outcome.failure = Some(AgentFailure::Cancelled);
                            outcome.duration_ms = started.elapsed().as_millis() as u64;
                            return outcome;
                        }

                        let invocation = if allowed.contains(&call.tool.as_str()) {
                            let verified = self
                                .verifier
                                .invoke(task_id, step, &call.tool, call.args, ctx)
                                .await;
                            // Verified effects are what count toward the
                            // coder's declared-files obligation.
                            touched.extend(verified.events.iter().map(|e| e.path.clone()));
                            outcome.file_events.extend(verified.events);
                            verified.invocation
                        } else {
                            ToolInvocation::new(
                                call.tool.clone(),
                                call.args,
                                ToolOutcome::err(
                                    ToolErrorKind::InvalidArgs,
                                    format!("tool '{}' not available to {} agent", call.tool, role),
                                ),
                                0,
                            )
                        };

                        transcript.push(TranscriptEntry::ToolResult(
                            invocation.tool.clone(),
                            render_outcome(&invocation.outcome),
                        ));
                        outcome.invocations.push(invocation);
                    }
                }
                ToolCallResponse::Final(text) => {
                    // Coder obligation: every declared file needs a verified write.
                    if role.is_coder() {
                        let untouched = residual(declared_files, &touched);
                        if !untouched.is_empty() && reprompts < self.config.max_coder_reprompts {
                            reprompts += 1;
                            iterations = 0;
                            transcript.push(TranscriptEntry::Assistant(text));
                            transcript.push(TranscriptEntry::User(
                                prompts::coder_residual_prompt(&untouched),
                            ));
                            continue;
                        }
                        if touched.is_empty() {
                            outcome.failure = Some(AgentFailure::NoVerifiedWrites);
                            outcome.duration_ms = started.elapsed().as_millis() as u64;
                            return outcome;
                        }
                    }
                    break text;
                }
            }
        };

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        self.apply_final_summary(&mut outcome, &final_summary);

        if role == AgentRole::Qa {
            outcome.verdict = Some(qa_verdict(&outcome.invocations));
        }

        outcome
    }

    fn apply_final_summary(&self, outcome: &mut AgentOutcome, text: &str) {
        let parsed = extract_json(text).and_then(|v| serde_json::from_value::<FinalSummary>(v).ok());
        match parsed {
            Some(summary) => {
                outcome.title = summary
                    .title
                    .unwrap_or_else(|| format!("{} finished", outcome.role));
                outcome.subtitle = summary.subtitle.unwrap_or_default();
                outcome.reasoning = summary.reasoning.unwrap_or_else(|| text.to_string());
                outcome.confidence = summary.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
            }
            None => {
                // Freeform final text still counts; flag it for review.
                outcome.title = format!("{} finished", outcome.role);
                outcome.subtitle = String::new();
                outcome.reasoning = text.to_string();
                outcome.confidence = 0.5;
            }
        }
        outcome.requires_review = outcome.confidence < self.config.review_confidence;
    }

    fn empty_outcome(&self, role: AgentRole) -> AgentOutcome {
        AgentOutcome {
            role,
            title: String::new(),
            subtitle: String::new(),
            reasoning: String::new(),
            invocations: Vec::new(),
            file_events: Vec::new(),
            confidence: 0.0,
            requires_review: false,
            duration_ms: 0,
            plan: None,
            verdict: None,
            failure: None,
        }
    }
}

fn residual(declared: &[String], touched: &[String]) -> Vec<String> {
    declared
        .iter()
        .filter(|d| !touched.contains(d))
        .cloned()
        .collect()
}

fn render_outcome(outcome: &ToolOutcome) -> String {
    match outcome {
        ToolOutcome::Ok { result } => result.clone(),
        ToolOutcome::Err { kind, detail } => format!("ERROR [{}]: {detail}", kind.as_str()),
    }
}

/// Pull a JSON object out of a final message, tolerating surrounding prose.
fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if start < end {
        serde_json::from_str(&trimmed[start..=end]).ok()
    } else {
        None
    }
}

/// Markers meaning "the runner found nothing to run" when paired with
/// exit code 0.
const NO_TESTS_MARKERS: &[&str] = &[
    "collected 0 items",
    "no tests ran",
    "running 0 tests",
    "no test files",
    "0 tests collected",
];

/// Derive the semantic QA verdict from the recorded command invocations.
fn qa_verdict(invocations: &[ToolInvocation]) -> QaVerdict {
    let last_run = invocations
        .iter()
        .rev()
        .find(|i| i.tool == "run_command" && i.outcome.is_ok());

    let Some(run) = last_run else {
        // QA never managed to run anything; treat as nothing executed.
        return QaVerdict::NoTestsExecuted;
    };

    let ToolOutcome::Ok { result } = &run.outcome else {
        return QaVerdict::NoTestsExecuted;
    };

    let Ok(parsed) = serde_json::from_str::<Value>(result) else {
        return QaVerdict::Failed {
            diagnostics: result.chars().take(2000).collect(),
        };
    };

    let exit_code = parsed.get("exit_code").and_then(Value::as_i64).unwrap_or(-1);
    let stdout = parsed.get("stdout").and_then(Value::as_str).unwrap_or("");
    let stderr = parsed.get("stderr").and_then(Value::as_str).unwrap_or("");
    let combined = format!("{stdout}\n{stderr}");

    if exit_code == 0 {
        let lowered = combined.to_lowercase();
        if NO_TESTS_MARKERS.iter().any(|m| lowered.contains(m)) {
            return QaVerdict::NoTestsExecuted;
        }
        return QaVerdict::Passed;
    }

    let tail: String = combined
        .chars()
        .rev()
        .take(2000)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    QaVerdict::Failed { diagnostics: tail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run_invocation(exit_code: i64, stdout: &str) -> ToolInvocation {
        ToolInvocation::new(
            "run_command",
            json!({"command": "pytest"}),
            ToolOutcome::ok(
                serde_json::to_string(&json!({
                    "exit_code": exit_code,
                    "stdout": stdout,
                    "stderr": "",
                }))
                .unwrap(),
            ),
            10,
        )
    }

    #[test]
    fn test_qa_verdict_passed() {
        let verdict = qa_verdict(&[run_invocation(0, "3 passed in 0.12s")]);
        assert_eq!(verdict, QaVerdict::Passed);
    }

    #[test]
    fn test_qa_verdict_no_tests_collected() {
        let verdict = qa_verdict(&[run_invocation(0, "collected 0 items")]);
        assert_eq!(verdict, QaVerdict::NoTestsExecuted);

        let verdict = qa_verdict(&[run_invocation(0, "running 0 tests\ntest result: ok")]);
        assert_eq!(verdict, QaVerdict::NoTestsExecuted);
    }

    #[test]
    fn test_qa_verdict_failure_carries_diagnostics() {
        let verdict = qa_verdict(&[run_invocation(1, "assert 1 == 2\nFAILED test_x")]);
        match verdict {
            QaVerdict::Failed { diagnostics } => assert!(diagnostics.contains("FAILED test_x")),
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn test_qa_verdict_uses_last_run() {
        let verdict = qa_verdict(&[
            run_invocation(1, "first run failed"),
            run_invocation(0, "5 passed"),
        ]);
        assert_eq!(verdict, QaVerdict::Passed);
    }

    #[test]
    fn test_qa_verdict_without_runs() {
        assert_eq!(qa_verdict(&[]), QaVerdict::NoTestsExecuted);
    }

    #[test]
    fn test_extract_json_with_prose() {
        let text = "Here is my summary:\n{\"title\": \"Done\", \"confidence\": 0.9}\nThanks!";
        let value = extract_json(text).unwrap();
        assert_eq!(value["title"], "Done");
    }

    #[test]
    fn test_residual() {
        let declared = vec!["a.rs".to_string(), "b.rs".to_string()];
        let touched = vec!["a.rs".to_string()];
        assert_eq!(residual(&declared, &touched), vec!["b.rs".to_string()]);
    }
}
