//! Plan domain model.
//!
//! The planner decomposes a request into an ordered, dependency-linked
//! sequence of steps. Step dependencies must point strictly backwards,
//! which keeps the step graph acyclic by construction; validation still
//! rejects duplicates, out-of-range references, and cycles explicitly so
//! a malformed planner output never reaches an executor.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::task::AgentRole;

/// A single step in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Execution order (0-indexed, unique within the plan)
    pub order: u32,
    /// What this step accomplishes
    pub description: String,
    /// Which agent role executes this step
    pub role: AgentRole,
    /// Files this step will touch
    #[serde(default)]
    pub files: Vec<String>,
    /// Orders of steps that must complete before this one
    #[serde(default)]
    pub depends_on: Vec<u32>,
}

/// Output of the planner agent, embedded in a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// High-level description of the plan
    pub summary: String,
    /// Ordered list of steps
    pub steps: Vec<PlanStep>,
    /// Complexity score (1 = trivial, 10 = very complex)
    pub estimated_complexity: u8,
    /// All files the plan declares it will modify
    #[serde(default)]
    pub affected_files: Vec<String>,
    /// Potential risks or considerations
    #[serde(default)]
    pub risks: Vec<String>,
}

/// Plan validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("plan has no steps")]
    Empty,
    #[error("duplicate step order {0}")]
    DuplicateOrder(u32),
    #[error("step {step} depends on {dependency}, which is not an earlier step")]
    ForwardDependency { step: u32, dependency: u32 },
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: u32, dependency: u32 },
    #[error("cycle detected in step dependencies")]
    Cycle,
    #[error("estimated complexity {0} outside 1..=10")]
    ComplexityOutOfRange(u8),
}

impl PlanError {
    /// Whether this rejection is specifically a dependency cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle | Self::ForwardDependency { .. })
    }
}

impl Plan {
    /// Validate the plan structure before it is accepted into a task.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.steps.is_empty() {
            return Err(PlanError::Empty);
        }
        if !(1..=10).contains(&self.estimated_complexity) {
            return Err(PlanError::ComplexityOutOfRange(self.estimated_complexity));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.order) {
                return Err(PlanError::DuplicateOrder(step.order));
            }
        }

        for step in &self.steps {
            for &dep in &step.depends_on {
                if !seen.contains(&dep) {
                    return Err(PlanError::UnknownDependency {
                        step: step.order,
                        dependency: dep,
                    });
                }
                // Dependency indices must point strictly backwards.
                if dep >= step.order {
                    return Err(PlanError::ForwardDependency {
                        step: step.order,
                        dependency: dep,
                    });
                }
            }
        }

        if self.has_cycle() {
            return Err(PlanError::Cycle);
        }

        Ok(())
    }

    /// DFS cycle check over the dependency relation.
    fn has_cycle(&self) -> bool {
        let edges: HashMap<u32, &Vec<u32>> =
            self.steps.iter().map(|s| (s.order, &s.depends_on)).collect();
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();

        fn dfs(
            node: u32,
            edges: &HashMap<u32, &Vec<u32>>,
            visited: &mut HashSet<u32>,
            stack: &mut HashSet<u32>,
        ) -> bool {
            if stack.contains(&node) {
                return true;
            }
            if !visited.insert(node) {
                return false;
            }
            stack.insert(node);
            if let Some(deps) = edges.get(&node) {
                for &dep in deps.iter() {
                    if dfs(dep, edges, visited, stack) {
                        return true;
                    }
                }
            }
            stack.remove(&node);
            false
        }

        self.steps
            .iter()
            .any(|s| dfs(s.order, &edges, &mut visited, &mut stack))
    }

    /// Steps in execution order (ascending by order index).
    ///
    /// Because dependencies point strictly backwards, ascending order is
    /// a valid topological order.
    pub fn ordered_steps(&self) -> Vec<&PlanStep> {
        let mut steps: Vec<&PlanStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    /// Look up a step by its order index.
    pub fn step(&self, order: u32) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.order == order)
    }

    pub fn total_steps(&self) -> u32 {
        self.steps.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(order: u32, role: AgentRole, deps: Vec<u32>) -> PlanStep {
        PlanStep {
            order,
            description: format!("step {order}"),
            role,
            files: vec![format!("src/file_{order}.rs")],
            depends_on: deps,
        }
    }

    fn plan(steps: Vec<PlanStep>) -> Plan {
        Plan {
            summary: "test plan".to_string(),
            steps,
            estimated_complexity: 3,
            affected_files: vec![],
            risks: vec![],
        }
    }

    #[test]
    fn test_valid_plan() {
        let p = plan(vec![
            step(0, AgentRole::CoderBackend, vec![]),
            step(1, AgentRole::CoderBackend, vec![0]),
            step(2, AgentRole::Docs, vec![0, 1]),
        ]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert_eq!(plan(vec![]).validate(), Err(PlanError::Empty));
    }

    #[test]
    fn test_duplicate_order_rejected() {
        let p = plan(vec![
            step(0, AgentRole::CoderBackend, vec![]),
            step(0, AgentRole::CoderBackend, vec![]),
        ]);
        assert_eq!(p.validate(), Err(PlanError::DuplicateOrder(0)));
    }

    #[test]
    fn test_forward_dependency_rejected() {
        let p = plan(vec![
            step(0, AgentRole::CoderBackend, vec![1]),
            step(1, AgentRole::CoderBackend, vec![]),
        ]);
        let err = p.validate().unwrap_err();
        assert!(err.is_cycle());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let p = plan(vec![step(0, AgentRole::CoderBackend, vec![0])]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let p = plan(vec![
            step(0, AgentRole::CoderBackend, vec![]),
            step(2, AgentRole::CoderBackend, vec![1]),
        ]);
        assert_eq!(
            p.validate(),
            Err(PlanError::UnknownDependency { step: 2, dependency: 1 })
        );
    }

    #[test]
    fn test_complexity_bounds() {
        let mut p = plan(vec![step(0, AgentRole::CoderBackend, vec![])]);
        p.estimated_complexity = 0;
        assert_eq!(p.validate(), Err(PlanError::ComplexityOutOfRange(0)));
        p.estimated_complexity = 11;
        assert!(p.validate().is_err());
        p.estimated_complexity = 10;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_ordered_steps() {
        let p = plan(vec![
            step(2, AgentRole::Docs, vec![0]),
            step(0, AgentRole::CoderBackend, vec![]),
            step(1, AgentRole::Qa, vec![0]),
        ]);
        let orders: Vec<u32> = p.ordered_steps().iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }
}
