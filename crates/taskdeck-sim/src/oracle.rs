//! Invariant checks over a finished simulation.
//!
//! Checks are pure functions of recorded data so a failing seed can be
//! replayed and re-checked without re-running the engine.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use taskdeck_core::model::{Task, TaskId, TaskStatus, WorkspaceId};

use crate::{ListComparison, ObservedEntry, SimulationResult};

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvariantViolation {
    /// A fetch response was applied although a newer generation existed.
    StaleResponseApplied {
        /// Cache key path.
        key: String,
        /// Generation of the applied ticket.
        generation: u64,
        /// Newest generation applied or current for the key at that point.
        newest: u64,
    },
    /// A listener saw an entry older than one it had already seen.
    GenerationRegressed {
        key: String,
        previous: u64,
        observed: u64,
    },
    /// A cached task list held the same id twice.
    DuplicateTask {
        round: u64,
        workspace_id: WorkspaceId,
        task_id: TaskId,
    },
    /// A failed move left the task outside its original column.
    RollbackLeak {
        task_id: TaskId,
        origin: TaskStatus,
        found: TaskStatus,
    },
    /// After quiescence the cached list differs from the server.
    Divergence {
        workspace_id: WorkspaceId,
        /// On the server, absent from the cache.
        missing: Vec<TaskId>,
        /// In the cache, gone from the server.
        unexpected: Vec<TaskId>,
        /// Present in both with different contents.
        mismatched: Vec<TaskId>,
    },
}

/// Outcome of one or more checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResult {
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub fn fail(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    pub fn merge(&mut self, other: Self) {
        self.passed &= other.passed;
        self.violations.extend(other.violations);
    }
}

pub struct ConvergenceOracle;

impl ConvergenceOracle {
    /// Per key, the generations a listener saw never go backwards.
    #[must_use]
    pub fn check_observed_generations(observed: &[ObservedEntry]) -> OracleResult {
        let mut last: BTreeMap<&str, u64> = BTreeMap::new();
        let mut violations = Vec::new();
        for seen in observed {
            match last.insert(seen.key.as_str(), seen.generation) {
                Some(previous) if seen.generation < previous => {
                    violations.push(InvariantViolation::GenerationRegressed {
                        key: seen.key.clone(),
                        previous,
                        observed: seen.generation,
                    });
                }
                _ => {}
            }
        }
        OracleResult::fail(violations)
    }

    /// No id appears twice in one list.
    #[must_use]
    pub fn check_unique_ids(round: u64, workspace_id: WorkspaceId, tasks: &[Task]) -> OracleResult {
        let mut seen = BTreeSet::new();
        let violations = tasks
            .iter()
            .filter(|t| !seen.insert(t.id))
            .map(|t| InvariantViolation::DuplicateTask {
                round,
                workspace_id,
                task_id: t.id,
            })
            .collect();
        OracleResult::fail(violations)
    }

    /// The cached list holds exactly the server's tasks. Order is ignored:
    /// pushes append where a fetch would return id order.
    #[must_use]
    pub fn check_convergence(comparison: &ListComparison) -> OracleResult {
        let cached: BTreeMap<TaskId, &Task> = comparison.cached.iter().map(|t| (t.id, t)).collect();
        let server: BTreeMap<TaskId, &Task> = comparison.server.iter().map(|t| (t.id, t)).collect();

        let missing: Vec<TaskId> = server.keys().filter(|id| !cached.contains_key(id)).copied().collect();
        let unexpected: Vec<TaskId> = cached.keys().filter(|id| !server.contains_key(id)).copied().collect();
        let mismatched: Vec<TaskId> = server
            .iter()
            .filter(|(id, task)| cached.get(id).is_some_and(|c| c != *task))
            .map(|(id, _)| *id)
            .collect();

        if missing.is_empty() && unexpected.is_empty() && mismatched.is_empty() {
            return OracleResult::pass();
        }
        OracleResult::fail(vec![InvariantViolation::Divergence {
            workspace_id: comparison.workspace_id,
            missing,
            unexpected,
            mismatched,
        }])
    }

    /// Everything recorded during the run plus the end-of-run checks.
    #[must_use]
    pub fn check_all(result: &SimulationResult) -> OracleResult {
        let mut combined = OracleResult::fail(result.violations.clone());
        combined.merge(Self::check_observed_generations(&result.observed));
        for comparison in &result.comparisons {
            combined.merge(Self::check_convergence(comparison));
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ComparisonPhase;
    use chrono::DateTime;
    use taskdeck_core::model::TaskPriority;

    fn task(id: TaskId, title: &str) -> Task {
        let at = DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp");
        Task {
            id,
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: TaskPriority::P2,
            workspace_id: 1,
            assignee_id: None,
            due_date: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn comparison(cached: Vec<Task>, server: Vec<Task>) -> ListComparison {
        ListComparison {
            phase: ComparisonPhase::Live,
            workspace_id: 1,
            cached,
            server,
        }
    }

    #[test]
    fn convergence_ignores_order() {
        let result = ConvergenceOracle::check_convergence(&comparison(
            vec![task(2, "b"), task(1, "a")],
            vec![task(1, "a"), task(2, "b")],
        ));
        assert!(result.passed);
    }

    #[test]
    fn divergence_names_each_kind_of_difference() {
        let result = ConvergenceOracle::check_convergence(&comparison(
            vec![task(1, "old"), task(3, "gone")],
            vec![task(1, "new"), task(2, "added")],
        ));
        assert!(!result.passed);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::Divergence {
                workspace_id: 1,
                missing: vec![2],
                unexpected: vec![3],
                mismatched: vec![1],
            }]
        );
    }

    #[test]
    fn duplicate_ids_are_reported() {
        let result =
            ConvergenceOracle::check_unique_ids(4, 1, &[task(1, "a"), task(2, "b"), task(1, "a")]);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::DuplicateTask {
                round: 4,
                workspace_id: 1,
                task_id: 1,
            }]
        );
    }

    #[test]
    fn generations_may_repeat_but_not_regress() {
        let seen = |key: &str, generation| ObservedEntry {
            key: key.into(),
            generation,
        };
        let ok = [seen("/a", 1), seen("/a", 1), seen("/b", 1), seen("/a", 3)];
        assert!(ConvergenceOracle::check_observed_generations(&ok).passed);

        let bad = [seen("/a", 4), seen("/b", 9), seen("/a", 2)];
        let result = ConvergenceOracle::check_observed_generations(&bad);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::GenerationRegressed {
                key: "/a".into(),
                previous: 4,
                observed: 2,
            }]
        );
    }

    #[test]
    fn merge_keeps_first_failure() {
        let mut result = OracleResult::pass();
        result.merge(OracleResult::fail(vec![InvariantViolation::RollbackLeak {
            task_id: 1,
            origin: TaskStatus::Todo,
            found: TaskStatus::Done,
        }]));
        result.merge(OracleResult::pass());
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
    }
}
