//! Apply/teardown results.

use crate::plan::{Action, PlanKind};
use chrono::{DateTime, Utc};
use cloudkit::{Observed, Removal, ResourceKey};
use serde::Serialize;
use std::fmt;

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum StepResult {
    Succeeded,
    Failed { error: String },
    Skipped { reason: String },
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-step record in an [`ApplyReport`].
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub key: ResourceKey,
    pub action: Action,
    pub result: StepResult,
    /// Backend calls made, retries included
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// State reported by the backend after a create/update/replace
    #[serde(skip)]
    pub observed: Option<Observed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removal: Option<Removal>,
}

impl StepReport {
    pub(crate) fn new(key: ResourceKey, action: Action, result: StepResult) -> Self {
        Self {
            key,
            action,
            result,
            attempts: 0,
            started_at: None,
            finished_at: None,
            observed: None,
            removal: None,
        }
    }
}

/// Overall outcome of an apply or teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyOutcome {
    /// Nothing to change
    NoChanges,
    Succeeded,
    /// Some steps failed; dependents were skipped, nothing rolled back
    PartialFailure,
    /// Stopped dispatching on request; in-flight steps finished
    Cancelled,
    /// Confirmation refused before any mutation
    Declined,
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyOutcome::NoChanges => "no changes",
            ApplyOutcome::Succeeded => "succeeded",
            ApplyOutcome::PartialFailure => "partial failure",
            ApplyOutcome::Cancelled => "cancelled",
            ApplyOutcome::Declined => "declined",
        };
        f.write_str(s)
    }
}

/// Summary of execution results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }

    /// Total number of steps processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.unchanged + self.failed + self.skipped
    }

    /// Add a step to the summary
    pub fn add_result(&mut self, action: Action, result: &StepResult) {
        match (result, action) {
            (StepResult::Failed { .. }, _) => self.failed += 1,
            (StepResult::Skipped { .. }, _) => self.skipped += 1,
            (StepResult::Succeeded, Action::Create) => self.created += 1,
            (StepResult::Succeeded, Action::Update) => self.updated += 1,
            (StepResult::Succeeded, Action::Replace) => self.replaced += 1,
            (StepResult::Succeeded, Action::Delete) => self.deleted += 1,
            (StepResult::Succeeded, Action::NoOp) => self.unchanged += 1,
        }
    }
}

/// Full report of one apply/teardown run.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub kind: PlanKind,
    pub outcome: ApplyOutcome,
    pub steps: Vec<StepReport>,
    pub summary: ExecuteSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ApplyReport {
    pub fn step(&self, key: &ResourceKey) -> Option<&StepReport> {
        self.steps.iter().find(|s| &s.key == key)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.result.is_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(Action::Create, &StepResult::Succeeded);
        summary.add_result(Action::Replace, &StepResult::Succeeded);
        summary.add_result(Action::NoOp, &StepResult::Succeeded);
        summary.add_result(
            Action::Update,
            &StepResult::Failed {
                error: "boom".into(),
            },
        );
        summary.add_result(
            Action::Create,
            &StepResult::Skipped {
                reason: "dependency failed".into(),
            },
        );

        assert_eq!(summary.total_changes(), 2);
        assert_eq!(summary.total(), 5);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
    }
}
