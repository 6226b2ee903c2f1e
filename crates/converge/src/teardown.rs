//! Ordered teardown.
//!
//! Removal runs in reverse dependency order: a resource is removed only
//! after everything that requires it is gone. `SoftRemove` leaves
//! soft-delete capable resources recoverable; `Purge` removes them for good
//! and must be confirmed explicitly. Purge protection is never bypassed.

use crate::context::{ConfirmCallback, ExecuteOptions, ProgressCallback};
use crate::error::{Error, Result};
use crate::executor::execute;
use crate::graph::Graph;
use crate::plan::{Action, Plan, PlanKind, PlanStep};
use crate::report::ApplyReport;
use crate::snapshot::Snapshot;
use cloudkit::{Backend, ResourceKey, Status};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TeardownMode {
    /// Delete; soft-delete capable kinds stay recoverable
    #[default]
    SoftRemove,
    /// Delete and purge (irreversible)
    Purge,
}

#[derive(Debug, Clone, Default)]
pub struct TeardownOptions {
    pub mode: TeardownMode,
    /// Required for `Purge`
    pub confirm_purge: bool,
    /// Resources to remove along with their dependents; empty means everything
    pub targets: Vec<ResourceKey>,
}

/// Build the teardown plan.
pub fn plan_teardown(graph: &Graph, snapshot: &Snapshot, opts: &TeardownOptions) -> Result<Plan> {
    let purge = opts.mode == TeardownMode::Purge;
    if purge && !opts.confirm_purge {
        return Err(Error::PurgeNotConfirmed);
    }

    let roots = opts
        .targets
        .iter()
        .map(|key| {
            graph
                .index_of(key)
                .ok_or_else(|| Error::UnknownTarget { key: key.clone() })
        })
        .collect::<Result<Vec<_>>>()?;
    let selected: BTreeSet<usize> = if roots.is_empty() {
        (0..graph.len()).collect()
    } else {
        graph.dependents_closure(roots)
    };

    let mut protected = Vec::new();
    let mut steps: Vec<PlanStep> = Vec::new();
    let mut step_of: BTreeMap<usize, usize> = BTreeMap::new();

    for &idx in graph.order().iter().rev() {
        let node = graph.node(idx);
        if !selected.contains(&idx) || node.resource.existing {
            continue;
        }

        let observed = snapshot.get(&node.key);
        if purge && observed.is_some_and(|o| o.flag("purge_protection") == Some(true)) {
            protected.push(node.key.to_string());
        }

        let soft_capable = node.key.kind.supports_soft_delete();
        let (action, reason, step_purge) = match observed {
            None => (Action::NoOp, "already absent".to_string(), false),
            Some(o) if o.status == Status::SoftDeleted => {
                if purge {
                    (Action::Delete, "purge soft-deleted copy".to_string(), true)
                } else {
                    (Action::NoOp, "already soft-deleted".to_string(), false)
                }
            }
            Some(_) if purge && soft_capable => (Action::Delete, "delete and purge".to_string(), true),
            Some(_) => (Action::Delete, "delete".to_string(), false),
        };

        let requires = node
            .dependents
            .iter()
            .filter_map(|d| step_of.get(d).copied())
            .collect();
        step_of.insert(idx, steps.len());
        steps.push(PlanStep {
            key: node.key.clone(),
            action,
            reason,
            destructive: action == Action::Delete,
            changes: Vec::new(),
            requires,
            purge: step_purge,
            resource: node.resource.clone(),
        });
    }

    if !protected.is_empty() {
        return Err(Error::PurgeProtected { resources: protected });
    }

    let plan = Plan {
        kind: PlanKind::Destroy,
        steps,
    };
    log::info!(
        "Teardown plan: {} to remove, {} already gone",
        plan.summary().delete,
        plan.summary().no_op
    );
    Ok(plan)
}

/// Plan and execute a teardown.
pub fn teardown<P, C>(
    graph: &Graph,
    snapshot: &Snapshot,
    backend: Arc<dyn Backend>,
    teardown_opts: &TeardownOptions,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ApplyReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let plan = plan_teardown(graph, snapshot, teardown_opts)?;
    execute(&plan, backend, opts, progress, confirm)
}
