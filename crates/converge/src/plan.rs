//! Diff/plan engine.
//!
//! Compares declared state with one immutable [`Snapshot`] and produces an
//! ordered [`Plan`]. Planning has no side effects; the same inputs always
//! give the same steps in the same order. Previews print the plan, apply
//! hands the very same plan to the reconciler.

use crate::graph::Graph;
use crate::model::Resource;
use crate::schema::schema;
use crate::snapshot::Snapshot;
use cloudkit::{Observed, ResourceKey, Status, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    /// Delete and re-create (immutable field changed)
    Replace,
    Delete,
    NoOp,
}

impl Action {
    /// Whether the step calls the backend.
    pub fn is_change(&self) -> bool {
        !matches!(self, Action::NoOp)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Replace => "replace",
            Action::Delete => "delete",
            Action::NoOp => "no-op",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    Apply,
    Destroy,
}

/// One drifted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Property name, or `tags.<key>`
    pub field: String,
    pub observed: Option<Value>,
    pub declared: Option<Value>,
    pub immutable: bool,
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub key: ResourceKey,
    pub action: Action,
    pub reason: String,
    pub destructive: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
    /// Indices of steps that must succeed before this one starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<usize>,
    /// Delete through the soft-deleted state (irreversible)
    #[serde(default)]
    pub purge: bool,
    pub resource: Resource,
}

/// Ordered change list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub kind: PlanKind,
    pub steps: Vec<PlanStep>,
}

/// Step counts per action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub no_op: usize,
    pub destructive: usize,
}

impl PlanSummary {
    pub fn changes(&self) -> usize {
        self.create + self.update + self.replace + self.delete
    }
}

impl Plan {
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for step in &self.steps {
            match step.action {
                Action::Create => summary.create += 1,
                Action::Update => summary.update += 1,
                Action::Replace => summary.replace += 1,
                Action::Delete => summary.delete += 1,
                Action::NoOp => summary.no_op += 1,
            }
            if step.destructive {
                summary.destructive += 1;
            }
        }
        summary
    }

    pub fn has_changes(&self) -> bool {
        self.steps.iter().any(|s| s.action.is_change())
    }

    pub fn destructive_steps(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(|s| s.destructive)
    }

    /// Stable hash of the plan, used to make sure the applied plan is the previewed one.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        // Serializing plain data to a Vec cannot fail
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hasher.update(&bytes);
        hasher.finalize().to_hex()[..16].to_string()
    }
}

/// Build the apply plan for every managed (non-existing) resource.
pub fn plan(graph: &Graph, snapshot: &Snapshot) -> Plan {
    let mut steps: Vec<PlanStep> = Vec::new();
    let mut step_of: BTreeMap<usize, usize> = BTreeMap::new();

    for &idx in graph.order() {
        let node = graph.node(idx);
        if node.resource.existing {
            continue;
        }

        let mut step = diff_resource(&node.resource, snapshot.get(&node.key));

        // Endpoints re-register into zones that are being (re)created
        if step.action == Action::NoOp {
            let recreated: Vec<String> = node
                .resource
                .joined_zones()
                .iter()
                .filter(|zone| {
                    graph
                        .index_of(zone)
                        .and_then(|z| step_of.get(&z))
                        .is_some_and(|&s| matches!(steps[s].action, Action::Create | Action::Replace))
                })
                .map(|zone| zone.name.clone())
                .collect();
            if !recreated.is_empty() {
                step.action = Action::Update;
                step.reason = format!("re-register in {}", recreated.join(", "));
            }
        }

        step.requires = node
            .deps
            .iter()
            .filter_map(|d| step_of.get(d).copied())
            .collect();
        step_of.insert(idx, steps.len());
        steps.push(step);
    }

    let plan = Plan {
        kind: PlanKind::Apply,
        steps,
    };
    let summary = plan.summary();
    log::info!(
        "Plan: {} to create, {} to update, {} to replace, {} unchanged",
        summary.create,
        summary.update,
        summary.replace,
        summary.no_op
    );
    plan
}

/// Compare one declared resource to its observed state.
fn diff_resource(resource: &Resource, observed: Option<&Observed>) -> PlanStep {
    let key = resource.key();
    let mut step = PlanStep {
        key,
        action: Action::NoOp,
        reason: "up to date".to_string(),
        destructive: false,
        changes: Vec::new(),
        requires: Vec::new(),
        purge: false,
        resource: resource.clone(),
    };

    let observed = match observed {
        Some(o) if o.is_live() => o,
        Some(_) => {
            step.action = Action::Create;
            step.reason = "only a soft-deleted copy exists".to_string();
            return step;
        }
        None => {
            step.action = Action::Create;
            step.reason = "does not exist".to_string();
            return step;
        }
    };

    step.changes = field_changes(resource, observed);
    let immutable: Vec<&str> = step
        .changes
        .iter()
        .filter(|c| c.immutable)
        .map(|c| c.field.as_str())
        .collect();

    if !immutable.is_empty() {
        step.action = Action::Replace;
        step.destructive = true;
        step.reason = format!("immutable field(s) changed: {}", immutable.join(", "));
    } else if observed.status == Status::Failed {
        step.action = Action::Update;
        step.reason = "last provisioning failed".to_string();
    } else if !step.changes.is_empty() {
        step.action = Action::Update;
        step.reason = format!("{} field(s) drifted", step.changes.len());
    }

    step
}

/// Immutable fields whose declared value differs from the observed one.
pub(crate) fn immutable_drift(resource: &Resource, observed: &Observed) -> Vec<String> {
    field_changes(resource, observed)
        .into_iter()
        .filter(|c| c.immutable)
        .map(|c| c.field)
        .collect()
}

/// Drift over declared keys only; unset fields are never drift.
fn field_changes(resource: &Resource, observed: &Observed) -> Vec<FieldChange> {
    let kind_schema = schema(resource.kind);
    let mut changes = Vec::new();

    for (field, declared) in &resource.properties {
        let current = observed.properties.get(field);
        if current.is_some_and(|c| values_equal(c, declared)) {
            continue;
        }
        changes.push(FieldChange {
            field: field.clone(),
            observed: current.cloned(),
            declared: Some(declared.clone()),
            immutable: kind_schema.is_immutable(field),
        });
    }

    for (tag, declared) in &resource.tags {
        let current = observed.tags.get(tag);
        if current == Some(declared) {
            continue;
        }
        changes.push(FieldChange {
            field: format!("tags.{tag}"),
            observed: current.map(|v| Value::String(v.clone())),
            declared: Some(Value::String(declared.clone())),
            immutable: false,
        });
    }

    changes
}

/// Structural equality with integers and floats compared numerically.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => (*i as f64) == *f,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => a == b,
    }
}
