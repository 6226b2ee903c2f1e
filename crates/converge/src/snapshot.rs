//! Live-state snapshot.
//!
//! Read once per planning pass, in parallel, and never refreshed during
//! that pass. Two concurrent plans may see different backend states, but
//! each plan is internally consistent.

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::plan::Action;
use crate::report::ApplyReport;
use chrono::{DateTime, Utc};
use cloudkit::{Backend, Observed, Removal, ResourceKey};
use rayon::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Snapshot {
    observed: BTreeMap<ResourceKey, Option<Observed>>,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// A snapshot in which nothing exists.
    pub fn empty() -> Self {
        Self {
            observed: BTreeMap::new(),
            taken_at: Utc::now(),
        }
    }

    /// Read every declared resource from the backend on a pool of `jobs` threads.
    pub fn capture(graph: &Graph, backend: &dyn Backend, jobs: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        let reads: Vec<(ResourceKey, Option<Observed>)> = pool.install(|| {
            graph
                .nodes()
                .par_iter()
                .map(|node| Ok((node.key.clone(), backend.get(&node.key)?)))
                .collect::<std::result::Result<Vec<_>, cloudkit::Error>>()
        })?;

        log::debug!("Captured live state of {} resources", reads.len());
        Ok(Self {
            observed: reads.into_iter().collect(),
            taken_at: Utc::now(),
        })
    }

    /// Record an observation (used when seeding snapshots).
    pub fn insert(&mut self, key: ResourceKey, observed: Option<Observed>) {
        self.observed.insert(key, observed);
    }

    /// Observed state, including soft-deleted resources.
    pub fn get(&self, key: &ResourceKey) -> Option<&Observed> {
        self.observed.get(key).and_then(Option::as_ref)
    }

    /// Observed state of a live resource.
    pub fn live(&self, key: &ResourceKey) -> Option<&Observed> {
        self.get(key).filter(|o| o.is_live())
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Fold the results of an apply into the snapshot, giving the new baseline.
    pub fn absorb(&mut self, report: &ApplyReport) {
        for step in report.steps.iter().filter(|s| s.result.is_success()) {
            match step.action {
                Action::Create | Action::Update | Action::Replace => {
                    if let Some(observed) = &step.observed {
                        self.observed.insert(step.key.clone(), Some(observed.clone()));
                    }
                }
                Action::Delete => match (step.removal, self.observed.get_mut(&step.key)) {
                    (Some(Removal::SoftDeleted), Some(Some(observed))) => {
                        observed.status = cloudkit::Status::SoftDeleted;
                        observed.deleted_at = step.finished_at;
                    }
                    _ => {
                        self.observed.insert(step.key.clone(), None);
                    }
                },
                Action::NoOp => {}
            }
        }
        self.taken_at = report.finished_at;
    }
}
