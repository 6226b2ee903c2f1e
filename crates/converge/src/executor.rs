//! Reconciler - executes a plan against a backend
//!
//! A single coordinator owns all step state. Steps whose requirements have
//! succeeded are handed to a bounded rayon pool; completions come back over
//! a channel. A step never starts before every step it requires has
//! finished successfully, and a failed step skips everything downstream of
//! it while independent branches keep going. Nothing is rolled back.

use crate::context::{ConfirmCallback, ExecuteOptions, ProgressCallback};
use crate::error::{Error, Result};
use crate::plan::{Action, Plan, PlanKind, PlanStep};
use crate::report::{ApplyOutcome, ApplyReport, ExecuteSummary, StepReport, StepResult};
use chrono::{DateTime, Utc};
use cloudkit::{
    Backend, ErrorCategory, LogCallback, Observed, Removal, ResourceKey, ResourceKind, RetryConfig,
    with_retry,
};
use privdns::ZoneId;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Instant;

/// Execute a plan with the given options and callbacks
///
/// # Type Parameters
/// * `P` - Progress callback type
/// * `C` - Confirm callback type
///
/// # Returns
/// Per-step report. Step failures are reported there, not as `Err`;
/// `Err` means the plan was refused before any mutation.
pub fn execute<P, C>(
    plan: &Plan,
    backend: Arc<dyn Backend>,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ApplyReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let started_at = Utc::now();

    if !plan.has_changes() {
        let steps = plan
            .steps
            .iter()
            .map(|s| StepReport::new(s.key.clone(), s.action, StepResult::Succeeded))
            .collect();
        return Ok(finish(plan.kind, ApplyOutcome::NoChanges, steps, started_at));
    }

    let destructive: Vec<&PlanStep> = plan.destructive_steps().collect();
    if plan.kind == PlanKind::Apply && !destructive.is_empty() && !opts.allow_destructive {
        return Err(Error::DriftConflict {
            resources: destructive
                .iter()
                .map(|s| format!("{} ({})", s.key, s.action))
                .collect(),
        });
    }

    let prompt = match plan.kind {
        PlanKind::Apply => "Apply changes?",
        PlanKind::Destroy => "Destroy resources?",
    };
    let confirmed = confirm.confirm(prompt).map_err(|e| Error::Confirm(e.to_string()))?
        && (destructive.is_empty()
            || confirm
                .confirm_destructive(&destructive)
                .map_err(|e| Error::Confirm(e.to_string()))?);
    if !confirmed {
        log::info!("Execution declined; no changes made");
        let steps = plan
            .steps
            .iter()
            .map(|s| {
                StepReport::new(
                    s.key.clone(),
                    s.action,
                    StepResult::Skipped {
                        reason: "declined".to_string(),
                    },
                )
            })
            .collect();
        return Ok(finish(plan.kind, ApplyOutcome::Declined, steps, started_at));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .thread_name(|i| format!("converge-{i}"))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let changes = plan.steps.iter().filter(|s| s.action.is_change()).count();
    progress.on_start(changes);

    let mut coordinator = Coordinator::new(plan, opts);
    let (tx, rx) = mpsc::channel::<Event>();

    loop {
        coordinator.settle(progress, |idx, step, abandoned| {
            let tx = tx.clone();
            let backend = Arc::clone(&backend);
            let step = step.clone();
            let retry = opts.retry.clone();
            pool.spawn(move || {
                // The coordinator may have returned already
                let _ = tx.send(Event::Started(idx));
                let completion = run_step(&step, backend.as_ref(), &retry, &abandoned);
                let _ = tx.send(Event::Finished(idx, completion));
            });
        });

        // Timed-out workers still hold their slot; wait for them too
        if coordinator.occupied == 0 {
            break;
        }

        let received = match coordinator.next_deadline() {
            Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(Event::Started(idx)) => coordinator.start(idx),
            Ok(Event::Finished(idx, completion)) => coordinator.complete(idx, completion, progress),
            Err(RecvTimeoutError::Timeout) => coordinator.expire(progress),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    progress.on_finish();

    let cancelled = coordinator.cancelled_skips > 0;
    let steps = coordinator.into_reports();
    let outcome = if cancelled {
        ApplyOutcome::Cancelled
    } else if steps.iter().any(|s| !s.result.is_success()) {
        ApplyOutcome::PartialFailure
    } else {
        ApplyOutcome::Succeeded
    };
    let report = finish(plan.kind, outcome, steps, started_at);
    log::info!(
        "Execution {}: {} changed, {} failed, {} skipped",
        report.outcome,
        report.summary.total_changes(),
        report.summary.failed,
        report.summary.skipped
    );
    Ok(report)
}

fn finish(kind: PlanKind, outcome: ApplyOutcome, steps: Vec<StepReport>, started_at: DateTime<Utc>) -> ApplyReport {
    let mut summary = ExecuteSummary::default();
    for step in &steps {
        summary.add_result(step.action, &step.result);
    }
    ApplyReport {
        kind,
        outcome,
        steps,
        summary,
        started_at,
        finished_at: Utc::now(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    /// Handed to the pool; no worker has picked it up yet
    Queued,
    /// A worker is on it; the deadline counts from pickup
    Running(Option<Instant>),
    Done { ok: bool },
}

/// Worker to coordinator.
enum Event {
    Started(usize),
    Finished(usize, Completion),
}

/// What a worker sends back for one step.
struct Completion {
    outcome: cloudkit::Result<StepEffect>,
    attempts: u32,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

#[derive(Default)]
struct StepEffect {
    observed: Option<Observed>,
    removal: Option<Removal>,
}

struct Coordinator<'a> {
    plan: &'a Plan,
    opts: &'a ExecuteOptions,
    states: Vec<State>,
    reports: Vec<StepReport>,
    /// Set on timeout; the worker makes no further backend calls
    abandoned: Vec<Arc<AtomicBool>>,
    /// Pool slots held by a worker, including timed-out ones
    occupied: usize,
    cancelled: bool,
    cancelled_skips: usize,
}

impl<'a> Coordinator<'a> {
    fn new(plan: &'a Plan, opts: &'a ExecuteOptions) -> Self {
        let reports = plan
            .steps
            .iter()
            .map(|s| {
                StepReport::new(
                    s.key.clone(),
                    s.action,
                    StepResult::Skipped {
                        reason: "not started".to_string(),
                    },
                )
            })
            .collect();
        Self {
            plan,
            opts,
            states: vec![State::Pending; plan.steps.len()],
            reports,
            abandoned: (0..plan.steps.len()).map(|_| Arc::new(AtomicBool::new(false))).collect(),
            occupied: 0,
            cancelled: false,
            cancelled_skips: 0,
        }
    }

    /// Resolve every pending step that can be decided now, dispatching
    /// ready steps up to the concurrency limit.
    fn settle<P: ProgressCallback>(
        &mut self,
        progress: &mut P,
        mut dispatch: impl FnMut(usize, &PlanStep, Arc<AtomicBool>),
    ) {
        if !self.cancelled && self.opts.cancel.is_cancelled() {
            log::warn!("Cancellation requested; waiting for {} in-flight step(s)", self.occupied);
            self.cancelled = true;
        }

        let mut progressed = true;
        while progressed {
            progressed = false;
            for idx in 0..self.plan.steps.len() {
                if self.states[idx] != State::Pending {
                    continue;
                }
                let step = &self.plan.steps[idx];

                if self.cancelled {
                    self.resolve(idx, StepResult::Skipped { reason: "cancelled".to_string() }, progress);
                    self.cancelled_skips += 1;
                    progressed = true;
                    continue;
                }

                if let Some(&blocked) = step
                    .requires
                    .iter()
                    .find(|&&d| self.states[d] == State::Done { ok: false })
                {
                    let reason = format!("dependency {} did not succeed", self.plan.steps[blocked].key);
                    self.resolve(idx, StepResult::Skipped { reason }, progress);
                    progressed = true;
                    continue;
                }

                let ready = step
                    .requires
                    .iter()
                    .all(|&d| self.states[d] == State::Done { ok: true });
                if !ready {
                    continue;
                }

                if !step.action.is_change() {
                    self.states[idx] = State::Done { ok: true };
                    self.reports[idx].result = StepResult::Succeeded;
                    progressed = true;
                    continue;
                }

                if self.occupied >= self.opts.jobs.max(1) {
                    continue;
                }

                log::debug!("Dispatching {} {}", step.action, step.key);
                progress.on_step_start(step);
                self.states[idx] = State::Queued;
                self.occupied += 1;
                dispatch(idx, step, Arc::clone(&self.abandoned[idx]));
                progressed = true;
            }
        }

        // Requirements always point at steps that can settle, so this only
        // triggers on a malformed plan.
        if self.occupied == 0 {
            for idx in 0..self.plan.steps.len() {
                if self.states[idx] == State::Pending {
                    let reason = "requirements can never be met".to_string();
                    self.resolve(idx, StepResult::Skipped { reason }, progress);
                }
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.states
            .iter()
            .filter_map(|s| match s {
                State::Running(deadline) => *deadline,
                _ => None,
            })
            .min()
    }

    /// A worker picked the step up; its deadline starts now.
    fn start(&mut self, idx: usize) {
        if self.states[idx] == State::Queued {
            let deadline = self.opts.step_timeout.map(|t| Instant::now() + t);
            self.states[idx] = State::Running(deadline);
            self.reports[idx].started_at = Some(Utc::now());
        }
    }

    fn complete<P: ProgressCallback>(&mut self, idx: usize, completion: Completion, progress: &mut P) {
        self.occupied -= 1;

        if !matches!(self.states[idx], State::Queued | State::Running(_)) {
            self.settle_late(idx, completion);
            return;
        }

        let report = &mut self.reports[idx];
        report.attempts = completion.attempts;
        report.started_at = Some(completion.started_at);
        report.finished_at = Some(completion.finished_at);
        let result = match completion.outcome {
            Ok(effect) => {
                report.observed = effect.observed;
                report.removal = effect.removal;
                StepResult::Succeeded
            }
            Err(e) => {
                log::error!("{} {} failed: {e}", self.plan.steps[idx].action, self.plan.steps[idx].key);
                StepResult::Failed { error: e.to_string() }
            }
        };
        self.resolve(idx, result, progress);
    }

    /// Fail every running step whose deadline has passed.
    fn expire<P: ProgressCallback>(&mut self, progress: &mut P) {
        let now = Instant::now();
        for idx in 0..self.states.len() {
            if let State::Running(Some(deadline)) = self.states[idx]
                && deadline <= now
            {
                // The slot stays occupied until the worker returns
                self.abandoned[idx].store(true, Ordering::SeqCst);
                let timeout = self.opts.step_timeout.unwrap_or_default();
                log::error!("{} timed out after {timeout:?}", self.plan.steps[idx].key);
                self.reports[idx].finished_at = Some(Utc::now());
                let error = format!("timed out after {timeout:?}");
                self.resolve(idx, StepResult::Failed { error }, progress);
            }
        }
    }

    /// Record what a timed-out worker did after its deadline.
    fn settle_late(&mut self, idx: usize, completion: Completion) {
        let key = &self.plan.steps[idx].key;
        let report = &mut self.reports[idx];
        report.attempts = completion.attempts;
        report.finished_at = Some(completion.finished_at);
        let StepResult::Failed { error } = &mut report.result else {
            log::warn!("Discarding unexpected result for {key}");
            return;
        };
        match completion.outcome {
            Ok(_) => {
                log::warn!("{key} finished after its deadline; re-plan to pick up its state");
                error.push_str("; the in-flight call completed late");
            }
            Err(e) => {
                log::debug!("{key} gave up after its deadline: {e}");
                error.push_str(&format!("; the in-flight call then failed: {e}"));
            }
        }
    }

    fn resolve<P: ProgressCallback>(&mut self, idx: usize, result: StepResult, progress: &mut P) {
        let step = &self.plan.steps[idx];
        self.states[idx] = State::Done {
            ok: result.is_success(),
        };
        if step.action.is_change() {
            progress.on_step_complete(step, &result);
        }
        self.reports[idx].result = result;
    }

    fn into_reports(self) -> Vec<StepReport> {
        self.reports
    }
}

/// Backend calls for one step, each wrapped in retry.
struct StepRunner<'a> {
    backend: &'a dyn Backend,
    retry: &'a RetryConfig,
    abandoned: &'a AtomicBool,
    attempts: u32,
}

impl StepRunner<'_> {
    /// Checked before every attempt, so an abandoned step stops at the
    /// next call boundary.
    fn call<T>(&mut self, operation: &str, mut op: impl FnMut() -> cloudkit::Result<T>) -> cloudkit::Result<T> {
        let callback = LogCallback { operation };
        let abandoned = self.abandoned;
        let (result, attempts) = with_retry(self.retry, Some(&callback), || {
            if abandoned.load(Ordering::SeqCst) {
                return Err(cloudkit::Error::Other(format!("{operation} abandoned after timeout")));
            }
            op()
        });
        self.attempts += attempts;
        result
    }
}

fn run_step(step: &PlanStep, backend: &dyn Backend, retry: &RetryConfig, abandoned: &AtomicBool) -> Completion {
    let started_at = Utc::now();
    let mut runner = StepRunner {
        backend,
        retry,
        abandoned,
        attempts: 0,
    };
    let outcome = apply_step(&mut runner, step);
    Completion {
        outcome,
        attempts: runner.attempts,
        started_at,
        finished_at: Utc::now(),
    }
}

fn apply_step(runner: &mut StepRunner<'_>, step: &PlanStep) -> cloudkit::Result<StepEffect> {
    let key = &step.key;
    let backend = runner.backend;
    let desired = step.resource.desired();
    let label = format!("{} {key}", step.action);

    match step.action {
        Action::NoOp => Ok(StepEffect::default()),
        Action::Create => {
            let observed = runner.call(&label, || backend.create(key, &desired))?;
            register(runner, step, &observed)?;
            Ok(StepEffect {
                observed: Some(observed),
                removal: None,
            })
        }
        Action::Update => {
            let observed = runner.call(&label, || backend.update(key, &desired))?;
            register(runner, step, &observed)?;
            Ok(StepEffect {
                observed: Some(observed),
                removal: None,
            })
        }
        Action::Replace => {
            deregister(runner, step)?;
            // Soft-deletable kinds must be purged or the name stays held
            let purge = key.kind.supports_soft_delete();
            remove(runner, key, purge, &label)?;
            let observed = runner.call(&label, || backend.create(key, &desired))?;
            register(runner, step, &observed)?;
            Ok(StepEffect {
                observed: Some(observed),
                removal: None,
            })
        }
        Action::Delete => {
            deregister(runner, step)?;
            let removal = remove(runner, key, step.purge, &label)?;
            Ok(StepEffect {
                observed: None,
                removal,
            })
        }
    }
}

/// Delete, treating an already-absent resource as removed.
fn remove(runner: &mut StepRunner<'_>, key: &ResourceKey, purge: bool, label: &str) -> cloudkit::Result<Option<Removal>> {
    let backend = runner.backend;
    match runner.call(label, || backend.delete(key, purge)) {
        Ok(removal) => Ok(Some(removal)),
        Err(e) if e.category() == ErrorCategory::NotFound => {
            log::debug!("{key} already gone");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Post-provisioning DNS wiring: zone links and endpoint records.
fn register(runner: &mut StepRunner<'_>, step: &PlanStep, observed: &Observed) -> cloudkit::Result<()> {
    let backend = runner.backend;
    let resource = &step.resource;
    match step.key.kind {
        ResourceKind::PrivateZone => {
            let zone = ZoneId::new(step.key.scope.clone(), &step.key.name);
            for network in resource.zone_links() {
                let label = format!("link {zone} to {network}");
                if runner.call(&label, || backend.link_zone(&zone, &network))? {
                    log::info!("Linked zone {zone} to network scope {network}");
                }
            }
        }
        ResourceKind::Endpoint => {
            let zones = resource.joined_zones();
            if zones.is_empty() {
                return Ok(());
            }
            let address = endpoint_address(step, observed)?;
            let record = resource.record_name();
            for zone_key in zones {
                let zone = ZoneId::new(zone_key.scope.clone(), &zone_key.name);
                let label = format!("register {record} in {zone}");
                let outcome = runner.call(&label, || backend.upsert_record(&zone, &record, address))?;
                log::info!("Record {record}.{} -> {address}: {outcome:?}", zone.name);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Remove an endpoint's records before the endpoint itself goes away.
fn deregister(runner: &mut StepRunner<'_>, step: &PlanStep) -> cloudkit::Result<()> {
    if step.key.kind != ResourceKind::Endpoint {
        return Ok(());
    }
    let backend = runner.backend;
    let record = step.resource.record_name();
    for zone_key in step.resource.joined_zones() {
        let zone = ZoneId::new(zone_key.scope.clone(), &zone_key.name);
        let label = format!("deregister {record} from {zone}");
        if runner.call(&label, || backend.remove_record(&zone, &record))? {
            log::info!("Removed record {record} from {zone}");
        }
    }
    Ok(())
}

fn endpoint_address(step: &PlanStep, observed: &Observed) -> cloudkit::Result<IpAddr> {
    step.resource
        .declared_address()
        .or_else(|| {
            observed
                .properties
                .get("address")
                .and_then(cloudkit::Value::as_str)
                .and_then(|s| s.parse().ok())
        })
        .ok_or_else(|| cloudkit::Error::Invalid {
            message: format!("endpoint {} has no private address to register", step.key),
        })
}
