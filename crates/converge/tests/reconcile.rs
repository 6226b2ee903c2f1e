//! End-to-end reconciliation behavior against the in-memory backend.

use cloudkit::{
    Backend, CallPhase, ErrorCategory, LocalBackend, MemoryBackend, NameAvailability, Operation,
    ResourceKey, ResourceKind, RetryConfig, Value,
};
use converge::{
    Action, ApplyOutcome, ApplyReport, AutoConfirm, CancelToken, Error, ExecuteOptions, Graph,
    NoProgress, PlanStep, ProgressCallback, Resource, Snapshot, StepResult, TeardownMode,
    TeardownOptions, execute, plan, plan_teardown, validate,
};
use std::sync::Arc;
use std::time::Duration;

fn opts() -> ExecuteOptions {
    ExecuteOptions {
        jobs: 4,
        retry: RetryConfig::new(3, Duration::from_millis(1), 1.0),
        ..Default::default()
    }
}

fn zone_key() -> ResourceKey {
    ResourceKey::new(ResourceKind::PrivateZone, "ScopeA", "zone1.internal")
}

fn endpoint_key() -> ResourceKey {
    ResourceKey::new(ResourceKind::Endpoint, "ScopeA", "Endpoint1")
}

fn e2e() -> Vec<Resource> {
    vec![
        Resource::scope("ScopeA"),
        Resource::new(ResourceKind::PrivateZone, "ScopeA", "zone1.internal"),
        Resource::new(ResourceKind::Endpoint, "ScopeA", "Endpoint1")
            .depends_on(&zone_key())
            .joining(&["zone1.internal"]),
    ]
}

fn apply(backend: &Arc<MemoryBackend>, resources: Vec<Resource>, opts: &ExecuteOptions) -> ApplyReport {
    let graph = Graph::build(resources).unwrap();
    let snapshot = Snapshot::capture(&graph, backend.as_ref(), 2).unwrap();
    let plan = plan(&graph, &snapshot);
    let dyn_backend: Arc<dyn Backend> = backend.clone();
    execute(&plan, dyn_backend, opts, &mut NoProgress, &mut AutoConfirm).unwrap()
}

#[test]
fn plan_is_deterministic_for_fixed_inputs() {
    let backend = MemoryBackend::new();
    let graph = Graph::build(e2e()).unwrap();
    let snapshot = Snapshot::capture(&graph, &backend, 4).unwrap();

    let first = plan(&graph, &snapshot);
    for _ in 0..5 {
        assert_eq!(plan(&graph, &snapshot), first);
    }

    let steps: Vec<(Action, String)> = first
        .steps
        .iter()
        .map(|s| (s.action, s.key.to_string()))
        .collect();
    assert_eq!(
        steps,
        vec![
            (Action::Create, "scope/ScopeA".to_string()),
            (Action::Create, "private-zone/ScopeA/zone1.internal".to_string()),
            (Action::Create, "endpoint/ScopeA/Endpoint1".to_string()),
        ]
    );
}

#[test]
fn noop_plan_never_mutates() {
    let backend = Arc::new(MemoryBackend::new());
    apply(&backend, e2e(), &opts());
    let mutations = backend.mutation_count();

    let graph = Graph::build(e2e()).unwrap();
    let snapshot = Snapshot::capture(&graph, backend.as_ref(), 4).unwrap();
    let plan = plan(&graph, &snapshot);
    assert!(plan.steps.iter().all(|s| s.action == Action::NoOp));

    let dyn_backend: Arc<dyn Backend> = backend.clone();
    let report = execute(&plan, dyn_backend, &opts(), &mut NoProgress, &mut AutoConfirm).unwrap();
    assert_eq!(report.outcome, ApplyOutcome::NoChanges);
    assert_eq!(backend.mutation_count(), mutations);
}

#[test]
fn replace_is_always_destructive() {
    let backend = Arc::new(MemoryBackend::new());
    let declared = |location: &str| {
        vec![
            Resource::scope("ScopeA"),
            Resource::new(ResourceKind::Network, "ScopeA", "vnet1")
                .with_property("location", location)
                .with_property("address_space", "10.0.0.0/16"),
            Resource::new(ResourceKind::ManagedIdentity, "ScopeA", "id-app")
                .with_property("location", location),
        ]
    };
    apply(&backend, declared("westeurope"), &opts());

    let graph = Graph::build(declared("northeurope")).unwrap();
    let snapshot = Snapshot::capture(&graph, backend.as_ref(), 2).unwrap();
    let plan = plan(&graph, &snapshot);

    let replaced: Vec<&PlanStep> = plan.steps.iter().filter(|s| s.action == Action::Replace).collect();
    assert_eq!(replaced.len(), 2);
    assert!(replaced.iter().all(|s| s.destructive));
    assert!(plan.steps.iter().filter(|s| s.action == Action::Replace).all(|s| s.destructive));
}

#[test]
fn three_node_cycle_is_rejected_with_full_path() {
    let a = ResourceKey::new(ResourceKind::Network, "S", "a");
    let b = ResourceKey::new(ResourceKind::Network, "S", "b");
    let c = ResourceKey::new(ResourceKind::Network, "S", "c");
    let resources = vec![
        Resource::scope("S"),
        Resource::new(ResourceKind::Network, "S", "a").depends_on(&b),
        Resource::new(ResourceKind::Network, "S", "b").depends_on(&c),
        Resource::new(ResourceKind::Network, "S", "c").depends_on(&a),
    ];

    let Err(Error::Cycle { path }) = Graph::build(resources) else {
        panic!("expected a cycle error");
    };
    for key in [&a, &b, &c] {
        assert!(path.contains(key), "{key} missing from {path:?}");
    }
    assert_eq!(path.first(), path.last());
}

#[test]
fn dependency_finishes_before_dependent_starts() {
    let backend = Arc::new(MemoryBackend::new());
    // Slow the zone so a scheduler that ignored edges would overlap it
    backend.set_delay(&zone_key(), Duration::from_millis(30));

    let report = apply(&backend, e2e(), &opts());
    assert_eq!(report.outcome, ApplyOutcome::Succeeded);

    let zone_linked = backend
        .seq_of("ScopeA/zone1.internal", Operation::LinkZone, CallPhase::End)
        .unwrap();
    let zone_created = backend
        .seq_of(zone_key(), Operation::Create, CallPhase::End)
        .unwrap();
    let endpoint_started = backend
        .seq_of(endpoint_key(), Operation::Create, CallPhase::Start)
        .unwrap();
    assert!(zone_created < endpoint_started);
    assert!(zone_linked < endpoint_started);
}

#[test]
fn failure_skips_transitive_dependents_only() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_next(zone_key(), Operation::Create, ErrorCategory::Invalid, 1);

    let mut resources = e2e();
    resources.push(Resource::scope("ScopeB"));
    resources.push(Resource::new(ResourceKind::Network, "ScopeB", "vnet-b"));
    let report = apply(&backend, resources, &opts());

    assert_eq!(report.outcome, ApplyOutcome::PartialFailure);
    assert!(report.step(&zone_key()).unwrap().result.is_failure());
    assert!(matches!(
        report.step(&endpoint_key()).unwrap().result,
        StepResult::Skipped { .. }
    ));
    assert!(backend.seq_of(endpoint_key(), Operation::Create, CallPhase::Start).is_none());

    for ok in [
        ResourceKey::scope("ScopeA"),
        ResourceKey::scope("ScopeB"),
        ResourceKey::new(ResourceKind::Network, "ScopeB", "vnet-b"),
    ] {
        assert!(report.step(&ok).unwrap().result.is_success(), "{ok}");
    }

    // Re-running converges without redoing what succeeded
    let rerun = apply(&backend, e2e(), &opts());
    assert_eq!(rerun.outcome, ApplyOutcome::Succeeded);
    assert_eq!(rerun.summary.created, 2);
    assert_eq!(rerun.summary.unchanged, 1);
}

#[test]
fn transient_errors_retry_permanent_errors_do_not() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_next("scope/ScopeA", Operation::Create, ErrorCategory::Transient, 2);
    backend.fail_next("scope/ScopeB", Operation::Create, ErrorCategory::Permission, 1);

    let report = apply(
        &backend,
        vec![Resource::scope("ScopeA"), Resource::scope("ScopeB")],
        &opts(),
    );
    let a = report.step(&ResourceKey::scope("ScopeA")).unwrap();
    assert!(a.result.is_success());
    assert_eq!(a.attempts, 3);

    let b = report.step(&ResourceKey::scope("ScopeB")).unwrap();
    assert!(b.result.is_failure());
    assert_eq!(b.attempts, 1);
}

#[test]
fn timed_out_step_fails_and_skips_dependents() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_delay(&ResourceKey::scope("ScopeA"), Duration::from_millis(500));

    let options = ExecuteOptions {
        step_timeout: Some(Duration::from_millis(50)),
        ..opts()
    };
    let report = apply(
        &backend,
        vec![
            Resource::scope("ScopeA"),
            Resource::new(ResourceKind::Network, "ScopeA", "vnet1"),
        ],
        &options,
    );

    assert_eq!(report.outcome, ApplyOutcome::PartialFailure);
    let StepResult::Failed { error } = &report.steps[0].result else {
        panic!("scope step should have timed out");
    };
    assert!(error.contains("timed out"));
    assert!(matches!(report.steps[1].result, StepResult::Skipped { .. }));
}

/// Highest number of overlapping `op` calls in the journal.
fn peak_in_flight(backend: &MemoryBackend, op: Operation) -> usize {
    let mut current = 0usize;
    let mut peak = 0;
    for entry in backend.journal().iter().filter(|e| e.op == op) {
        match entry.phase {
            CallPhase::Start => {
                current += 1;
                peak = peak.max(current);
            }
            CallPhase::End => current -= 1,
        }
    }
    peak
}

#[test]
fn independent_steps_overlap_up_to_the_job_limit() {
    let backend = Arc::new(MemoryBackend::new());
    let scopes: Vec<Resource> = ["ScopeA", "ScopeB", "ScopeC", "ScopeD", "ScopeE"]
        .into_iter()
        .map(Resource::scope)
        .collect();
    for scope in &scopes {
        backend.set_delay(&scope.key(), Duration::from_millis(40));
    }

    let options = ExecuteOptions { jobs: 2, ..opts() };
    let report = apply(&backend, scopes, &options);

    assert_eq!(report.outcome, ApplyOutcome::Succeeded);
    assert_eq!(report.summary.created, 5);
    assert_eq!(peak_in_flight(&backend, Operation::Create), 2);
}

#[test]
fn single_job_runs_steps_one_at_a_time() {
    let backend = Arc::new(MemoryBackend::new());
    let scopes: Vec<Resource> = ["ScopeA", "ScopeB", "ScopeC"].into_iter().map(Resource::scope).collect();
    for scope in &scopes {
        backend.set_delay(&scope.key(), Duration::from_millis(20));
    }

    let options = ExecuteOptions { jobs: 1, ..opts() };
    let report = apply(&backend, scopes, &options);

    assert_eq!(report.outcome, ApplyOutcome::Succeeded);
    assert_eq!(peak_in_flight(&backend, Operation::Create), 1);
}

#[test]
fn timed_out_step_keeps_its_slot_and_makes_no_further_calls() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_delay(&zone_key(), Duration::from_millis(400));

    let options = ExecuteOptions {
        jobs: 1,
        step_timeout: Some(Duration::from_millis(100)),
        ..opts()
    };
    let report = apply(
        &backend,
        vec![
            Resource::scope("ScopeA"),
            Resource::new(ResourceKind::PrivateZone, "ScopeA", "zone1.internal"),
            Resource::scope("ScopeB"),
        ],
        &options,
    );

    assert_eq!(report.outcome, ApplyOutcome::PartialFailure);
    let StepResult::Failed { error } = &report.step(&zone_key()).unwrap().result else {
        panic!("zone step should have timed out");
    };
    assert!(error.contains("timed out"), "{error}");

    // Waiting behind the slow step does not count against the waiter
    assert!(report.step(&ResourceKey::scope("ScopeB")).unwrap().result.is_success());
    assert_eq!(report.summary.created, 2);
    assert_eq!(report.summary.failed, 1);

    // The single slot stayed busy until the slow call returned
    let zone_created = backend
        .seq_of(zone_key(), Operation::Create, CallPhase::End)
        .unwrap();
    let other_started = backend
        .seq_of("scope/ScopeB", Operation::Create, CallPhase::Start)
        .unwrap();
    assert!(zone_created < other_started);
    assert_eq!(peak_in_flight(&backend, Operation::Create), 1);

    // Abandoned after the deadline: the zone is never linked
    assert!(
        backend
            .seq_of("ScopeA/zone1.internal", Operation::LinkZone, CallPhase::Start)
            .is_none()
    );
}

/// Requests cancellation as soon as the first step finishes.
struct CancelAfterFirst(CancelToken);

impl ProgressCallback for CancelAfterFirst {
    fn on_start(&mut self, _changes: usize) {}
    fn on_step_start(&mut self, _step: &PlanStep) {}
    fn on_step_complete(&mut self, _step: &PlanStep, _result: &StepResult) {
        self.0.cancel();
    }
    fn on_finish(&mut self) {}
}

#[test]
fn cancellation_stops_dispatch_and_is_not_a_failure() {
    let backend = Arc::new(MemoryBackend::new());
    let graph = Graph::build(vec![
        Resource::scope("ScopeA"),
        Resource::scope("ScopeB"),
        Resource::scope("ScopeC"),
    ])
    .unwrap();
    let plan = plan(&graph, &Snapshot::empty());

    let cancel = CancelToken::new();
    let options = ExecuteOptions {
        jobs: 1,
        cancel: cancel.clone(),
        ..opts()
    };
    let dyn_backend: Arc<dyn Backend> = backend.clone();
    let report = execute(
        &plan,
        dyn_backend,
        &options,
        &mut CancelAfterFirst(cancel),
        &mut AutoConfirm,
    )
    .unwrap();

    assert_eq!(report.outcome, ApplyOutcome::Cancelled);
    assert_eq!(report.summary.created, 1);
    assert_eq!(report.summary.skipped, 2);
    assert_eq!(report.summary.failed, 0);
}

#[test]
fn cancellation_after_the_last_step_is_still_success() {
    let backend = Arc::new(MemoryBackend::new());
    let graph = Graph::build(vec![Resource::scope("ScopeA")]).unwrap();
    let plan = plan(&graph, &Snapshot::empty());

    let cancel = CancelToken::new();
    let options = ExecuteOptions {
        cancel: cancel.clone(),
        ..opts()
    };
    let dyn_backend: Arc<dyn Backend> = backend.clone();
    let report = execute(
        &plan,
        dyn_backend,
        &options,
        &mut CancelAfterFirst(cancel.clone()),
        &mut AutoConfirm,
    )
    .unwrap();

    assert!(cancel.is_cancelled());
    assert_eq!(report.outcome, ApplyOutcome::Succeeded);
    assert_eq!(report.summary.created, 1);
    assert_eq!(report.summary.skipped, 0);
}

#[test]
fn absorbed_report_becomes_the_new_baseline() {
    let backend = Arc::new(MemoryBackend::new());
    let graph = Graph::build(e2e()).unwrap();
    let mut snapshot = Snapshot::capture(&graph, backend.as_ref(), 2).unwrap();
    let first = plan(&graph, &snapshot);

    let dyn_backend: Arc<dyn Backend> = backend.clone();
    let report = execute(&first, dyn_backend, &opts(), &mut NoProgress, &mut AutoConfirm).unwrap();
    snapshot.absorb(&report);

    let second = plan(&graph, &snapshot);
    assert!(!second.has_changes());
}

#[test]
fn teardown_removes_in_reverse_dependency_order() {
    let backend = Arc::new(MemoryBackend::new());
    apply(&backend, e2e(), &opts());

    let graph = Graph::build(e2e()).unwrap();
    let snapshot = Snapshot::capture(&graph, backend.as_ref(), 2).unwrap();
    let plan = plan_teardown(&graph, &snapshot, &TeardownOptions::default()).unwrap();
    let dyn_backend: Arc<dyn Backend> = backend.clone();
    let report = execute(&plan, dyn_backend, &opts(), &mut NoProgress, &mut AutoConfirm).unwrap();
    assert_eq!(report.outcome, ApplyOutcome::Succeeded);
    assert_eq!(report.summary.deleted, 3);

    let endpoint_gone = backend
        .seq_of(endpoint_key(), Operation::Delete, CallPhase::End)
        .unwrap();
    let zone_start = backend
        .seq_of(zone_key(), Operation::Delete, CallPhase::Start)
        .unwrap();
    let zone_gone = backend
        .seq_of(zone_key(), Operation::Delete, CallPhase::End)
        .unwrap();
    let scope_start = backend
        .seq_of("scope/ScopeA", Operation::Delete, CallPhase::Start)
        .unwrap();
    assert!(endpoint_gone < zone_start);
    assert!(zone_gone < scope_start);
    assert_eq!(backend.zones().record_count(), 0);
}

fn secret_store(purge_protection: bool) -> Vec<Resource> {
    vec![
        Resource::scope("ScopeA"),
        Resource::new(ResourceKind::SecretStore, "ScopeA", "kv-stratum-01")
            .with_property("soft_delete_enabled", true)
            .with_property("purge_protection", purge_protection),
    ]
}

#[test]
fn soft_removed_store_holds_its_name_until_purged() {
    let backend = Arc::new(MemoryBackend::new());
    apply(&backend, secret_store(false), &opts());

    let key = ResourceKey::new(ResourceKind::SecretStore, "ScopeA", "kv-stratum-01");
    let graph = Graph::build(secret_store(false)).unwrap();
    let snapshot = Snapshot::capture(&graph, backend.as_ref(), 2).unwrap();
    let soft = plan_teardown(
        &graph,
        &snapshot,
        &TeardownOptions {
            targets: vec![key.clone()],
            ..Default::default()
        },
    )
    .unwrap();
    let dyn_backend: Arc<dyn Backend> = backend.clone();
    execute(&soft, Arc::clone(&dyn_backend), &opts(), &mut NoProgress, &mut AutoConfirm).unwrap();

    assert_eq!(
        backend.name_availability(ResourceKind::SecretStore, "kv-stratum-01").unwrap(),
        NameAvailability::SoftDeleted
    );
    let findings = validate(&graph, backend.as_ref(), 2).unwrap();
    assert!(findings.has_fatal());

    let snapshot = Snapshot::capture(&graph, backend.as_ref(), 2).unwrap();
    let purge = plan_teardown(
        &graph,
        &snapshot,
        &TeardownOptions {
            mode: TeardownMode::Purge,
            confirm_purge: true,
            targets: vec![key],
        },
    )
    .unwrap();
    let report = execute(&purge, dyn_backend, &opts(), &mut NoProgress, &mut AutoConfirm).unwrap();
    assert_eq!(report.outcome, ApplyOutcome::Succeeded);
    assert_eq!(
        backend.name_availability(ResourceKind::SecretStore, "kv-stratum-01").unwrap(),
        NameAvailability::Available
    );
}

#[test]
fn purge_protected_store_cannot_be_purged() {
    let backend = Arc::new(MemoryBackend::new());
    apply(&backend, secret_store(true), &opts());

    let graph = Graph::build(secret_store(true)).unwrap();
    let snapshot = Snapshot::capture(&graph, backend.as_ref(), 2).unwrap();
    let err = plan_teardown(
        &graph,
        &snapshot,
        &TeardownOptions {
            mode: TeardownMode::Purge,
            confirm_purge: true,
            targets: Vec::new(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::PurgeProtected { .. }));
    assert_eq!(
        backend
            .get(&ResourceKey::new(ResourceKind::SecretStore, "ScopeA", "kv-stratum-01"))
            .unwrap()
            .and_then(|o| o.properties.get("purge_protection").cloned()),
        Some(Value::Bool(true))
    );
}

#[test]
fn local_backend_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("backend.json");

    {
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::open(&path, 90).unwrap());
        let graph = Graph::build(e2e()).unwrap();
        let snapshot = Snapshot::capture(&graph, backend.as_ref(), 2).unwrap();
        let plan = plan(&graph, &snapshot);
        let report = execute(&plan, backend, &opts(), &mut NoProgress, &mut AutoConfirm).unwrap();
        assert_eq!(report.outcome, ApplyOutcome::Succeeded);
    }

    let reopened = LocalBackend::open(&path, 90).unwrap();
    let graph = Graph::build(e2e()).unwrap();
    let snapshot = Snapshot::capture(&graph, &reopened, 2).unwrap();
    assert!(!plan(&graph, &snapshot).has_changes());
    assert_eq!(reopened.zones().record_count(), 1);
}
