//! Precondition validator: read-only checks against the live backend.
//!
//! Checks for different resources are independent, so they run on a
//! bounded rayon pool. Results are collected in declaration order (and
//! check order within a resource), never in completion order.

use crate::error::{Error, Result};
use crate::graph::{Graph, Node};
use crate::model::EdgeKind;
use crate::plan::immutable_drift;
use crate::schema::schema;
use cloudkit::{Access, Backend, NameAvailability, ResourceKey, Status, Value};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Fatal => f.write_str("fatal"),
        }
    }
}

/// One precondition result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFinding {
    pub severity: Severity,
    /// Offending resource (`kind/scope/name`)
    pub resource: String,
    pub message: String,
    pub remediation: String,
}

impl ValidationFinding {
    fn fatal(key: &ResourceKey, message: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            resource: key.to_string(),
            message: message.into(),
            remediation: remediation.into(),
        }
    }

    fn warning(key: &ResourceKey, message: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::fatal(key, message, remediation)
        }
    }

    fn backend(key: &ResourceKey, err: &cloudkit::Error) -> Self {
        Self::fatal(
            key,
            format!("backend check failed: {err}"),
            err.category().advice(),
        )
    }
}

/// All findings of one validation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub findings: Vec<ValidationFinding>,
}

impl ValidationReport {
    pub fn has_fatal(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Fatal)
    }

    pub fn fatal(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| f.severity == Severity::Fatal)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warning)
    }

    /// Turn fatal findings into [`Error::Validation`].
    pub fn into_result(self) -> Result<Self> {
        if self.has_fatal() {
            Err(Error::Validation {
                findings: self.fatal().cloned().collect(),
            })
        } else {
            Ok(self)
        }
    }
}

/// Run every precondition check on a pool of `jobs` threads.
pub fn validate(graph: &Graph, backend: &dyn Backend, jobs: usize) -> Result<ValidationReport> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let per_node: Vec<Vec<ValidationFinding>> = pool.install(|| {
        (0..graph.len())
            .into_par_iter()
            .map(|idx| check_node(graph, idx, backend))
            .collect()
    });

    let findings: Vec<ValidationFinding> = per_node.into_iter().flatten().collect();
    log::info!(
        "Validated {} resources: {} fatal, {} warning(s)",
        graph.len(),
        findings.iter().filter(|f| f.severity == Severity::Fatal).count(),
        findings.iter().filter(|f| f.severity == Severity::Warning).count()
    );
    Ok(ValidationReport { findings })
}

fn check_node(graph: &Graph, idx: usize, backend: &dyn Backend) -> Vec<ValidationFinding> {
    let node = graph.node(idx);
    let key = &node.key;
    let kind_schema = schema(key.kind);
    let mut findings = Vec::new();

    // Naming rules
    if let Err(message) = kind_schema.check_name(&key.name) {
        findings.push(ValidationFinding::fatal(
            key,
            message,
            "Rename the resource to satisfy the kind's naming rules",
        ));
    }

    // Secret-bearing properties must be references
    for (prop, value) in &node.resource.properties {
        if kind_schema.is_secret(prop) && !value.is_secret_ref() {
            findings.push(ValidationFinding::fatal(
                key,
                format!("property '{prop}' carries secret material inline"),
                "Store the value in a secret store and use { secret = { scope, store, entry } }",
            ));
        }
    }

    if node.resource.existing {
        check_existing(key, backend, &mut findings);
    } else {
        check_managed(node, backend, &mut findings);
    }

    // Requirements outside the declared set
    for ext in graph.externals_of(idx) {
        check_external(key, &ext.target, ext.via, backend, &mut findings);
    }

    check_referenced_security(graph, node, backend, &mut findings);

    if kind_schema.soft_delete
        && node.resource.properties.get("purge_protection").and_then(Value::as_bool) == Some(false)
    {
        findings.push(ValidationFinding::warning(
            key,
            "purge protection is disabled",
            "Set purge_protection = true so deleted data cannot be purged before retention expires",
        ));
    }

    findings
}

fn check_existing(key: &ResourceKey, backend: &dyn Backend, findings: &mut Vec<ValidationFinding>) {
    match backend.check_access(key, Access::Read) {
        Ok(true) => {}
        Ok(false) => {
            findings.push(ValidationFinding::fatal(
                key,
                "no read access to existing resource",
                "Grant read access on its scope to the deploying identity",
            ));
            return;
        }
        Err(e) => {
            findings.push(ValidationFinding::backend(key, &e));
            return;
        }
    }

    match backend.exists(key) {
        Ok(true) => {}
        Ok(false) => findings.push(ValidationFinding::fatal(
            key,
            "declared as existing but not found",
            "Create it first, fix the name/scope, or declare it without existing = true",
        )),
        Err(e) => findings.push(ValidationFinding::backend(key, &e)),
    }
}

fn check_managed(node: &Node, backend: &dyn Backend, findings: &mut Vec<ValidationFinding>) {
    let key = &node.key;

    match backend.check_access(key, Access::Write) {
        Ok(true) => {}
        Ok(false) => findings.push(ValidationFinding::fatal(
            key,
            format!("no write access to scope '{}'", access_scope(key)),
            "Grant the deploying identity a role that can create resources in the scope",
        )),
        Err(e) => findings.push(ValidationFinding::backend(key, &e)),
    }

    let observed = match backend.get(key) {
        Ok(observed) => observed,
        Err(e) => {
            findings.push(ValidationFinding::backend(key, &e));
            return;
        }
    };

    if observed.as_ref().is_some_and(|o| o.status == Status::SoftDeleted) {
        findings.push(ValidationFinding::fatal(
            key,
            "name is held by a soft-deleted resource",
            "Recover the soft-deleted resource, or purge it (destroy --purge) before re-creating",
        ));
        return;
    }

    // Replacing a soft-deletable kind purges the old copy first
    if let Some(live) = observed.as_ref().filter(|o| o.is_live())
        && schema(key.kind).soft_delete
        && live.flag("purge_protection") == Some(true)
    {
        let fields = immutable_drift(&node.resource, live);
        if !fields.is_empty() {
            let fields = fields.join(", ");
            findings.push(ValidationFinding::fatal(
                key,
                format!("changing {fields} requires a replace, but purge protection keeps the old name reserved"),
                format!("Restore the current value of {fields}, or declare the resource under a new name"),
            ));
        }
    }

    let ours_live = observed.as_ref().is_some_and(|o| o.is_live());
    if schema(key.kind).global_name && !ours_live {
        match backend.name_availability(key.kind, &key.name) {
            Ok(NameAvailability::Available) => {}
            Ok(NameAvailability::Taken) => findings.push(ValidationFinding::fatal(
                key,
                format!("{} name '{}' is already taken globally", key.kind, key.name),
                "Choose a different, globally unique name",
            )),
            Ok(NameAvailability::SoftDeleted) => findings.push(ValidationFinding::fatal(
                key,
                format!("{} name '{}' is reserved by a soft-deleted resource", key.kind, key.name),
                "Purge the soft-deleted resource or wait for its retention window to expire",
            )),
            Err(e) => findings.push(ValidationFinding::backend(key, &e)),
        }
    }
}

fn check_external(
    key: &ResourceKey,
    target: &ResourceKey,
    via: EdgeKind,
    backend: &dyn Backend,
    findings: &mut Vec<ValidationFinding>,
) {
    match backend.check_access(target, Access::Read) {
        Ok(true) => {}
        Ok(false) => {
            findings.push(ValidationFinding::fatal(
                key,
                format!("no read access to {target} (required via {via})"),
                "Grant read access on the referenced resource's scope",
            ));
            return;
        }
        Err(e) => {
            findings.push(ValidationFinding::backend(key, &e));
            return;
        }
    }

    match backend.exists(target) {
        Ok(true) => {}
        Ok(false) => findings.push(ValidationFinding::fatal(
            key,
            format!("requires {target} (via {via}), which is neither declared nor present"),
            format!("Declare {target} in the document, or create it before deploying"),
        )),
        Err(e) => findings.push(ValidationFinding::backend(key, &e)),
    }
}

/// Security requirements of referenced resources must already hold.
fn check_referenced_security(
    graph: &Graph,
    node: &Node,
    backend: &dyn Backend,
    findings: &mut Vec<ValidationFinding>,
) {
    for (target, via) in node.resource.references() {
        if via == EdgeKind::Scope {
            continue;
        }
        let target_schema = schema(target.kind);
        if target_schema.required_when_referenced.is_empty() {
            continue;
        }

        let unmet = match graph.index_of(&target) {
            Some(i) if !graph.node(i).resource.existing => {
                target_schema.unmet_requirements(&graph.node(i).resource.properties)
            }
            _ => match backend.get(&target) {
                Ok(Some(observed)) => target_schema.unmet_requirements(&observed.properties),
                // Absence is reported by the existence checks
                Ok(None) => continue,
                Err(e) => {
                    findings.push(ValidationFinding::backend(&node.key, &e));
                    continue;
                }
            },
        };

        if !unmet.is_empty() {
            findings.push(ValidationFinding::fatal(
                &node.key,
                format!("referenced {target} does not meet: {}", unmet.join(", ")),
                format!("Set {} on {target} before referencing it", unmet.join(", ")),
            ));
        }
    }
}

fn access_scope(key: &ResourceKey) -> &str {
    if key.scope.is_empty() { &key.name } else { &key.scope }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Resource;
    use cloudkit::{Desired, MemoryBackend, ResourceKind, SecretRef};

    fn validate_all(resources: Vec<Resource>, backend: &MemoryBackend) -> ValidationReport {
        let graph = Graph::build(resources).unwrap();
        validate(&graph, backend, 4).unwrap()
    }

    fn protected_store(scope: &str, name: &str) -> Resource {
        Resource::new(ResourceKind::SecretStore, scope, name)
            .with_property("soft_delete_enabled", true)
            .with_property("purge_protection", true)
    }

    #[test]
    fn test_clean_document_has_no_findings() {
        let backend = MemoryBackend::new();
        let report = validate_all(
            vec![
                Resource::scope("ScopeA"),
                Resource::new(ResourceKind::PrivateZone, "ScopeA", "zone1.internal"),
                Resource::new(ResourceKind::Endpoint, "ScopeA", "Endpoint1")
                    .joining(&["zone1.internal"]),
            ],
            &backend,
        );
        assert!(report.findings.is_empty(), "{:?}", report.findings);
    }

    #[test]
    fn test_missing_external_scope_is_fatal() {
        let backend = MemoryBackend::new();
        let report = validate_all(
            vec![Resource::new(ResourceKind::Network, "ScopeX", "vnet1")],
            &backend,
        );
        assert!(report.has_fatal());
        assert_eq!(report.findings[0].resource, "network/ScopeX/vnet1");
        assert!(report.findings[0].message.contains("scope/ScopeX"));

        backend
            .create(&ResourceKey::scope("ScopeX"), &Desired::default())
            .unwrap();
        let report = validate_all(
            vec![Resource::new(ResourceKind::Network, "ScopeX", "vnet1")],
            &backend,
        );
        assert!(!report.has_fatal());
    }

    #[test]
    fn test_existing_resource_must_be_present() {
        let backend = MemoryBackend::new();
        let report = validate_all(
            vec![Resource::scope("Shared").existing()],
            &backend,
        );
        assert_eq!(report.fatal().count(), 1);
        assert!(report.findings[0].message.contains("not found"));
    }

    #[test]
    fn test_name_collisions() {
        let backend = MemoryBackend::new();
        backend.reserve_name(ResourceKind::SecretStore, "kv-taken");

        let soft = ResourceKey::new(ResourceKind::SecretStore, "ScopeA", "kv-soft");
        backend.create(&soft, &Desired::default()).unwrap();
        backend.delete(&soft, false).unwrap();

        let report = validate_all(
            vec![
                Resource::scope("ScopeA"),
                protected_store("ScopeA", "kv-taken"),
                protected_store("ScopeA", "kv-soft"),
                protected_store("ScopeB", "kv-soft"),
            ],
            &backend,
        );

        let messages: Vec<(&str, &str)> = report
            .fatal()
            .map(|f| (f.resource.as_str(), f.message.as_str()))
            .collect();
        assert!(messages.iter().any(|(r, m)| *r == "secret-store/ScopeA/kv-taken" && m.contains("taken")));
        assert!(messages.iter().any(|(r, m)| *r == "secret-store/ScopeA/kv-soft" && m.contains("soft-deleted")));
        assert!(messages.iter().any(|(r, m)| *r == "secret-store/ScopeB/kv-soft" && m.contains("reserved")));
    }

    #[test]
    fn test_inline_secret_is_fatal() {
        let backend = MemoryBackend::new();
        let inline = Resource::new(ResourceKind::Gateway, "ScopeA", "gw1")
            .with_property("shared_key", "hunter2");
        let referenced = Resource::new(ResourceKind::Gateway, "ScopeA", "gw2").with_property(
            "shared_key",
            Value::secret(SecretRef {
                scope: "ScopeA".into(),
                store: "kv-app".into(),
                entry: "psk".into(),
            }),
        );

        let report = validate_all(
            vec![
                Resource::scope("ScopeA"),
                protected_store("ScopeA", "kv-app"),
                inline,
                referenced,
            ],
            &backend,
        );
        let fatal: Vec<&ValidationFinding> = report.fatal().collect();
        assert_eq!(fatal.len(), 1);
        assert_eq!(fatal[0].resource, "gateway/ScopeA/gw1");
    }

    #[test]
    fn test_referenced_store_must_be_protected() {
        let backend = MemoryBackend::new();
        let weak = Resource::new(ResourceKind::SecretStore, "ScopeA", "kv-weak")
            .with_property("purge_protection", false);
        let endpoint = Resource::new(ResourceKind::Endpoint, "ScopeA", "pe-kv").with_property(
            "target",
            Value::reference("secret-store/kv-weak".parse().unwrap()),
        );

        let report = validate_all(vec![Resource::scope("ScopeA"), weak, endpoint], &backend);

        let fatal: Vec<&ValidationFinding> = report.fatal().collect();
        assert_eq!(fatal.len(), 1);
        assert_eq!(fatal[0].resource, "endpoint/ScopeA/pe-kv");
        assert!(fatal[0].message.contains("purge_protection = true"));
        // The store itself only gets a warning
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_write_permission() {
        let backend = MemoryBackend::new();
        backend.deny_access("ScopeA", Access::Write);
        let report = validate_all(
            vec![
                Resource::scope("ScopeA"),
                Resource::new(ResourceKind::Network, "ScopeA", "vnet1"),
            ],
            &backend,
        );
        assert_eq!(report.fatal().count(), 2);
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_protected_store_cannot_be_replaced() {
        let backend = MemoryBackend::new();
        let deployed = protected_store("ScopeA", "kv-app").with_property("location", "westeurope");
        backend.create(&deployed.key(), &deployed.desired()).unwrap();

        let moved = protected_store("ScopeA", "kv-app").with_property("location", "northeurope");
        let report = validate_all(vec![Resource::scope("ScopeA"), moved], &backend);
        let fatal: Vec<_> = report.fatal().collect();
        assert_eq!(fatal.len(), 1);
        assert_eq!(fatal[0].resource, "secret-store/ScopeA/kv-app");
        assert!(fatal[0].message.contains("location"));
        assert!(fatal[0].remediation.contains("new name"));

        // In-place drift stays allowed
        let tagged = protected_store("ScopeA", "kv-app")
            .with_property("location", "westeurope")
            .with_property("sku", "premium");
        let report = validate_all(vec![Resource::scope("ScopeA"), tagged], &backend);
        assert!(!report.has_fatal());
    }

    #[test]
    fn test_unprotected_store_can_be_replaced() {
        let backend = MemoryBackend::new();
        let deployed = Resource::new(ResourceKind::SecretStore, "ScopeA", "kv-app")
            .with_property("location", "westeurope")
            .with_property("purge_protection", false);
        backend.create(&deployed.key(), &deployed.desired()).unwrap();

        let moved = Resource::new(ResourceKind::SecretStore, "ScopeA", "kv-app")
            .with_property("location", "northeurope")
            .with_property("purge_protection", false);
        let report = validate_all(vec![Resource::scope("ScopeA"), moved], &backend);
        assert!(!report.has_fatal());
    }

    #[test]
    fn test_findings_follow_declaration_order() {
        let backend = MemoryBackend::new();
        let resources: Vec<Resource> = (0..20)
            .map(|i| Resource::new(ResourceKind::Network, "Missing", format!("vnet{i:02}")))
            .collect();

        let first = validate_all(resources.clone(), &backend);
        let second = validate_all(resources, &backend);
        assert_eq!(first.findings, second.findings);
        assert_eq!(first.findings[0].resource, "network/Missing/vnet00");
        assert_eq!(first.findings[19].resource, "network/Missing/vnet19");
    }
}
