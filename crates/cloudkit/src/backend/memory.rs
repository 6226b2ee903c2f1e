//! In-memory backend.
//!
//! Keeps live resources, the soft-deleted namespace and private zones in
//! process. Used directly by tests and wrapped by [`super::LocalBackend`]
//! for persistence. Faults, access denials and slow calls can be injected
//! per resource; every call is journaled with a global sequence number so
//! callers can assert on ordering.

use super::Backend;
use crate::error::{Error, ErrorCategory, Result};
use crate::types::{
    Access, Desired, NameAvailability, Observed, Removal, ResourceKey, ResourceKind, Status, Value,
};
use chrono::Utc;
use privdns::{PrivateZone, UpsertOutcome, ZoneId, ZoneStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Default retention of soft-deleted resources.
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// First host number handed out to endpoints (10.0.0.4).
const FIRST_HOST: u32 = 4;

/// Backend operation, as recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    Update,
    Delete,
    NameAvailability,
    CheckAccess,
    LinkZone,
    UpsertRecord,
    RemoveRecord,
}

impl Operation {
    /// Whether the operation changes backend state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::Create
                | Operation::Update
                | Operation::Delete
                | Operation::LinkZone
                | Operation::UpsertRecord
                | Operation::RemoveRecord
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::NameAvailability => "name-availability",
            Operation::CheckAccess => "check-access",
            Operation::LinkZone => "link-zone",
            Operation::UpsertRecord => "upsert-record",
            Operation::RemoveRecord => "remove-record",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Start,
    End,
}

/// One journaled call boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub seq: u64,
    pub op: Operation,
    /// Resource key or zone id, as text
    pub target: String,
    pub phase: CallPhase,
    /// For `End` entries: whether the call succeeded
    pub ok: bool,
}

/// Serializable backend state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendState {
    #[serde(default)]
    pub resources: BTreeMap<ResourceKey, Observed>,
    /// Names held by other tenants, as `kind/name` (lowercase)
    #[serde(default)]
    pub reserved: BTreeSet<String>,
    #[serde(default)]
    pub zones: Vec<PrivateZone>,
    #[serde(default = "first_host")]
    pub next_host: u32,
}

fn first_host() -> u32 {
    FIRST_HOST
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            resources: BTreeMap::new(),
            reserved: BTreeSet::new(),
            zones: Vec::new(),
            next_host: FIRST_HOST,
        }
    }
}

#[derive(Debug)]
struct Fault {
    target: String,
    op: Operation,
    category: ErrorCategory,
    remaining: u32,
}

#[derive(Debug, Default)]
struct Inner {
    resources: BTreeMap<ResourceKey, Observed>,
    reserved: BTreeSet<String>,
    next_host: u32,
    faults: Vec<Fault>,
    provisioning_failures: BTreeSet<ResourceKey>,
    denied: BTreeSet<(String, Access)>,
    delays: BTreeMap<ResourceKey, Duration>,
    journal: Vec<JournalEntry>,
    seq: u64,
}

impl Inner {
    fn record(&mut self, op: Operation, target: &str, phase: CallPhase, ok: bool) {
        self.seq += 1;
        self.journal.push(JournalEntry {
            seq: self.seq,
            op,
            target: target.to_string(),
            phase,
            ok,
        });
    }

    fn take_fault(&mut self, op: Operation, target: &str) -> Option<Error> {
        let fault = self
            .faults
            .iter_mut()
            .find(|f| f.op == op && f.target == target && f.remaining > 0)?;
        fault.remaining -= 1;
        Some(Error::from_category(
            fault.category,
            format!("injected {op} failure on {target}"),
        ))
    }

    /// Drop soft-deleted resources whose retention window has passed.
    fn sweep(&mut self, retention: chrono::Duration) {
        let now = Utc::now();
        self.resources.retain(|key, observed| {
            let expired = observed.status == Status::SoftDeleted
                && observed.deleted_at.is_some_and(|at| at + retention <= now);
            if expired {
                log::debug!("Retention expired for {key}");
            }
            !expired
        });
    }

    fn allocate_address(&mut self) -> IpAddr {
        let host = self.next_host.max(FIRST_HOST);
        self.next_host = host + 1;
        IpAddr::V4(Ipv4Addr::from(u32::from(Ipv4Addr::new(10, 0, 0, 0)) + host))
    }

    fn is_allowed(&self, key: &ResourceKey, access: Access) -> bool {
        let scope = if key.scope.is_empty() { &key.name } else { &key.scope };
        !self.denied.contains(&(scope.clone(), access))
    }

    /// Whether another resource holds `name` in the global namespace.
    fn global_holder(&self, kind: ResourceKind, name: &str, except: Option<&ResourceKey>) -> Option<Status> {
        self.resources
            .iter()
            .filter(|(k, _)| Some(*k) != except)
            .find(|(k, _)| k.kind == kind && k.name.eq_ignore_ascii_case(name))
            .map(|(_, o)| o.status)
    }
}

/// In-memory backend.
#[derive(Debug)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    zones: Arc<ZoneStore>,
    retention: chrono::Duration,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::from_state(BackendState::default())
    }

    /// Rebuild a backend from exported state.
    pub fn from_state(state: BackendState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                resources: state.resources,
                reserved: state.reserved,
                next_host: state.next_host,
                ..Inner::default()
            }),
            zones: Arc::new(ZoneStore::from_zones(state.zones)),
            retention: chrono::Duration::days(DEFAULT_RETENTION_DAYS),
        }
    }

    /// Set the soft-delete retention window, builder style.
    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention = chrono::Duration::days(days);
        self
    }

    /// Export state for persistence.
    pub fn export(&self) -> BackendState {
        let inner = self.lock();
        BackendState {
            resources: inner.resources.clone(),
            reserved: inner.reserved.clone(),
            zones: self.zones.zones(),
            next_host: inner.next_host.max(FIRST_HOST),
        }
    }

    /// Shared zone store, for resolvers.
    pub fn zones(&self) -> Arc<ZoneStore> {
        Arc::clone(&self.zones)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Seeding and fault injection
    // =========================================================================

    /// Seed a resource directly (no journal entry).
    pub fn insert(&self, key: ResourceKey, observed: Observed) {
        if key.kind == ResourceKind::PrivateZone && observed.is_live() {
            let alias = observed.properties.get("public_alias").and_then(Value::as_str);
            self.zones.ensure_zone(&ZoneId::new(key.scope.clone(), &key.name), alias);
        }
        self.lock().resources.insert(key, observed);
    }

    /// Mark a name as held by another tenant in the global namespace.
    pub fn reserve_name(&self, kind: ResourceKind, name: &str) {
        self.lock()
            .reserved
            .insert(format!("{kind}/{}", name.to_ascii_lowercase()));
    }

    /// Fail the next `times` calls of `op` on `target` with an error of `category`.
    pub fn fail_next(&self, target: impl fmt::Display, op: Operation, category: ErrorCategory, times: u32) {
        self.lock().faults.push(Fault {
            target: target.to_string(),
            op,
            category,
            remaining: times,
        });
    }

    /// Make the next create/update of `key` end in `Failed` status.
    pub fn fail_provisioning(&self, key: &ResourceKey) {
        self.lock().provisioning_failures.insert(key.clone());
    }

    /// Deny an access level on a scope.
    pub fn deny_access(&self, scope: &str, access: Access) {
        self.lock().denied.insert((scope.to_string(), access));
    }

    /// Delay create/update/delete calls on `key`.
    pub fn set_delay(&self, key: &ResourceKey, delay: Duration) {
        self.lock().delays.insert(key.clone(), delay);
    }

    // =========================================================================
    // Journal
    // =========================================================================

    /// Copy of the call journal.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.lock().journal.clone()
    }

    /// Forget all journaled calls.
    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    /// Number of mutating calls started.
    pub fn mutation_count(&self) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|e| e.phase == CallPhase::Start && e.op.is_mutation())
            .count()
    }

    /// Sequence number of the first `phase` entry for `op` on `target`.
    pub fn seq_of(&self, target: impl fmt::Display, op: Operation, phase: CallPhase) -> Option<u64> {
        let target = target.to_string();
        self.lock()
            .journal
            .iter()
            .find(|e| e.target == target && e.op == op && e.phase == phase)
            .map(|e| e.seq)
    }

    /// Run one journaled call.
    fn call<T>(
        &self,
        op: Operation,
        target: String,
        delay_key: Option<&ResourceKey>,
        f: impl FnOnce(&mut Inner) -> Result<T>,
    ) -> Result<T> {
        let delay = {
            let mut inner = self.lock();
            inner.record(op, &target, CallPhase::Start, true);
            delay_key.and_then(|k| inner.delays.get(k).copied())
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        let mut inner = self.lock();
        inner.sweep(self.retention);
        let result = match inner.take_fault(op, &target) {
            Some(err) => Err(err),
            None => f(&mut *inner),
        };
        inner.record(op, &target, CallPhase::End, result.is_ok());
        result
    }

    /// Build observed state from a desired state.
    fn materialize(&self, inner: &mut Inner, key: &ResourceKey, desired: &Desired, previous: Option<&Observed>) -> Observed {
        let mut properties = desired.properties.clone();
        properties.insert("id".to_string(), Value::String(key.to_string()));

        if key.kind == ResourceKind::Endpoint && !properties.contains_key("address") {
            let address = previous
                .and_then(|p| p.properties.get("address").cloned())
                .unwrap_or_else(|| Value::String(inner.allocate_address().to_string()));
            properties.insert("address".to_string(), address);
        }

        if key.kind == ResourceKind::PrivateZone {
            let alias = properties.get("public_alias").and_then(Value::as_str);
            self.zones.ensure_zone(&ZoneId::new(key.scope.clone(), &key.name), alias);
        }

        let status = if inner.provisioning_failures.remove(key) {
            Status::Failed
        } else {
            Status::Succeeded
        };

        Observed {
            status,
            properties,
            tags: desired.tags.clone(),
            deleted_at: None,
        }
    }

    fn store(inner: &mut Inner, key: &ResourceKey, observed: Observed) -> Result<Observed> {
        inner.resources.insert(key.clone(), observed.clone());
        if observed.status == Status::Failed {
            return Err(Error::Other(format!("provisioning of {key} failed")));
        }
        Ok(observed)
    }

    fn require_write(inner: &Inner, key: &ResourceKey) -> Result<()> {
        if inner.is_allowed(key, Access::Write) {
            Ok(())
        } else {
            Err(Error::Permission {
                message: format!("write access to {key} denied"),
            })
        }
    }
}

impl Backend for MemoryBackend {
    fn describe(&self) -> String {
        "in-memory backend".to_string()
    }

    fn get(&self, key: &ResourceKey) -> Result<Option<Observed>> {
        self.call(Operation::Get, key.to_string(), None, |inner| {
            if !inner.is_allowed(key, Access::Read) {
                return Err(Error::Permission {
                    message: format!("read access to {key} denied"),
                });
            }
            Ok(inner.resources.get(key).cloned())
        })
    }

    fn create(&self, key: &ResourceKey, desired: &Desired) -> Result<Observed> {
        self.call(Operation::Create, key.to_string(), Some(key), |inner| {
            Self::require_write(inner, key)?;

            match inner.resources.get(key) {
                Some(o) if o.status == Status::SoftDeleted => {
                    return Err(Error::Conflict {
                        message: format!("{key} is soft-deleted; recover or purge it first"),
                    });
                }
                Some(o) if o.status != Status::Failed => {
                    return Err(Error::Conflict {
                        message: format!("{key} already exists"),
                    });
                }
                _ => {}
            }

            if key.kind.globally_unique() {
                let reserved = format!("{}/{}", key.kind, key.name.to_ascii_lowercase());
                if inner.reserved.contains(&reserved)
                    || inner.global_holder(key.kind, &key.name, Some(key)).is_some()
                {
                    return Err(Error::Conflict {
                        message: format!("name '{}' is already taken", key.name),
                    });
                }
            }

            let previous = inner.resources.get(key).cloned();
            let observed = self.materialize(inner, key, desired, previous.as_ref());
            Self::store(inner, key, observed)
        })
    }

    fn update(&self, key: &ResourceKey, desired: &Desired) -> Result<Observed> {
        self.call(Operation::Update, key.to_string(), Some(key), |inner| {
            Self::require_write(inner, key)?;

            let previous = match inner.resources.get(key) {
                Some(o) if o.is_live() => o.clone(),
                _ => {
                    return Err(Error::NotFound {
                        resource: key.to_string(),
                    });
                }
            };
            let observed = self.materialize(inner, key, desired, Some(&previous));
            Self::store(inner, key, observed)
        })
    }

    fn delete(&self, key: &ResourceKey, purge: bool) -> Result<Removal> {
        self.call(Operation::Delete, key.to_string(), Some(key), |inner| {
            Self::require_write(inner, key)?;

            let Some(observed) = inner.resources.get_mut(key) else {
                return Err(Error::NotFound {
                    resource: key.to_string(),
                });
            };

            let protected = observed.flag("purge_protection") == Some(true);
            if purge && protected {
                return Err(Error::PurgeProtected {
                    resource: key.to_string(),
                });
            }

            let soft = key.kind.supports_soft_delete()
                && observed.flag("soft_delete_enabled") != Some(false);

            if soft && !purge {
                if observed.status != Status::SoftDeleted {
                    observed.status = Status::SoftDeleted;
                    observed.deleted_at = Some(Utc::now());
                }
                return Ok(Removal::SoftDeleted);
            }

            inner.resources.remove(key);
            if key.kind == ResourceKind::PrivateZone {
                self.zones.remove_zone(&ZoneId::new(key.scope.clone(), &key.name));
            }
            Ok(if soft { Removal::Purged } else { Removal::Deleted })
        })
    }

    fn name_availability(&self, kind: ResourceKind, name: &str) -> Result<NameAvailability> {
        self.call(Operation::NameAvailability, format!("{kind}/{name}"), None, |inner| {
            if inner
                .reserved
                .contains(&format!("{kind}/{}", name.to_ascii_lowercase()))
            {
                return Ok(NameAvailability::Taken);
            }
            Ok(match inner.global_holder(kind, name, None) {
                None => NameAvailability::Available,
                Some(Status::SoftDeleted) => NameAvailability::SoftDeleted,
                Some(_) => NameAvailability::Taken,
            })
        })
    }

    fn check_access(&self, key: &ResourceKey, access: Access) -> Result<bool> {
        self.call(Operation::CheckAccess, key.to_string(), None, |inner| {
            Ok(inner.is_allowed(key, access))
        })
    }

    fn link_zone(&self, zone: &ZoneId, network: &str) -> Result<bool> {
        self.call(Operation::LinkZone, zone.to_string(), None, |_| {
            Ok(self.zones.link(zone, network)?)
        })
    }

    fn upsert_record(&self, zone: &ZoneId, name: &str, address: IpAddr) -> Result<UpsertOutcome> {
        self.call(Operation::UpsertRecord, zone.to_string(), None, |_| {
            Ok(self.zones.upsert_record(zone, name, address)?)
        })
    }

    fn remove_record(&self, zone: &ZoneId, name: &str) -> Result<bool> {
        self.call(Operation::RemoveRecord, zone.to_string(), None, |_| {
            match self.zones.remove_record(zone, name) {
                Ok(removed) => Ok(removed),
                // Zone already gone: nothing left to remove
                Err(privdns::Error::ZoneNotFound { .. }) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Properties;

    fn key(kind: ResourceKind, scope: &str, name: &str) -> ResourceKey {
        ResourceKey::new(kind, scope, name)
    }

    fn desired(props: &[(&str, Value)]) -> Desired {
        Desired {
            properties: props
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect::<Properties>(),
            tags: Default::default(),
        }
    }

    #[test]
    fn test_create_get_update() {
        let backend = MemoryBackend::new();
        let k = key(ResourceKind::Network, "ScopeA", "vnet1");

        assert!(!backend.exists(&k).unwrap());
        backend
            .create(&k, &desired(&[("address_space", "10.0.0.0/16".into())]))
            .unwrap();
        assert!(backend.exists(&k).unwrap());

        let observed = backend.get(&k).unwrap().unwrap();
        assert_eq!(observed.status, Status::Succeeded);
        assert_eq!(observed.properties["id"], Value::from("network/ScopeA/vnet1"));

        backend
            .update(&k, &desired(&[("address_space", "10.1.0.0/16".into())]))
            .unwrap();
        let observed = backend.get(&k).unwrap().unwrap();
        assert_eq!(observed.properties["address_space"], Value::from("10.1.0.0/16"));

        let err = backend.create(&k, &Desired::default()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend
            .update(&key(ResourceKind::Gateway, "ScopeA", "gw"), &Desired::default())
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_endpoint_gets_allocated_address() {
        let backend = MemoryBackend::new();
        let a = backend
            .create(&key(ResourceKind::Endpoint, "ScopeA", "e1"), &Desired::default())
            .unwrap();
        let b = backend
            .create(&key(ResourceKind::Endpoint, "ScopeA", "e2"), &Desired::default())
            .unwrap();
        assert_eq!(a.properties["address"], Value::from("10.0.0.4"));
        assert_eq!(b.properties["address"], Value::from("10.0.0.5"));

        // Address is stable across updates
        let a2 = backend
            .update(&key(ResourceKind::Endpoint, "ScopeA", "e1"), &Desired::default())
            .unwrap();
        assert_eq!(a2.properties["address"], Value::from("10.0.0.4"));
    }

    #[test]
    fn test_soft_delete_then_purge() {
        let backend = MemoryBackend::new();
        let k = key(ResourceKind::SecretStore, "ScopeA", "kv1");
        backend
            .create(&k, &desired(&[("soft_delete_enabled", true.into())]))
            .unwrap();

        assert_eq!(backend.delete(&k, false).unwrap(), Removal::SoftDeleted);
        assert!(!backend.exists(&k).unwrap());
        assert_eq!(
            backend.name_availability(ResourceKind::SecretStore, "KV1").unwrap(),
            NameAvailability::SoftDeleted
        );

        // Name stays reserved while soft-deleted
        let err = backend.create(&k, &Desired::default()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Conflict);

        assert_eq!(backend.delete(&k, true).unwrap(), Removal::Purged);
        assert_eq!(
            backend.name_availability(ResourceKind::SecretStore, "kv1").unwrap(),
            NameAvailability::Available
        );
    }

    #[test]
    fn test_purge_protection_blocks_purge() {
        let backend = MemoryBackend::new();
        let k = key(ResourceKind::SecretStore, "ScopeA", "kv1");
        backend
            .create(&k, &desired(&[("purge_protection", true.into())]))
            .unwrap();

        let err = backend.delete(&k, true).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::PurgeProtected);
        assert!(backend.exists(&k).unwrap());
    }

    #[test]
    fn test_retention_expiry_frees_name() {
        let backend = MemoryBackend::new().with_retention_days(0);
        let k = key(ResourceKind::SecretStore, "ScopeA", "kv1");
        backend.create(&k, &Desired::default()).unwrap();
        backend.delete(&k, false).unwrap();

        assert_eq!(backend.get(&k).unwrap(), None);
    }

    #[test]
    fn test_global_names_and_reservations() {
        let backend = MemoryBackend::new();
        backend
            .create(&key(ResourceKind::SecretStore, "ScopeA", "kv1"), &Desired::default())
            .unwrap();
        backend.reserve_name(ResourceKind::SecretStore, "Contoso-KV");

        let err = backend
            .create(&key(ResourceKind::SecretStore, "ScopeB", "kv1"), &Desired::default())
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Conflict);
        assert_eq!(
            backend.name_availability(ResourceKind::SecretStore, "contoso-kv").unwrap(),
            NameAvailability::Taken
        );

        // Scope-local kinds may reuse names across scopes
        backend
            .create(&key(ResourceKind::Network, "ScopeA", "vnet"), &Desired::default())
            .unwrap();
        backend
            .create(&key(ResourceKind::Network, "ScopeB", "vnet"), &Desired::default())
            .unwrap();
    }

    #[test]
    fn test_injected_faults_are_consumed() {
        let backend = MemoryBackend::new();
        let k = key(ResourceKind::Gateway, "ScopeA", "gw");
        backend.fail_next(&k, Operation::Create, ErrorCategory::Transient, 2);

        assert!(backend.create(&k, &Desired::default()).unwrap_err().is_retryable());
        assert!(backend.create(&k, &Desired::default()).unwrap_err().is_retryable());
        backend.create(&k, &Desired::default()).unwrap();
    }

    #[test]
    fn test_provisioning_failure_leaves_failed_status() {
        let backend = MemoryBackend::new();
        let k = key(ResourceKind::Gateway, "ScopeA", "gw");
        backend.fail_provisioning(&k);

        assert!(backend.create(&k, &Desired::default()).is_err());
        assert_eq!(backend.get(&k).unwrap().unwrap().status, Status::Failed);

        // A failed resource can be re-created
        backend.create(&k, &Desired::default()).unwrap();
        assert_eq!(backend.get(&k).unwrap().unwrap().status, Status::Succeeded);
    }

    #[test]
    fn test_access_denial() {
        let backend = MemoryBackend::new();
        backend.deny_access("ScopeA", Access::Write);
        let k = key(ResourceKind::Network, "ScopeA", "vnet");

        assert!(!backend.check_access(&k, Access::Write).unwrap());
        assert!(backend.check_access(&k, Access::Read).unwrap());
        let err = backend.create(&k, &Desired::default()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_zone_lifecycle_and_journal() {
        let backend = MemoryBackend::new();
        let zk = key(ResourceKind::PrivateZone, "ScopeA", "zone1.internal");
        let zone = ZoneId::new("ScopeA", "zone1.internal");

        backend.create(&zk, &Desired::default()).unwrap();
        backend.link_zone(&zone, "ScopeA").unwrap();
        let addr: IpAddr = "10.0.0.4".parse().unwrap();
        assert_eq!(
            backend.upsert_record(&zone, "endpoint1", addr).unwrap(),
            UpsertOutcome::Created
        );
        assert_eq!(
            backend.upsert_record(&zone, "endpoint1", addr).unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(backend.zones().record_count(), 1);
        assert_eq!(backend.mutation_count(), 4);

        let created = backend.seq_of(&zk, Operation::Create, CallPhase::End).unwrap();
        let linked = backend.seq_of(&zone, Operation::LinkZone, CallPhase::Start).unwrap();
        assert!(created < linked);

        backend.delete(&zk, false).unwrap();
        assert!(backend.zones().zone(&zone).is_none());
        assert!(!backend.remove_record(&zone, "endpoint1").unwrap());
    }

    #[test]
    fn test_export_and_restore() {
        let backend = MemoryBackend::new();
        let zk = key(ResourceKind::PrivateZone, "ScopeA", "zone1.internal");
        backend.create(&zk, &Desired::default()).unwrap();
        backend
            .create(&key(ResourceKind::Endpoint, "ScopeA", "e1"), &Desired::default())
            .unwrap();

        let json = serde_json::to_string(&backend.export()).unwrap();
        let restored = MemoryBackend::from_state(serde_json::from_str(&json).unwrap());

        assert!(restored.exists(&zk).unwrap());
        assert_eq!(restored.zones().zones().len(), 1);
        let next = restored
            .create(&key(ResourceKind::Endpoint, "ScopeA", "e2"), &Desired::default())
            .unwrap();
        assert_eq!(next.properties["address"], Value::from("10.0.0.5"));
    }
}
