//! File-persisted backend.
//!
//! Wraps a [`MemoryBackend`] and writes its state to a JSON file after
//! every mutating call, so successive CLI invocations see the same live
//! environment.

use super::Backend;
use super::memory::{BackendState, MemoryBackend};
use crate::error::Result;
use crate::types::{Access, Desired, NameAvailability, Observed, Removal, ResourceKey, ResourceKind};
use privdns::{UpsertOutcome, ZoneId, ZoneStore};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Backend whose state lives in a JSON file.
#[derive(Debug)]
pub struct LocalBackend {
    path: PathBuf,
    inner: MemoryBackend,
}

impl LocalBackend {
    /// Open the state file, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>, retention_days: i64) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str::<BackendState>(&content)?
        } else {
            log::debug!("No backend state at {}, starting empty", path.display());
            BackendState::default()
        };

        Ok(Self {
            path,
            inner: MemoryBackend::from_state(state).with_retention_days(retention_days),
        })
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared zone store, for resolvers.
    pub fn zones(&self) -> Arc<ZoneStore> {
        self.inner.zones()
    }

    /// Write current state to disk (temp file + rename).
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.inner.export())?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn persist<T>(&self, result: Result<T>) -> Result<T> {
        // Persist on failure too: a failed create can still leave state behind
        self.save()?;
        result
    }
}

impl Backend for LocalBackend {
    fn describe(&self) -> String {
        format!("local backend ({})", self.path.display())
    }

    fn get(&self, key: &ResourceKey) -> Result<Option<Observed>> {
        self.inner.get(key)
    }

    fn create(&self, key: &ResourceKey, desired: &Desired) -> Result<Observed> {
        self.persist(self.inner.create(key, desired))
    }

    fn update(&self, key: &ResourceKey, desired: &Desired) -> Result<Observed> {
        self.persist(self.inner.update(key, desired))
    }

    fn delete(&self, key: &ResourceKey, purge: bool) -> Result<Removal> {
        self.persist(self.inner.delete(key, purge))
    }

    fn name_availability(&self, kind: ResourceKind, name: &str) -> Result<NameAvailability> {
        self.inner.name_availability(kind, name)
    }

    fn check_access(&self, key: &ResourceKey, access: Access) -> Result<bool> {
        self.inner.check_access(key, access)
    }

    fn link_zone(&self, zone: &ZoneId, network: &str) -> Result<bool> {
        self.persist(self.inner.link_zone(zone, network))
    }

    fn upsert_record(&self, zone: &ZoneId, name: &str, address: IpAddr) -> Result<UpsertOutcome> {
        self.persist(self.inner.upsert_record(zone, name, address))
    }

    fn remove_record(&self, zone: &ZoneId, name: &str) -> Result<bool> {
        self.persist(self.inner.remove_record(zone, name))
    }
}
