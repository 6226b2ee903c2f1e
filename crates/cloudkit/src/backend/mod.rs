//! Backend abstraction for resource provisioning.
//!
//! The [`Backend`] trait is the boundary to the system that actually
//! provisions networks, secret stores, gateways and endpoints. Two
//! implementations ship with the crate:
//! - [`MemoryBackend`]: in-process state with fault injection and a call journal
//! - [`LocalBackend`]: the same state persisted to a JSON file between runs

pub mod local;
pub mod memory;

pub use local::LocalBackend;
pub use memory::{BackendState, CallPhase, JournalEntry, MemoryBackend, Operation};

use crate::error::Result;
use crate::types::{Access, Desired, NameAvailability, Observed, Removal, ResourceKey, ResourceKind};
use privdns::{UpsertOutcome, ZoneId};
use std::net::IpAddr;

/// Backend trait for provisioning operations.
///
/// Implementations must be safe to call from several worker threads at once.
pub trait Backend: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Whether a live (not soft-deleted) resource exists.
    fn exists(&self, key: &ResourceKey) -> Result<bool> {
        Ok(self.get(key)?.is_some_and(|o| o.is_live()))
    }

    /// Read a resource, including soft-deleted ones.
    fn get(&self, key: &ResourceKey) -> Result<Option<Observed>>;

    /// Create a resource.
    fn create(&self, key: &ResourceKey, desired: &Desired) -> Result<Observed>;

    /// Update a live resource in place.
    fn update(&self, key: &ResourceKey, desired: &Desired) -> Result<Observed>;

    /// Delete a resource. With `purge`, soft-deleted state is skipped or removed.
    fn delete(&self, key: &ResourceKey, purge: bool) -> Result<Removal>;

    /// Query the global naming registry.
    fn name_availability(&self, kind: ResourceKind, name: &str) -> Result<NameAvailability>;

    /// Check the caller's access to a resource or scope.
    fn check_access(&self, _key: &ResourceKey, _access: Access) -> Result<bool> {
        Ok(true)
    }

    /// Link a private zone to a network scope.
    fn link_zone(&self, zone: &ZoneId, network: &str) -> Result<bool>;

    /// Register an address record in a private zone.
    fn upsert_record(&self, zone: &ZoneId, name: &str, address: IpAddr) -> Result<UpsertOutcome>;

    /// Remove an address record from a private zone.
    fn remove_record(&self, zone: &ZoneId, name: &str) -> Result<bool>;
}
