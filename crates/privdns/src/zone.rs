//! Private zones and the shared zone store.
//!
//! A [`PrivateZone`] maps relative record names to private addresses and is
//! visible only to the network scopes it is linked to. The [`ZoneStore`] is
//! the single writable copy; resolvers read it through [`ZoneView`].

use crate::error::{Error, Result};
use crate::name;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Identity of a private zone: the administrative scope owning it plus its DNS name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneId {
    pub scope: String,
    pub name: String,
}

impl ZoneId {
    /// Create a zone id, normalizing the DNS name.
    pub fn new(scope: impl Into<String>, zone_name: &str) -> Self {
        Self {
            scope: scope.into(),
            name: name::normalize(zone_name),
        }
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

/// A single address record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub address: IpAddr,
}

/// A private zone with its links and records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateZone {
    pub id: ZoneId,
    /// Public suffix served by this zone (e.g. `vault.azure.net` for
    /// `privatelink.vaultcore.azure.net`)
    #[serde(default)]
    pub public_alias: Option<String>,
    /// Network scopes allowed to resolve names in this zone
    #[serde(default)]
    pub links: BTreeSet<String>,
    /// Records keyed by relative name (`@` for the apex)
    #[serde(default)]
    pub records: BTreeMap<String, Record>,
}

impl PrivateZone {
    fn new(id: ZoneId, public_alias: Option<&str>) -> Self {
        Self {
            id,
            public_alias: public_alias.map(name::normalize),
            links: BTreeSet::new(),
            records: BTreeMap::new(),
        }
    }

    /// Whether the given network scope is linked to this zone.
    pub fn is_linked(&self, network: &str) -> bool {
        self.links.contains(network)
    }

    /// Match a normalized query name against this zone.
    ///
    /// Returns the relative record name and the length of the matched suffix.
    fn match_name(&self, query: &str) -> Option<(String, usize)> {
        let direct = name::strip_suffix(query, &self.id.name).map(|rest| (rest, self.id.name.len()));
        let aliased = self
            .public_alias
            .as_deref()
            .and_then(|alias| name::strip_suffix(query, alias).map(|rest| (rest, alias.len())));

        // Prefer the more specific suffix
        let best = match (direct, aliased) {
            (Some(d), Some(a)) => Some(if a.1 > d.1 { a } else { d }),
            (d, a) => d.or(a),
        };

        best.map(|(rest, len)| {
            let label = if rest.is_empty() { "@" } else { rest };
            (label.to_string(), len)
        })
    }
}

/// Result of registering a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new record was added
    Created,
    /// An existing record now points at a different address
    Updated,
    /// The record already had this address
    Unchanged,
}

/// The zone owning a queried name, as seen from one network scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneMatch {
    pub zone: ZoneId,
    /// Relative record name inside the zone
    pub label: String,
    /// Whether the querying network scope is linked to the zone
    pub linked: bool,
    /// Registered record, if any
    pub record: Option<Record>,
}

/// Read-only view of zone state used by resolvers.
pub trait ZoneView: Send + Sync {
    /// Find the zone owning `query` (already normalized) among the zones
    /// linked to `network`; when none is linked, the most specific unlinked
    /// owner is returned with `linked == false`.
    fn find_owner(&self, query: &str, network: &str) -> Option<ZoneMatch>;
}

/// Thread-safe store of private zones.
#[derive(Debug, Default)]
pub struct ZoneStore {
    zones: RwLock<BTreeMap<ZoneId, PrivateZone>>,
}

impl ZoneStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from exported zones.
    pub fn from_zones(zones: impl IntoIterator<Item = PrivateZone>) -> Self {
        let map = zones.into_iter().map(|z| (z.id.clone(), z)).collect();
        Self {
            zones: RwLock::new(map),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ZoneId, PrivateZone>> {
        self.zones.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ZoneId, PrivateZone>> {
        self.zones.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the zone if missing and refresh its public alias.
    ///
    /// Returns `true` if the zone was created.
    pub fn ensure_zone(&self, id: &ZoneId, public_alias: Option<&str>) -> bool {
        let mut zones = self.write();
        match zones.get_mut(id) {
            Some(zone) => {
                zone.public_alias = public_alias.map(name::normalize);
                false
            }
            None => {
                log::debug!("Creating private zone {id}");
                zones.insert(id.clone(), PrivateZone::new(id.clone(), public_alias));
                true
            }
        }
    }

    /// Remove a zone with all its links and records.
    pub fn remove_zone(&self, id: &ZoneId) -> bool {
        self.write().remove(id).is_some()
    }

    /// Link a network scope to a zone. Linking twice is a no-op.
    pub fn link(&self, id: &ZoneId, network: &str) -> Result<bool> {
        let mut zones = self.write();
        let zone = zones.get_mut(id).ok_or_else(|| Error::ZoneNotFound {
            zone: id.to_string(),
        })?;
        Ok(zone.links.insert(network.to_string()))
    }

    /// Remove a network link from a zone.
    pub fn unlink(&self, id: &ZoneId, network: &str) -> Result<bool> {
        let mut zones = self.write();
        let zone = zones.get_mut(id).ok_or_else(|| Error::ZoneNotFound {
            zone: id.to_string(),
        })?;
        Ok(zone.links.remove(network))
    }

    /// Register `record_name -> address` in a zone.
    ///
    /// Records are keyed by name, so repeating the same upsert never
    /// produces a second record.
    pub fn upsert_record(
        &self,
        id: &ZoneId,
        record_name: &str,
        address: IpAddr,
    ) -> Result<UpsertOutcome> {
        let label = normalize_label(record_name)?;
        let mut zones = self.write();
        let zone = zones.get_mut(id).ok_or_else(|| Error::ZoneNotFound {
            zone: id.to_string(),
        })?;

        let outcome = match zone.records.insert(label.clone(), Record { address }) {
            None => UpsertOutcome::Created,
            Some(previous) if previous.address == address => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        };
        log::debug!("Upsert {label} -> {address} in {id}: {outcome:?}");
        Ok(outcome)
    }

    /// Remove a record from a zone. Missing records are not an error.
    pub fn remove_record(&self, id: &ZoneId, record_name: &str) -> Result<bool> {
        let label = normalize_label(record_name)?;
        let mut zones = self.write();
        let zone = zones.get_mut(id).ok_or_else(|| Error::ZoneNotFound {
            zone: id.to_string(),
        })?;
        Ok(zone.records.remove(&label).is_some())
    }

    /// Get a copy of a zone.
    pub fn zone(&self, id: &ZoneId) -> Option<PrivateZone> {
        self.read().get(id).cloned()
    }

    /// Copy of all zones, ordered by id.
    pub fn zones(&self) -> Vec<PrivateZone> {
        self.read().values().cloned().collect()
    }

    /// Total number of records across all zones.
    pub fn record_count(&self) -> usize {
        self.read().values().map(|z| z.records.len()).sum()
    }
}

impl ZoneView for ZoneStore {
    fn find_owner(&self, query: &str, network: &str) -> Option<ZoneMatch> {
        let zones = self.read();

        let mut linked: Option<(usize, &PrivateZone, String)> = None;
        let mut unlinked: Option<(usize, &PrivateZone, String)> = None;
        for zone in zones.values() {
            let Some((label, len)) = zone.match_name(query) else {
                continue;
            };
            let slot = if zone.is_linked(network) {
                &mut linked
            } else {
                &mut unlinked
            };
            if slot.as_ref().is_none_or(|(best_len, _, _)| len > *best_len) {
                *slot = Some((len, zone, label));
            }
        }

        let is_linked = linked.is_some();
        linked.or(unlinked).map(|(_, zone, label)| ZoneMatch {
            zone: zone.id.clone(),
            record: zone.records.get(&label).copied(),
            label,
            linked: is_linked,
        })
    }
}

fn normalize_label(record_name: &str) -> Result<String> {
    let label = name::normalize(record_name);
    if label == "@" || label.is_empty() {
        return Ok("@".to_string());
    }
    if !name::is_valid(&label) {
        return Err(Error::InvalidName {
            name: record_name.to_string(),
        });
    }
    Ok(label)
}
