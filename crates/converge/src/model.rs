//! Resource model: the declared unit of management.

use cloudkit::{Desired, Properties, ResourceKey, ResourceKind, ResourceRef, SecretRef, Tags, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Resource {
    pub kind: ResourceKind,
    /// Administrative scope; empty for scopes themselves
    #[serde(default)]
    pub scope: String,
    pub name: String,
    #[serde(default, alias = "declaredProperties")]
    pub properties: Properties,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default, alias = "dependsOn")]
    pub depends_on: Vec<ResourceRef>,
    /// Managed elsewhere: validated, never created, updated or deleted
    #[serde(default)]
    pub existing: bool,
}

/// Why one resource requires another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum EdgeKind {
    /// Listed in `depends_on`
    Explicit,
    /// The scope the resource lives in
    Scope,
    /// A `ref` inside the properties
    Reference,
    /// A secret reference's store
    Secret,
    /// A private zone an endpoint joins
    Zone,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Explicit => "depends_on",
            EdgeKind::Scope => "scope",
            EdgeKind::Reference => "reference",
            EdgeKind::Secret => "secret",
            EdgeKind::Zone => "zone",
        };
        f.write_str(s)
    }
}

impl Resource {
    pub fn new(kind: ResourceKind, scope: impl Into<String>, name: impl Into<String>) -> Self {
        let scope = if kind == ResourceKind::Scope {
            String::new()
        } else {
            scope.into()
        };
        Self {
            kind,
            scope,
            name: name.into(),
            properties: Properties::new(),
            tags: Tags::new(),
            depends_on: Vec::new(),
            existing: false,
        }
    }

    /// Declare a top-level scope.
    pub fn scope(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Scope, "", name)
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn depends_on(mut self, target: &ResourceKey) -> Self {
        self.depends_on.push(ResourceRef::from(target));
        self
    }

    /// Join private zones (endpoints only), by name in the same scope.
    pub fn joining(self, zones: &[&str]) -> Self {
        let list = zones.iter().map(|z| Value::from(*z)).collect();
        self.with_property("zones", Value::List(list))
    }

    /// Mark as an existing (external) resource.
    pub fn existing(mut self) -> Self {
        self.existing = true;
        self
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.kind, self.scope.clone(), self.name.clone())
    }

    /// Desired state sent to the backend.
    pub fn desired(&self) -> Desired {
        Desired {
            properties: self.properties.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Every resource this one requires, with the reason, in a stable order.
    pub fn references(&self) -> Vec<(ResourceKey, EdgeKind)> {
        let mut out = Vec::new();

        if let Some(parent) = self.key().parent() {
            out.push((parent, EdgeKind::Scope));
        }
        for dep in &self.depends_on {
            out.push((dep.resolve(&self.scope), EdgeKind::Explicit));
        }

        let mut refs = Vec::new();
        let mut secrets: Vec<&SecretRef> = Vec::new();
        for value in self.properties.values() {
            value.collect_refs(&mut refs);
            value.collect_secrets(&mut secrets);
        }
        for r in refs {
            out.push((r.resolve(&self.scope), EdgeKind::Reference));
        }
        for s in secrets {
            out.push((s.store_key(), EdgeKind::Secret));
        }
        for zone in self.joined_zones() {
            out.push((zone, EdgeKind::Zone));
        }

        // First reason wins for a repeated target
        let mut seen = std::collections::BTreeSet::new();
        out.retain(|(key, _)| *key != self.key() || self.depends_on_self());
        out.retain(|(key, _)| seen.insert(key.clone()));
        out
    }

    fn depends_on_self(&self) -> bool {
        let own = self.key();
        self.depends_on.iter().any(|d| d.resolve(&self.scope) == own)
    }

    /// Private zones an endpoint registers into.
    ///
    /// Entries are zone names in the endpoint's scope, or `scope/zone`.
    pub fn joined_zones(&self) -> Vec<ResourceKey> {
        if self.kind != ResourceKind::Endpoint {
            return Vec::new();
        }
        self.properties
            .get("zones")
            .and_then(Value::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_str)
            .map(|entry| match entry.split_once('/') {
                Some((scope, zone)) => ResourceKey::new(ResourceKind::PrivateZone, scope, zone),
                None => ResourceKey::new(ResourceKind::PrivateZone, self.scope.clone(), entry),
            })
            .collect()
    }

    /// Record name an endpoint registers (defaults to the endpoint name).
    pub fn record_name(&self) -> String {
        self.properties
            .get("record_name")
            .and_then(Value::as_str)
            .map_or_else(|| self.name.to_ascii_lowercase(), str::to_string)
    }

    /// Declared private address, if any.
    pub fn declared_address(&self) -> Option<IpAddr> {
        self.properties
            .get("address")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    /// Network scopes a private zone is linked to (defaults to its own scope).
    pub fn zone_links(&self) -> Vec<String> {
        match self.properties.get("links").and_then(Value::as_list) {
            Some(links) => links.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            None => vec![self.scope.clone()],
        }
    }

    /// Public DNS suffix served by a private zone.
    pub fn public_alias(&self) -> Option<&str> {
        self.properties.get("public_alias").and_then(Value::as_str)
    }
}
