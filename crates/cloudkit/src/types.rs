//! Shared types for the backend boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of a manageable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Administrative boundary grouping other resources
    Scope,
    /// Virtual network; also the network scope resolvers are bound to
    Network,
    /// Secret/key store
    SecretStore,
    /// Private network gateway
    Gateway,
    /// Workload identity
    ManagedIdentity,
    /// Private endpoint for a backend resource
    Endpoint,
    /// Private DNS zone
    PrivateZone,
}

impl ResourceKind {
    /// All kinds, in a stable order.
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Scope,
        ResourceKind::Network,
        ResourceKind::SecretStore,
        ResourceKind::Gateway,
        ResourceKind::ManagedIdentity,
        ResourceKind::Endpoint,
        ResourceKind::PrivateZone,
    ];

    /// Get the kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Scope => "scope",
            ResourceKind::Network => "network",
            ResourceKind::SecretStore => "secret-store",
            ResourceKind::Gateway => "gateway",
            ResourceKind::ManagedIdentity => "managed-identity",
            ResourceKind::Endpoint => "endpoint",
            ResourceKind::PrivateZone => "private-zone",
        }
    }

    /// Whether deleting this kind leaves it soft-deleted until purged.
    pub fn supports_soft_delete(&self) -> bool {
        matches!(self, ResourceKind::SecretStore)
    }

    /// Whether names of this kind are unique across all scopes.
    pub fn globally_unique(&self) -> bool {
        matches!(self, ResourceKind::SecretStore)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scope" => Ok(ResourceKind::Scope),
            "network" => Ok(ResourceKind::Network),
            "secret-store" => Ok(ResourceKind::SecretStore),
            "gateway" => Ok(ResourceKind::Gateway),
            "managed-identity" | "identity" => Ok(ResourceKind::ManagedIdentity),
            "endpoint" => Ok(ResourceKind::Endpoint),
            "private-zone" | "zone" => Ok(ResourceKind::PrivateZone),
            other => Err(format!("unknown resource kind '{other}'")),
        }
    }
}

/// Fully qualified identity of a resource.
///
/// Scopes themselves live in the empty (top-level) scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub scope: String,
    pub name: String,
}

impl ResourceKey {
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
        }
    }

    /// Key of a top-level scope.
    pub fn scope(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Scope, "", name)
    }

    /// Key of the scope this resource lives in, if any.
    pub fn parent(&self) -> Option<ResourceKey> {
        (!self.scope.is_empty()).then(|| ResourceKey::scope(self.scope.clone()))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.scope, self.name)
        }
    }
}

impl FromStr for ResourceKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let (kind, scope, name) = match parts.as_slice() {
            [kind, name] => (*kind, "", *name),
            [kind, scope, name] => (*kind, *scope, *name),
            _ => return Err(format!("invalid resource key '{s}' (expected kind/scope/name)")),
        };
        if name.is_empty() {
            return Err(format!("invalid resource key '{s}': empty name"));
        }
        Ok(ResourceKey::new(kind.parse()?, scope, name))
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Reference to another resource, scope optional.
///
/// Written either as `kind/scope/name` (`kind/name` to mean "same scope as
/// the referencing resource") or as a table `{ kind, scope, name }`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub scope: Option<String>,
    pub name: String,
}

impl ResourceRef {
    /// Resolve against the scope of the referencing resource.
    pub fn resolve(&self, default_scope: &str) -> ResourceKey {
        let scope = self.scope.as_deref().unwrap_or(default_scope);
        ResourceKey::new(self.kind, scope, self.name.clone())
    }
}

impl From<&ResourceKey> for ResourceRef {
    fn from(key: &ResourceKey) -> Self {
        Self {
            kind: key.kind,
            scope: (!key.scope.is_empty()).then(|| key.scope.clone()),
            name: key.name.clone(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) if !scope.is_empty() => write!(f, "{}/{}/{}", self.kind, scope, self.name),
            _ => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

impl FromStr for ResourceRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let (kind, scope, name) = match parts.as_slice() {
            [kind, name] => (*kind, None, *name),
            [kind, scope, name] => (*kind, Some((*scope).to_string()), *name),
            _ => return Err(format!("invalid reference '{s}' (expected kind/[scope/]name)")),
        };
        if name.is_empty() {
            return Err(format!("invalid reference '{s}': empty name"));
        }
        Ok(ResourceRef {
            kind: kind.parse()?,
            scope,
            name: name.to_string(),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RefRepr {
    Text(String),
    Table {
        kind: ResourceKind,
        #[serde(default)]
        scope: Option<String>,
        name: String,
    },
}

impl Serialize for ResourceRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RefRepr::deserialize(deserializer)? {
            RefRepr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            RefRepr::Table { kind, scope, name } => Ok(ResourceRef { kind, scope, name }),
        }
    }
}

/// Reference to a secret held in a secret store. Resolved by the backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    pub scope: String,
    pub store: String,
    pub entry: String,
}

impl SecretRef {
    /// Key of the secret store holding the entry.
    pub fn store_key(&self) -> ResourceKey {
        ResourceKey::new(ResourceKind::SecretStore, self.scope.clone(), self.store.clone())
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "secret:{}/{}#{}", self.scope, self.store, self.entry)
    }
}

/// `{ ref = "kind/scope/name" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefValue {
    #[serde(rename = "ref")]
    pub target: ResourceRef,
}

/// `{ secret = { scope, store, entry } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretValue {
    pub secret: SecretRef,
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Ref(RefValue),
    Secret(SecretValue),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a reference value.
    pub fn reference(target: ResourceRef) -> Self {
        Value::Ref(RefValue { target })
    }

    /// Build a secret reference value.
    pub fn secret(secret: SecretRef) -> Self {
        Value::Secret(SecretValue { secret })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Whether this value is a secret reference.
    pub fn is_secret_ref(&self) -> bool {
        matches!(self, Value::Secret(_))
    }

    /// Collect every resource reference in this value, depth first.
    pub fn collect_refs<'a>(&'a self, out: &mut Vec<&'a ResourceRef>) {
        match self {
            Value::Ref(r) => out.push(&r.target),
            Value::List(items) => items.iter().for_each(|v| v.collect_refs(out)),
            Value::Map(map) => map.values().for_each(|v| v.collect_refs(out)),
            _ => {}
        }
    }

    /// Collect every secret reference in this value, depth first.
    pub fn collect_secrets<'a>(&'a self, out: &mut Vec<&'a SecretRef>) {
        match self {
            Value::Secret(s) => out.push(&s.secret),
            Value::List(items) => items.iter().for_each(|v| v.collect_secrets(out)),
            Value::Map(map) => map.values().for_each(|v| v.collect_secrets(out)),
            _ => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Ref(r) => write!(f, "ref({})", r.target),
            Value::Secret(s) => write!(f, "{}", s.secret),
            other => match serde_json::to_string(other) {
                Ok(json) => f.write_str(&json),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Declared or observed properties.
pub type Properties = BTreeMap<String, Value>;

/// Ownership/lifecycle tags.
pub type Tags = BTreeMap<String, String>;

/// What the engine asks the backend to converge a resource to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Desired {
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub tags: Tags,
}

/// Provisioning status reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Provisioning,
    Succeeded,
    Failed,
    /// Deleted but retained; the name stays reserved until purged
    SoftDeleted,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Provisioning => "provisioning",
            Status::Succeeded => "succeeded",
            Status::Failed => "failed",
            Status::SoftDeleted => "soft-deleted",
        };
        f.write_str(s)
    }
}

/// Live state of a resource as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observed {
    pub status: Status,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub tags: Tags,
    /// Set while soft-deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Observed {
    /// Whether the resource is live (not soft-deleted).
    pub fn is_live(&self) -> bool {
        self.status != Status::SoftDeleted
    }

    /// Get a boolean property.
    pub fn flag(&self, property: &str) -> Option<bool> {
        self.properties.get(property).and_then(Value::as_bool)
    }
}

/// Answer of the global naming registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameAvailability {
    Available,
    Taken,
    /// Reserved by a soft-deleted resource until purge or retention expiry
    SoftDeleted,
}

/// Access level checked against a scope or resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
    Read,
    Write,
}

/// How a delete call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Removal {
    /// Retained in the soft-deleted namespace
    SoftDeleted,
    /// Removed (kind has no soft-delete)
    Deleted,
    /// Irreversibly purged
    Purged,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}
