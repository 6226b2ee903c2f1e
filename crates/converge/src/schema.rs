//! Per-kind rules: naming, immutable and secret-bearing properties,
//! soft-delete support, and the security requirements a resource must
//! meet before others may reference it.

use cloudkit::{Properties, ResourceKind, Value};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Static schema of a resource kind.
#[derive(Debug)]
pub struct KindSchema {
    pub kind: ResourceKind,
    pub min_len: usize,
    pub max_len: usize,
    /// Allowed characters/shape of the name
    pub pattern: &'static str,
    /// Names must be unique across all scopes (and the soft-deleted namespace)
    pub global_name: bool,
    /// Properties that cannot change in place; a change forces replacement
    pub immutable: &'static [&'static str],
    /// Properties that may only be supplied as secret references
    pub secret: &'static [&'static str],
    pub soft_delete: bool,
    /// Flags that must be set on a resource of this kind before anything references it
    pub required_when_referenced: &'static [(&'static str, bool)],
}

static SCHEMAS: [KindSchema; 7] = [
    KindSchema {
        kind: ResourceKind::Scope,
        min_len: 1,
        max_len: 90,
        pattern: r"^[A-Za-z0-9_().-]*[A-Za-z0-9_()-]$",
        global_name: false,
        immutable: &["location"],
        secret: &[],
        soft_delete: false,
        required_when_referenced: &[],
    },
    KindSchema {
        kind: ResourceKind::Network,
        min_len: 2,
        max_len: 64,
        pattern: r"^[A-Za-z0-9][A-Za-z0-9_.-]*[A-Za-z0-9_]$",
        global_name: false,
        immutable: &["location"],
        secret: &[],
        soft_delete: false,
        required_when_referenced: &[],
    },
    KindSchema {
        kind: ResourceKind::SecretStore,
        min_len: 3,
        max_len: 24,
        pattern: r"^[A-Za-z][A-Za-z0-9-]*[A-Za-z0-9]$",
        global_name: true,
        immutable: &["location", "tenant"],
        secret: &[],
        soft_delete: true,
        required_when_referenced: &[("soft_delete_enabled", true), ("purge_protection", true)],
    },
    KindSchema {
        kind: ResourceKind::Gateway,
        min_len: 1,
        max_len: 80,
        pattern: r"^[A-Za-z0-9][A-Za-z0-9_.-]*[A-Za-z0-9_]$|^[A-Za-z0-9]$",
        global_name: false,
        immutable: &["location", "network"],
        secret: &["shared_key", "certificate_password"],
        soft_delete: false,
        required_when_referenced: &[],
    },
    KindSchema {
        kind: ResourceKind::ManagedIdentity,
        min_len: 3,
        max_len: 128,
        pattern: r"^[A-Za-z0-9][A-Za-z0-9_-]*$",
        global_name: false,
        immutable: &["location"],
        secret: &[],
        soft_delete: false,
        required_when_referenced: &[],
    },
    KindSchema {
        kind: ResourceKind::Endpoint,
        min_len: 2,
        max_len: 64,
        pattern: r"^[A-Za-z0-9][A-Za-z0-9_.-]*[A-Za-z0-9_]$",
        global_name: false,
        immutable: &["location", "target", "subnet"],
        secret: &[],
        soft_delete: false,
        required_when_referenced: &[],
    },
    KindSchema {
        kind: ResourceKind::PrivateZone,
        min_len: 1,
        max_len: 253,
        pattern: r"^([a-z0-9_]([a-z0-9-]*[a-z0-9])?\.)+[a-z0-9]([a-z0-9-]*[a-z0-9])?$",
        global_name: false,
        immutable: &[],
        secret: &[],
        soft_delete: false,
        required_when_referenced: &[],
    },
];

static PATTERNS: LazyLock<HashMap<ResourceKind, Regex>> = LazyLock::new(|| {
    SCHEMAS
        .iter()
        .filter_map(|s| Regex::new(s.pattern).ok().map(|re| (s.kind, re)))
        .collect()
});

/// Get the schema of a kind.
pub fn schema(kind: ResourceKind) -> &'static KindSchema {
    // SCHEMAS is ordered like ResourceKind::ALL
    let idx = ResourceKind::ALL.iter().position(|k| *k == kind).unwrap_or(0);
    &SCHEMAS[idx]
}

impl KindSchema {
    /// Check a name against length and character rules.
    pub fn check_name(&self, name: &str) -> Result<(), String> {
        let len = name.chars().count();
        if len < self.min_len || len > self.max_len {
            return Err(format!(
                "{} names must be {}-{} characters (got {len})",
                self.kind, self.min_len, self.max_len
            ));
        }
        if let Some(re) = PATTERNS.get(&self.kind) {
            if !re.is_match(name) {
                return Err(format!(
                    "'{name}' contains characters not allowed for {} names",
                    self.kind
                ));
            }
        }
        Ok(())
    }

    pub fn is_immutable(&self, property: &str) -> bool {
        self.immutable.contains(&property)
    }

    pub fn is_secret(&self, property: &str) -> bool {
        self.secret.contains(&property)
    }

    /// Requirements not met by `properties`, rendered as `name = value`.
    pub fn unmet_requirements(&self, properties: &Properties) -> Vec<String> {
        self.required_when_referenced
            .iter()
            .filter(|(prop, wanted)| properties.get(*prop).and_then(Value::as_bool) != Some(*wanted))
            .map(|(prop, wanted)| format!("{prop} = {wanted}"))
            .collect()
    }
}
