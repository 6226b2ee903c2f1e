//! Declared-state documents and environment overrides.
//!
//! A document is a TOML or JSON file with a list of resources, or a
//! directory of such files read in sorted path order:
//!
//! ```toml
//! [[resource]]
//! kind = "secret-store"
//! scope = "ScopeA"
//! name = "kv-stratum-01"
//!
//! [resource.properties]
//! soft_delete_enabled = true
//! purge_protection = true
//! ```
//!
//! An overrides document merges properties and tags into declared resources:
//!
//! ```toml
//! [[override]]
//! target = "endpoint/ScopeA/Endpoint1"
//! properties = { address = "10.0.0.9" }
//! ```
//!
//! Neither may carry secret material; secret-bearing values are written as
//! `{ secret = { scope, store, entry } }` references.

use cloudkit::{Properties, ResourceKey, Tags, Value};
use converge::{Resource, schema};
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use walkdir::WalkDir;

static SECRET_KEY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(password|passwd|secret|token|connection_?string|private_?key|shared_?key|api_?key)")
        .ok()
});

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid document {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("{path}: unsupported document format (expected .toml or .json)")]
    UnsupportedFormat { path: PathBuf },

    #[error("could not walk document directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("override target {target} is not declared")]
    UnknownOverrideTarget { target: ResourceKey },

    #[error("{location}: property '{property}' carries secret material inline")]
    SecretMaterial { location: String, property: String },
}

impl DocumentError {
    pub fn remediation(&self) -> &'static str {
        match self {
            DocumentError::Read { .. } | DocumentError::Walk(_) => "Check the document path",
            DocumentError::Parse { .. } => "Fix the syntax error and re-run",
            DocumentError::UnsupportedFormat { .. } => "Rename the file to .toml or .json",
            DocumentError::UnknownOverrideTarget { .. } => {
                "Override only declared resources (kind/scope/name)"
            }
            DocumentError::SecretMaterial { .. } => {
                "Store the value in a secret store and reference it with { secret = { scope, store, entry } }"
            }
        }
    }
}

type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocumentFile {
    #[serde(default, rename = "resource", alias = "resources")]
    resources: Vec<Resource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OverridesFile {
    #[serde(default, rename = "override", alias = "overrides")]
    overrides: Vec<Override>,
}

/// Environment-specific values for one declared resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Override {
    pub target: ResourceKey,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub tags: Tags,
}

/// Load every resource from a file or a directory of documents.
pub fn load(path: &Path) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for file in document_files(path)? {
        let doc: DocumentFile = parse(&file)?;
        log::debug!("{}: {} resource(s)", file.display(), doc.resources.len());
        for resource in &doc.resources {
            check_plain_secrets(&resource.key().to_string(), &resource.properties)?;
        }
        resources.extend(doc.resources);
    }
    Ok(resources)
}

/// Load an overrides document.
pub fn load_overrides(path: &Path) -> Result<Vec<Override>> {
    let file: OverridesFile = parse(path)?;
    for entry in &file.overrides {
        let location = format!("override {}", entry.target);
        check_plain_secrets(&location, &entry.properties)?;

        let kind_schema = schema(entry.target.kind);
        if let Some((prop, _)) = entry
            .properties
            .iter()
            .find(|(prop, value)| kind_schema.is_secret(prop) && !value.is_secret_ref())
        {
            return Err(DocumentError::SecretMaterial {
                location,
                property: prop.clone(),
            });
        }
    }
    Ok(file.overrides)
}

/// Merge overrides into the declared resources, key by key.
pub fn apply_overrides(resources: &mut [Resource], overrides: &[Override]) -> Result<()> {
    for entry in overrides {
        let resource = resources
            .iter_mut()
            .find(|r| r.key() == entry.target)
            .ok_or_else(|| DocumentError::UnknownOverrideTarget {
                target: entry.target.clone(),
            })?;
        for (key, value) in &entry.properties {
            resource.properties.insert(key.clone(), value.clone());
        }
        for (key, value) in &entry.tags {
            resource.tags.insert(key.clone(), value.clone());
        }
        log::debug!("Applied override to {}", entry.target);
    }
    Ok(())
}

fn document_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && format_of(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[derive(Clone, Copy)]
enum Format {
    Toml,
    Json,
}

fn format_of(path: &Path) -> Option<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Some(Format::Toml),
        Some("json") => Some(Format::Json),
        _ => None,
    }
}

fn parse<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = format_of(path).ok_or_else(|| DocumentError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let content = fs::read_to_string(path).map_err(|source| DocumentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |message: String| DocumentError::Parse {
        path: path.to_path_buf(),
        message,
    };
    match format {
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
    }
}

fn check_plain_secrets(location: &str, properties: &Properties) -> Result<()> {
    for (key, value) in properties {
        if let Some(property) = plain_secret(key, value) {
            return Err(DocumentError::SecretMaterial {
                location: location.to_string(),
                property,
            });
        }
    }
    Ok(())
}

/// Path of the first plain string stored under a secret-looking key.
fn plain_secret(key: &str, value: &Value) -> Option<String> {
    let secret_key = SECRET_KEY.as_ref().is_some_and(|re| re.is_match(key));
    match value {
        Value::String(_) if secret_key => Some(key.to_string()),
        Value::List(items) => items
            .iter()
            .find_map(|item| plain_secret(key, item)),
        Value::Map(map) => map
            .iter()
            .find_map(|(k, v)| plain_secret(k, v).map(|inner| format!("{key}.{inner}"))),
        _ => None,
    }
}
