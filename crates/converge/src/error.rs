//! Engine errors.

use crate::validate::ValidationFinding;
use cloudkit::ResourceKey;
use thiserror::Error;

/// Errors that abort planning, applying or teardown.
#[derive(Debug, Error)]
pub enum Error {
    /// The dependency graph has a cycle; `path` starts and ends on the same resource
    #[error("dependency cycle: {}", join(path))]
    Cycle { path: Vec<ResourceKey> },

    #[error("resource {key} is declared more than once")]
    DuplicateResource { key: ResourceKey },

    /// `depends_on` names a resource that is not declared
    #[error("{resource} depends on undeclared resource {target}")]
    UnknownDependency {
        resource: ResourceKey,
        target: ResourceKey,
    },

    /// Teardown target is not part of the declared state
    #[error("teardown target {key} is not declared")]
    UnknownTarget { key: ResourceKey },

    /// One or more fatal precondition findings
    #[error("{} precondition check(s) failed", findings.len())]
    Validation { findings: Vec<ValidationFinding> },

    /// The plan would destroy or replace resources without approval
    #[error("destructive changes not approved: {}", resources.join(", "))]
    DriftConflict { resources: Vec<String> },

    #[error("purge requested without confirmation")]
    PurgeNotConfirmed,

    /// Purge requested for purge-protected resources
    #[error("purge protection enabled on: {}", resources.join(", "))]
    PurgeProtected { resources: Vec<String> },

    #[error("backend error: {0}")]
    Backend(#[from] cloudkit::Error),

    /// Confirmation prompt failed
    #[error("confirmation failed: {0}")]
    Confirm(String),

    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),
}

impl Error {
    /// Actionable hint shown next to the error.
    pub fn remediation(&self) -> String {
        match self {
            Error::Cycle { .. } => "Remove one of the depends_on/reference edges in the cycle".into(),
            Error::DuplicateResource { .. } => "Keep a single declaration per kind/scope/name".into(),
            Error::UnknownDependency { target, .. } => {
                format!("Declare {target}, or declare it with existing = true if it is managed elsewhere")
            }
            Error::UnknownTarget { .. } => "Pass a key of a declared resource (kind/scope/name)".into(),
            Error::Validation { .. } => "Fix the findings above and re-run".into(),
            Error::DriftConflict { .. } => {
                "Review the replace/delete steps and re-run with --allow-destructive".into()
            }
            Error::PurgeNotConfirmed => "Re-run with --confirm-purge; purging is irreversible".into(),
            Error::PurgeProtected { .. } => {
                "Purge-protected resources can only be soft-deleted; wait for retention to expire"
                    .into()
            }
            Error::Backend(e) => e.category().advice().into(),
            Error::Confirm(_) => "Run interactively or pass --auto-approve".into(),
            Error::ThreadPool(_) => "Lower --jobs and retry".into(),
        }
    }
}

fn join(path: &[ResourceKey]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
