//! Error types for backend operations.
//!
//! Errors are categorized to enable smart retry logic and appropriate
//! user feedback. Each error type includes contextual information to
//! help users understand what went wrong and how to fix it.

use thiserror::Error;

/// Categories of backend errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Throttling, timeouts, temporary unavailability (retryable)
    Transient,
    /// Resource does not exist
    NotFound,
    /// Resource or name already exists / state conflict
    Conflict,
    /// Caller lacks access
    Permission,
    /// Purge blocked by purge protection
    PurgeProtected,
    /// Request rejected as malformed
    Invalid,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Temporary backend failure",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Resource conflict",
            Self::Permission => "Permission denied",
            Self::PurgeProtected => "Purge protection enabled",
            Self::Invalid => "Invalid request",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transient => "Retry later; the backend reported a temporary condition",
            Self::NotFound => "Declare the resource or fix the reference",
            Self::Conflict => "Choose another name or recover/purge the conflicting resource",
            Self::Permission => "Grant the caller access to the scope or resource",
            Self::PurgeProtected => {
                "Purge-protected resources cannot be purged; wait for retention to expire"
            }
            Self::Invalid => "Fix the declared properties and re-run",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Temporary failure (throttled, timed out, busy)
    #[error("transient backend error: {message}")]
    Transient {
        /// Details reported by the backend
        message: String,
    },

    /// Resource not found
    #[error("not found: {resource}")]
    NotFound {
        /// Resource identifier
        resource: String,
    },

    /// Name or state conflict
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict
        message: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Details about what permission was denied
        message: String,
    },

    /// Purge refused because the resource is purge-protected
    #[error("purge protection enabled on {resource}")]
    PurgeProtected {
        /// Resource identifier
        resource: String,
    },

    /// Malformed request
    #[error("invalid request: {message}")]
    Invalid {
        /// What was wrong
        message: String,
    },

    /// Private zone operation failed
    #[error("zone error: {0}")]
    Zone(#[from] privdns::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Transient { .. } => ErrorCategory::Transient,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::PurgeProtected { .. } => ErrorCategory::PurgeProtected,
            Error::Invalid { .. } | Error::Zone(privdns::Error::InvalidName { .. }) => {
                ErrorCategory::Invalid
            }
            Error::Zone(privdns::Error::ZoneNotFound { .. }) => ErrorCategory::NotFound,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Build an error of the given category (used for fault injection).
    pub fn from_category(category: ErrorCategory, message: impl Into<String>) -> Self {
        let message = message.into();
        match category {
            ErrorCategory::Transient => Error::Transient { message },
            ErrorCategory::NotFound => Error::NotFound { resource: message },
            ErrorCategory::Conflict => Error::Conflict { message },
            ErrorCategory::Permission => Error::Permission { message },
            ErrorCategory::PurgeProtected => Error::PurgeProtected { resource: message },
            ErrorCategory::Invalid => Error::Invalid { message },
            ErrorCategory::Other => Error::Other(message),
        }
    }
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, Error>;
