//! Error types for private name resolution.

use thiserror::Error;

/// Errors that can occur while managing zones or resolving names.
#[derive(Debug, Error)]
pub enum Error {
    /// Query or record name is not a valid DNS name
    #[error("invalid DNS name: {name}")]
    InvalidName {
        /// The rejected name
        name: String,
    },

    /// Zone is not known to the store
    #[error("private zone not found: {zone}")]
    ZoneNotFound {
        /// Zone identifier (`scope/name`)
        zone: String,
    },

    /// Upstream (public) resolver failed
    #[error("upstream resolver {upstream} failed: {message}")]
    Upstream {
        /// Upstream description
        upstream: String,
        /// Failure details
        message: String,
    },

    /// Hosts table could not be parsed
    #[error("invalid hosts entry at line {line}: {message}")]
    HostsParse {
        /// Line number (1-indexed)
        line: usize,
        /// Description of the problem
        message: String,
    },
}

/// Result type for name resolution operations.
pub type Result<T> = std::result::Result<T, Error>;
