//! # cloudkit
//!
//! Boundary to the resource-provisioning backend.
//!
//! This crate provides:
//! - The shared resource vocabulary ([`ResourceKind`], [`ResourceKey`], [`Value`], [`Observed`])
//! - The [`Backend`] trait consumed by the reconciliation engine
//! - Categorized errors with retryability, and bounded exponential backoff
//! - An in-memory backend with fault injection, and a file-persisted one
//!
//! ## Example
//!
//! ```
//! use cloudkit::{Backend, Desired, MemoryBackend, ResourceKey};
//!
//! let backend = MemoryBackend::new();
//! let scope = ResourceKey::scope("ScopeA");
//! backend.create(&scope, &Desired::default()).unwrap();
//! assert!(backend.exists(&scope).unwrap());
//! ```
//!
//! ## Retry Logic
//!
//! Transient errors (throttling, timeouts) are retried with exponential
//! backoff; everything else fails on the first attempt.
//!
//! ```
//! use cloudkit::{Error, RetryConfig, retry::with_retry};
//! use std::time::Duration;
//!
//! let config = RetryConfig::new(3, Duration::from_millis(1), 2.0);
//! let (result, attempts) = with_retry(&config, None, || Ok::<_, Error>(7));
//! assert_eq!(result.unwrap(), 7);
//! assert_eq!(attempts, 1);
//! ```

pub mod backend;
pub mod error;
pub mod retry;
pub mod types;

pub use backend::{Backend, BackendState, CallPhase, JournalEntry, LocalBackend, MemoryBackend, Operation};
pub use error::{Error, ErrorCategory, Result};
pub use retry::{LogCallback, NoCallback, RetryCallback, with_retry};
pub use types::{
    Access, Desired, NameAvailability, Observed, Properties, RefValue, Removal, ResourceKey,
    ResourceKind, ResourceRef, RetryConfig, SecretRef, SecretValue, Status, Tags, Value,
};
