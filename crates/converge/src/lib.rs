//! # Converge
//!
//! Dependency-ordered reconciliation of declared infrastructure against a
//! [`cloudkit::Backend`].
//!
//! ## Pipeline
//!
//! 1. **Graph**: declared [`Resource`]s become an acyclic [`Graph`]
//! 2. **Validate**: preconditions (naming, access, existence, security)
//!    are checked in parallel before anything is planned
//! 3. **Snapshot**: live state is read once
//! 4. **Plan**: declared vs. observed gives an ordered, deterministic [`Plan`]
//! 5. **Execute**: the same plan is applied with bounded parallelism,
//!    dependency gating, retries and per-step timeouts
//!
//! [`plan_teardown`] builds the reverse: removal in reverse dependency order.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use cloudkit::{Backend, MemoryBackend, ResourceKind};
//! use converge::{
//!     execute, plan, AutoConfirm, ExecuteOptions, Graph, NoProgress, Resource, Snapshot,
//! };
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let graph = Graph::build(vec![
//!     Resource::scope("ScopeA"),
//!     Resource::new(ResourceKind::Network, "ScopeA", "vnet1"),
//! ])?;
//! let snapshot = Snapshot::capture(&graph, backend.as_ref(), 2)?;
//! let plan = plan(&graph, &snapshot);
//!
//! let dyn_backend: Arc<dyn Backend> = backend.clone();
//! let report = execute(&plan, dyn_backend, &ExecuteOptions::default(), &mut NoProgress, &mut AutoConfirm)?;
//! assert_eq!(report.summary.created, 2);
//! # Ok::<(), converge::Error>(())
//! ```

pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod model;
pub mod plan;
pub mod report;
pub mod schema;
pub mod snapshot;
pub mod teardown;
pub mod validate;

pub use context::{AutoConfirm, AutoDecline, CancelToken, ConfirmCallback, ExecuteOptions, NoProgress, ProgressCallback};
pub use error::{Error, Result};
pub use executor::execute;
pub use graph::{ExternalRef, Graph, Node};
pub use model::{EdgeKind, Resource};
pub use plan::{Action, FieldChange, Plan, PlanKind, PlanStep, PlanSummary, plan};
pub use report::{ApplyOutcome, ApplyReport, ExecuteSummary, StepReport, StepResult};
pub use schema::{KindSchema, schema};
pub use snapshot::Snapshot;
pub use teardown::{TeardownMode, TeardownOptions, plan_teardown, teardown};
pub use validate::{Severity, ValidationFinding, ValidationReport, validate};
