//! CLI side of the engine
//!
//! 1. Session - Load config and documents, build the graph, open the backend
//! 2. Differ - Render plans, findings and the destructive boundary
//! 3. Executor - Terminal progress, confirmation prompts and summaries

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{CliConfirm, CliProgress, print_report};
pub use planner::Session;
