//! Execution options and provider traits
//!
//! These traits keep the engine free of any particular terminal UI:
//! the CLI supplies progress bars and prompts, tests supply no-ops.

use crate::plan::PlanStep;
use crate::report::StepResult;
use anyhow::Result;
use cloudkit::RetryConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Progress callback for execution operations
///
/// All methods are called on the coordinating thread.
pub trait ProgressCallback: Send {
    /// Called once with the number of steps that will call the backend
    fn on_start(&mut self, changes: usize);

    /// Called when a step is dispatched
    fn on_step_start(&mut self, step: &PlanStep);

    /// Called when a step reaches a terminal result (including skips)
    fn on_step_complete(&mut self, step: &PlanStep, result: &StepResult);

    /// Called when execution ends
    fn on_finish(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;

    /// Second confirmation for steps that delete or replace resources
    fn confirm_destructive(&mut self, steps: &[&PlanStep]) -> Result<bool> {
        self.confirm(&format!(
            "{} step(s) will delete or replace resources. Continue?",
            steps.len()
        ))
    }
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_start(&mut self, _changes: usize) {}
    fn on_step_start(&mut self, _step: &PlanStep) {}
    fn on_step_complete(&mut self, _step: &PlanStep, _result: &StepResult) {}
    fn on_finish(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Cooperative cancellation flag shared with signal handlers and workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Maximum steps in flight
    pub jobs: usize,
    /// Per-step deadline; a late step counts as failed
    pub step_timeout: Option<Duration>,
    /// Backoff for transient backend errors
    pub retry: RetryConfig,
    /// Permit replace/delete steps in apply plans
    pub allow_destructive: bool,
    pub cancel: CancelToken,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            step_timeout: None,
            retry: RetryConfig::default(),
            allow_destructive: false,
            cancel: CancelToken::new(),
        }
    }
}
