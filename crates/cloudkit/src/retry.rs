//! Retry logic with exponential backoff for transient errors.

use crate::error::{Error, Result};
use crate::types::RetryConfig;
use std::thread;

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an operation is being retried.
    ///
    /// # Arguments
    /// * `attempt` - Current attempt number (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay_ms` - Milliseconds until next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay_ms: u128);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &Error, _delay_ms: u128) {}
}

/// Callback that logs retries at warn level, tagged with the operation.
pub struct LogCallback<'a> {
    pub operation: &'a str,
}

impl RetryCallback for LogCallback<'_> {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay_ms: u128) {
        log::warn!(
            "{}: attempt {attempt}/{max_attempts} failed: {error}. Retrying in {delay_ms}ms...",
            self.operation
        );
    }
}

/// Execute an operation with retry logic.
///
/// Retries the operation if it returns a retryable error, using exponential
/// backoff between attempts. Returns the number of attempts made along
/// with the result.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> (Result<T>, u32)
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut last_error: Option<Error> = None;
    let mut attempts = 0;

    for attempt in 0..max_attempts {
        attempts = attempt + 1;
        match operation() {
            Ok(result) => return (Ok(result), attempts),
            Err(e) => {
                // If error is not retryable, return immediately
                if !e.is_retryable() {
                    return (Err(e), attempts);
                }

                // If this was the last attempt, return the error
                if attempts >= max_attempts {
                    last_error = Some(e);
                    break;
                }

                let delay = config.delay_for_attempt(attempt);
                if let Some(cb) = callback {
                    cb.on_retry(attempts, max_attempts, &e, delay.as_millis());
                }

                thread::sleep(delay);

                last_error = Some(e);
            }
        }
    }

    let err = last_error.unwrap_or_else(|| Error::Other("retry exhausted".to_string()));
    (Err(err), attempts)
}
