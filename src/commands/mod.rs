//! Command implementations

use converge::ApplyOutcome;

pub mod apply;
pub mod destroy;
pub mod plan;
pub mod resolve;
pub mod validate;

/// How a command finished, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Success or nothing to change
    Success,
    /// Precondition or validation failure
    Invalid,
    /// Plan computed but not applied
    Declined,
    /// Some steps failed or the run was cancelled; safe to re-run
    Incomplete,
    /// Apply or teardown could not run
    Fatal,
}

impl Exit {
    pub fn code(self) -> u8 {
        match self {
            Exit::Success => 0,
            Exit::Invalid => 1,
            Exit::Declined => 2,
            Exit::Incomplete => 3,
            Exit::Fatal => 4,
        }
    }
}

impl From<ApplyOutcome> for Exit {
    fn from(outcome: ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::NoChanges | ApplyOutcome::Succeeded => Exit::Success,
            ApplyOutcome::Declined => Exit::Declined,
            ApplyOutcome::PartialFailure | ApplyOutcome::Cancelled => Exit::Incomplete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(Exit::from(ApplyOutcome::NoChanges).code(), 0);
        assert_eq!(Exit::from(ApplyOutcome::Succeeded).code(), 0);
        assert_eq!(Exit::from(ApplyOutcome::Declined).code(), 2);
        assert_eq!(Exit::from(ApplyOutcome::PartialFailure).code(), 3);
        assert_eq!(Exit::from(ApplyOutcome::Cancelled).code(), 3);
    }
}
