//! Exit code logic for the dirmirror process.
//!
//! Single responsibility: map an export summary and failure threshold to the
//! process exit outcome.

use std::process::ExitCode;

/// Process exit outcome of one export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Everything tolerated; exit status 0.
    Success,
    /// Nothing was mirrored and too much failed; exit status 1.
    Failure,
    /// Some files were mirrored but too much failed; exit status 2.
    Partial,
}

impl ProcessExit {
    /// Numeric exit status.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        ExitCode::from(exit.code())
    }
}

/// Determines the process exit outcome from completed and failed counts.
///
/// Without a threshold every run succeeds. With one, a failure count above it
/// is `Partial` if anything completed and `Failure` otherwise.
#[must_use]
pub fn determine_exit_outcome(
    completed: usize,
    failed: usize,
    max_failures: Option<usize>,
) -> ProcessExit {
    let Some(max_failures) = max_failures else {
        return ProcessExit::Success;
    };
    if failed <= max_failures {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_outcome_without_threshold_always_succeeds() {
        assert_eq!(determine_exit_outcome(0, 0, None), ProcessExit::Success);
        assert_eq!(determine_exit_outcome(3, 7, None), ProcessExit::Success);
        assert_eq!(determine_exit_outcome(0, 7, None), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_success_within_threshold() {
        assert_eq!(determine_exit_outcome(3, 0, Some(0)), ProcessExit::Success);
        assert_eq!(determine_exit_outcome(3, 2, Some(2)), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_partial_when_mixed_over_threshold() {
        assert_eq!(determine_exit_outcome(2, 1, Some(0)), ProcessExit::Partial);
    }

    #[test]
    fn test_exit_outcome_failure_when_nothing_completed() {
        assert_eq!(determine_exit_outcome(0, 2, Some(1)), ProcessExit::Failure);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProcessExit::Success.code(), 0);
        assert_eq!(ProcessExit::Failure.code(), 1);
        assert_eq!(ProcessExit::Partial.code(), 2);
    }
}
