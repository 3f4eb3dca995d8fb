//! Errors returned from a call.

use crate::record::FailureEvent;
use serde::Serialize;
use thiserror::Error;

/// Why a call stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelCause {
    /// The caller cancelled the call.
    Requested,
    /// The caller's deadline passed.
    DeadlineExceeded,
}

impl std::fmt::Display for CancelCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelCause::Requested => write!(f, "cancellation requested"),
            CancelCause::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Error returned by [`crate::CallHandler::call`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The gremlin decided this call fails.
    #[error(
        "{} {}. Call count: {}, failProbability: {}",
        .0.service,
        .0.reason,
        .0.call_count,
        .0.fail_probability
    )]
    SimulatedFailure(FailureEvent),

    /// The caller gave up before the call completed.
    #[error("Call {call_count} canceled: {cause}")]
    Canceled { call_count: u64, cause: CancelCause },
}

impl CallError {
    /// Call count of the call that produced this error.
    pub fn call_count(&self) -> u64 {
        match self {
            CallError::SimulatedFailure(event) => event.call_count,
            CallError::Canceled { call_count, .. } => *call_count,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, CallError::SimulatedFailure(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, CallError::Canceled { .. })
    }
}
