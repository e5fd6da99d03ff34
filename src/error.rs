//! Error types for the resilient call wrapper

use thiserror::Error;

/// Errors surfaced to callers of
/// [`RetryOrchestrator::execute`](crate::RetryOrchestrator::execute).
///
/// Retryable upstream statuses are absorbed inside the retry loop and never
/// appear here directly; they surface only as [`CallError::MaxAttemptsExceeded`]
/// once every allowed attempt has been spent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Circuit breaker is open, rejecting calls until the cooldown passes
    #[error("circuit breaker is open, rejecting calls")]
    CircuitOpen,

    /// Terminal upstream status, not worth retrying
    #[error("non-retryable status {status}")]
    NonRetryable {
        /// The status code the upstream returned
        status: u16,
    },

    /// The external call itself failed with an error
    #[error("upstream call failed: {0}")]
    Upstream(String),

    /// A retryable status persisted through every allowed attempt
    #[error("retryable status {status} persisted through {attempts} attempts")]
    MaxAttemptsExceeded {
        /// Total attempts made, including the first
        attempts: u32,
        /// The last retryable status observed
        status: u16,
    },
}

impl CallError {
    /// Check if this failure was the breaker rejecting the call outright
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CallError::CircuitOpen)
    }

    /// Check if every allowed attempt was spent on retryable statuses
    pub fn is_exhausted(&self) -> bool {
        matches!(self, CallError::MaxAttemptsExceeded { .. })
    }
}
