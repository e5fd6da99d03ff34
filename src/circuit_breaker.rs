//! Time-based circuit breaking
//!
//! The circuit breaker stops calls to a failing dependency for a cooldown
//! period after repeated failures. It has two states:
//! - Closed: calls are permitted
//! - Open: calls are rejected until a cooldown deadline passes
//!
//! Reopening is purely time-driven: there is no half-open probe state, so the
//! first call after the cooldown goes straight through. A single failure
//! after the breaker closes does not reopen it; a full run of
//! `failure_threshold` consecutive failures must accumulate again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::CallError;

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open once tripped
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    /// Consecutive failure count since the last success or trip
    consecutive_failures: u32,
    /// Deadline until which calls are rejected; `None` means never tripped
    open_until: Option<Instant>,
}

/// Circuit breaker guarding an unreliable dependency.
///
/// The handle is cheap to clone; clones share the same breaker state, and
/// every state update takes the internal mutex so concurrent
/// [`failure`](CircuitBreaker::failure) / [`success`](CircuitBreaker::success)
/// calls cannot lose updates.
///
/// # Example
/// ```no_run
/// use backstop::{CircuitBreaker, CircuitBreakerConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let breaker = CircuitBreaker::new(CircuitBreakerConfig {
///         failure_threshold: 5,
///         cooldown: Duration::from_secs(15),
///     });
///
///     if breaker.before().await.is_ok() {
///         // ... perform the call, then report the outcome ...
///         breaker.success().await;
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(BreakerState {
                consecutive_failures: 0,
                open_until: None,
            })),
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Gate check before a call.
    ///
    /// Fails with [`CallError::CircuitOpen`] while the cooldown deadline has
    /// not passed; otherwise a no-op.
    pub async fn before(&self) -> Result<(), CallError> {
        let state = self.state.lock().await;
        match state.open_until {
            Some(deadline) if Instant::now() < deadline => Err(CallError::CircuitOpen),
            _ => Ok(()),
        }
    }

    /// Report a successful call outcome. Resets the consecutive failure
    /// count; does not affect an already-set cooldown deadline.
    pub async fn success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures = 0;
    }

    /// Report a failed call outcome.
    ///
    /// At the failure threshold the circuit opens for the configured
    /// cooldown and the counter resets, so a full threshold of failures is
    /// required to re-open after the breaker closes again.
    pub async fn failure(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.config.failure_threshold {
            state.open_until = Some(Instant::now() + self.config.cooldown);
            state.consecutive_failures = 0;
            debug!(cooldown = ?self.config.cooldown, "circuit opened");
        }
    }

    /// Whether the circuit is currently rejecting calls
    pub async fn is_open(&self) -> bool {
        let state = self.state.lock().await;
        matches!(state.open_until, Some(deadline) if Instant::now() < deadline)
    }

    /// Current consecutive failure count
    pub async fn failure_count(&self) -> u32 {
        self.state.lock().await.consecutive_failures
    }
}
