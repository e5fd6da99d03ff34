//! Backstop: resilience wrapper for unreliable remote calls
//!
//! # Overview
//!
//! This crate protects client code and a downstream service from each other:
//! it wraps a single unreliable remote operation with a coordinated set of
//! control structures so that transient failures are tolerated, overload is
//! avoided, and permanently failed calls are captured for inspection.
//!
//! - **Token Bucket**: Adaptive rate limiting with a runtime-adjustable
//!   refill rate, so a downstream throttling hint reshapes local pacing
//! - **Circuit Breaker**: Two-state, time-driven guard that rejects calls
//!   for a cooldown period after repeated failures
//! - **Retry Orchestrator**: Exponential-backoff retry loop with typed
//!   failure classification
//! - **Dead-Letter Sink**: Bounded FIFO quarantine for terminally failed
//!   calls
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Network transports or protocols (the wrapped call is opaque)
//! - Persistence (dead-letter entries live only in-process)
//! - Response payload semantics (the payload passes through untouched)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │ execute(request, op)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Orchestrator                │  ← Control loop
//! │  (classify, backoff, retry up to N)     │
//! └───┬──────────────┬──────────────────────┘
//!     │ before()     │ acquire(1)
//!     ▼              ▼
//! ┌──────────────┐ ┌──────────────────────┐
//! │ Circuit      │ │ Token Bucket         │  ← Fail fast / pace
//! │ Breaker      │ │ (rate hint adaptive) │
//! └──────────────┘ └──────────────────────┘
//!               │
//!               ▼
//!        External Call
//!               │
//!          terminal failure:
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Dead-Letter Sink                  │  ← Bounded FIFO quarantine
//! │  (oldest evicted at capacity)           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The orchestrator is the sole caller of the other three components; the
//! bucket, breaker, and sink are independent of one another and can be
//! shared across orchestrators and tasks (all handles are cheap clones).
//!
//! # Usage Example
//!
//! ```no_run
//! use backstop::{
//!     CallResult, CircuitBreaker, CircuitBreakerConfig, DeadLetterSink, RetryConfig,
//!     RetryOrchestrator, TokenBucket,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), backstop::CallError> {
//!     let orchestrator = RetryOrchestrator::new(
//!         RetryConfig::default(),
//!         TokenBucket::new(100.0, 200),
//!         CircuitBreaker::new(CircuitBreakerConfig {
//!             failure_threshold: 5,
//!             cooldown: Duration::from_secs(15),
//!         }),
//!         DeadLetterSink::new_default(),
//!     );
//!
//!     let payload = orchestrator
//!         .execute("q=rust", |query| async move {
//!             // Replace with the real transport call using `query`
//!             let _ = query;
//!             Ok(CallResult::ok(vec![1u8, 2, 3]))
//!         })
//!         .await?;
//!
//!     println!("{} bytes", payload.len());
//!     Ok(())
//! }
//! ```

pub mod circuit_breaker;
pub mod dead_letter;
pub mod error;
pub mod rate_limiter;
pub mod retry;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use dead_letter::{DeadLetterEntry, DeadLetterSink, DeadLetterStats};
pub use error::CallError;
pub use rate_limiter::TokenBucket;
pub use retry::{
    BoxError, CallResult, RetryConfig, RetryOrchestrator, RATE_HINT_HEADER, RETRYABLE_STATUSES,
};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use backstop::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    pub use super::dead_letter::{DeadLetterEntry, DeadLetterSink};
    pub use super::error::CallError;
    pub use super::rate_limiter::TokenBucket;
    pub use super::retry::{CallResult, RetryConfig, RetryOrchestrator};
}
