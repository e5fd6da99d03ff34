//! Retry orchestration: the call-wrapping control loop
//!
//! [`RetryOrchestrator`] wraps an arbitrary external call with the full
//! resilience policy: it consults the circuit breaker, acquires a rate-limit
//! credit, invokes the call, applies any rate hint the response advertises,
//! classifies the outcome, and either returns the payload, retries with
//! exponential backoff, or records the failure to the dead-letter sink and
//! propagates it.
//!
//! Classification is typed — a [`CallResult`] status maps onto a
//! success / retryable / terminal outcome, never onto string comparisons.
//! Retryable statuses (`{429, 500, 502, 503, 504}`) are absorbed until
//! `max_attempts` is exhausted; every other failure terminates immediately.
//! Each terminal failure is recorded to the sink exactly once before the
//! error reaches the caller, and exactly one breaker update happens per
//! attempt.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::dead_letter::{DeadLetterEntry, DeadLetterSink};
use crate::error::CallError;
use crate::rate_limiter::TokenBucket;

/// Header through which the upstream advertises a new recommended rate
/// (credits per second), applied to the limiter before classification.
pub const RATE_HINT_HEADER: &str = "X-Rate-Limit-RPS";

/// Statuses treated as transient and worth retrying
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Error type produced by the wrapped external call
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structured result of one invocation of the external call.
///
/// The orchestrator interprets only `status` and the rate-hint header;
/// `payload` is opaque and returned to the caller on success.
#[derive(Debug, Clone)]
pub struct CallResult<T> {
    /// Status code reported by the upstream
    pub status: u16,
    /// Response headers; insertion order is irrelevant
    pub headers: HashMap<String, String>,
    /// Opaque response payload
    pub payload: T,
}

impl<T> CallResult<T> {
    /// A 200 response carrying `payload` and no headers
    pub fn ok(payload: T) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            payload,
        }
    }

    /// A response with the given status and no headers
    pub fn with_status(status: u16, payload: T) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            payload,
        }
    }

    /// Attach a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Typed outcome of classifying one attempt. Retryable outcomes stay
/// internal to the loop; everything else maps onto a surfaced [`CallError`].
enum Outcome<T> {
    Success(T),
    Retryable(u16),
    Terminal(CallError),
}

/// Configuration for the retry loop
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first; a hard ceiling
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles on each further retry
    pub base_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_backoff: Duration::from_millis(300),
        }
    }
}

/// Wraps an external call with rate limiting, circuit breaking, retries,
/// and dead-letter capture.
///
/// The orchestrator is the sole caller of its three collaborators; the
/// limiter, breaker, and sink handles it holds may be shared with other
/// orchestrators or tasks.
///
/// # Example
/// ```no_run
/// use backstop::{
///     CallResult, CircuitBreaker, DeadLetterSink, RetryConfig, RetryOrchestrator, TokenBucket,
/// };
///
/// #[tokio::main]
/// async fn main() -> Result<(), backstop::CallError> {
///     let orchestrator = RetryOrchestrator::new(
///         RetryConfig::default(),
///         TokenBucket::new(100.0, 200),
///         CircuitBreaker::new_default(),
///         DeadLetterSink::new_default(),
///     );
///
///     let payload = orchestrator
///         .execute("q=rust", |query| async move {
///             // Replace with the real transport call using `query`
///             let _ = query;
///             Ok(CallResult::ok(vec![1u8, 2, 3]))
///         })
///         .await?;
///
///     println!("{} bytes", payload.len());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct RetryOrchestrator<R> {
    config: RetryConfig,
    limiter: TokenBucket,
    breaker: CircuitBreaker,
    sink: DeadLetterSink<R>,
}

impl<R> Clone for RetryOrchestrator<R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            limiter: self.limiter.clone(),
            breaker: self.breaker.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<R: Clone> RetryOrchestrator<R> {
    /// Create an orchestrator from its configuration and injected
    /// collaborator instances
    pub fn new(
        config: RetryConfig,
        limiter: TokenBucket,
        breaker: CircuitBreaker,
        sink: DeadLetterSink<R>,
    ) -> Self {
        Self {
            config,
            limiter,
            breaker,
            sink,
        }
    }

    /// The dead-letter sink this orchestrator records to
    pub fn sink(&self) -> &DeadLetterSink<R> {
        &self.sink
    }

    /// The token bucket pacing this orchestrator's calls
    pub fn limiter(&self) -> &TokenBucket {
        &self.limiter
    }

    /// The circuit breaker gating this orchestrator's calls
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Invoke `op` with `request` under the full resilience policy.
    ///
    /// Per attempt: the breaker is consulted, one rate-limit credit is
    /// acquired (blocking as needed), the call is made, any advertised rate
    /// hint is applied to the limiter, and the outcome is classified. A 200
    /// status returns the payload. A retryable status backs off
    /// exponentially (with 0.9–1.1 jitter) and tries again up to
    /// `max_attempts` total tries. Everything else — a non-retryable status,
    /// an error from `op`, or a breaker rejection — terminates immediately.
    ///
    /// Every terminal failure is recorded to the dead-letter sink exactly
    /// once before the error is returned. A breaker rejection counts toward
    /// the breaker's own failure count and is dead-lettered like any other
    /// terminal failure.
    pub async fn execute<T, F, Fut>(&self, request: R, op: F) -> Result<T, CallError>
    where
        F: Fn(R) -> Fut,
        Fut: Future<Output = Result<CallResult<T>, BoxError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Err(err) = self.breaker.before().await {
                self.breaker.failure().await;
                return Err(self.fail_terminally(request, err).await);
            }

            self.limiter.acquire(1).await;

            let outcome = match op(request.clone()).await {
                Ok(resp) => self.classify(resp).await,
                Err(e) => Outcome::Terminal(CallError::Upstream(e.to_string())),
            };

            match outcome {
                Outcome::Success(payload) => {
                    self.breaker.success().await;
                    return Ok(payload);
                }
                Outcome::Retryable(status) => {
                    self.breaker.failure().await;
                    if attempt >= max_attempts {
                        let err = CallError::MaxAttemptsExceeded {
                            attempts: attempt,
                            status,
                        };
                        return Err(self.fail_terminally(request, err).await);
                    }
                    let delay = backoff_delay(self.config.base_backoff, attempt);
                    debug!(attempt, status, delay = ?delay, "retryable status, backing off");
                    tokio::time::sleep(delay).await;
                }
                Outcome::Terminal(err) => {
                    self.breaker.failure().await;
                    return Err(self.fail_terminally(request, err).await);
                }
            }
        }
    }

    /// Apply any advertised rate hint, then classify the response status.
    async fn classify<T>(&self, resp: CallResult<T>) -> Outcome<T> {
        if let Some(hint) = resp.headers.get(RATE_HINT_HEADER) {
            if let Ok(rate) = hint.parse::<f64>() {
                self.limiter.set_rate(rate).await;
            }
        }

        if resp.status == 200 {
            Outcome::Success(resp.payload)
        } else if RETRYABLE_STATUSES.contains(&resp.status) {
            Outcome::Retryable(resp.status)
        } else {
            Outcome::Terminal(CallError::NonRetryable {
                status: resp.status,
            })
        }
    }

    /// Record the terminal failure to the dead-letter sink, then hand the
    /// error back for propagation.
    async fn fail_terminally(&self, request: R, err: CallError) -> CallError {
        warn!(error = %err, "call failed terminally, dead-lettering");
        self.sink
            .record(DeadLetterEntry::new(request, err.to_string()))
            .await;
        err
    }
}

/// Exponential backoff for retry attempt `attempt` (1-based): doubles per
/// attempt, jittered by a uniform 0.9–1.1 factor to desynchronize
/// concurrent retriers.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.as_secs_f64() * 2_f64.powi(attempt as i32 - 1);
    let jitter = rand::rng().random_range(0.9..1.1);
    Duration::from_secs_f64(exp * jitter)
}
