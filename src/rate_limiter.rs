//! Adaptive token-bucket rate limiting
//!
//! Tracks a capped pool of call credits replenished over time at a mutable
//! rate. Acquisition blocks (asynchronously) until enough credits accumulate,
//! so the limiter delays work rather than rejecting it. The refill rate can
//! be replaced at runtime, which lets a downstream service's dynamic
//! throttling hint reshape local pacing mid-flight.
//!
//! # Example
//! ```no_run
//! use backstop::TokenBucket;
//!
//! #[tokio::main]
//! async fn main() {
//!     // 100 credits per second, at most 200 stored
//!     let limiter = TokenBucket::new(100.0, 200);
//!
//!     limiter.acquire(1).await;
//!     // ... perform the rate-limited work ...
//!
//!     // Downstream advertised a lower limit
//!     limiter.set_rate(10.0).await;
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

/// Floor applied to [`TokenBucket::set_rate`] so a bad rate hint can never
/// starve the bucket permanently.
pub const MIN_RATE: f64 = 0.001;

/// Base interval between availability checks while waiting for credits.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on the random extra wait added to each poll.
const POLL_JITTER_MS: u64 = 20;

#[derive(Debug)]
struct BucketState {
    /// Refill rate in credits per second
    rate: f64,
    /// Currently stored credits
    tokens: f64,
    /// When the last refill was accounted
    last_refill: Instant,
}

impl BucketState {
    /// Credit elapsed time at the current rate, capped at `capacity`.
    fn refill(&mut self, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(capacity);
        self.last_refill = now;
    }
}

/// Token bucket with a runtime-adjustable refill rate.
///
/// The handle is cheap to clone; clones share the same bucket. Rate, stored
/// credits, and the refill timestamp live under a single mutex, so a
/// concurrent [`set_rate`](TokenBucket::set_rate) can never be observed as a
/// torn read during refill accounting.
///
/// Waiters poll with a jittered sleep rather than queueing, so there is no
/// fairness ordering among concurrent acquirers: the first task to observe
/// sufficient credits after a refill wins them.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    state: Arc<Mutex<BucketState>>,
}

impl TokenBucket {
    /// Create a new token bucket. The bucket starts full.
    ///
    /// `rate` is in credits per second and is clamped to [`MIN_RATE`];
    /// `capacity` bounds how many credits can be stored.
    pub fn new(rate: f64, capacity: u64) -> Self {
        let capacity = capacity as f64;
        Self {
            capacity,
            state: Arc::new(Mutex::new(BucketState {
                rate: rate.max(MIN_RATE),
                tokens: capacity,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Replace the refill rate.
    ///
    /// The new rate is clamped to [`MIN_RATE`]. Stored credits are not
    /// retroactively adjusted; only future refills use the new rate.
    pub async fn set_rate(&self, new_rate: f64) {
        let mut state = self.state.lock().await;
        state.rate = new_rate.max(MIN_RATE);
        debug!(rate = state.rate, "rate limiter rate updated");
    }

    /// Acquire `n` credits, sleeping until the bucket can cover them.
    ///
    /// Returns immediately when enough credits are stored after refill.
    /// Otherwise waits in a jittered poll loop so that concurrent waiters do
    /// not wake in lockstep. Never fails, only delays; there is no upper
    /// bound on the wait.
    pub async fn acquire(&self, n: u32) {
        let need = f64::from(n);
        loop {
            {
                let mut state = self.state.lock().await;
                state.refill(self.capacity);
                if state.tokens >= need {
                    state.tokens -= need;
                    return;
                }
            }
            let jitter = rand::rng().random_range(0..POLL_JITTER_MS);
            tokio::time::sleep(POLL_INTERVAL + Duration::from_millis(jitter)).await;
        }
    }

    /// Acquire a single credit, the common case for one call.
    pub async fn acquire_one(&self) {
        self.acquire(1).await;
    }

    /// Credits currently available, after accounting any pending refill.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        state.refill(self.capacity);
        state.tokens
    }

    /// Current refill rate in credits per second.
    pub async fn rate(&self) -> f64 {
        self.state.lock().await.rate
    }

    /// Maximum number of credits the bucket can store.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}
