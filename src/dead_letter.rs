//! Bounded dead-letter capture for terminally failed calls
//!
//! When a call fails past the point of retrying — a non-retryable status, an
//! upstream error, a breaker rejection, or a retryable status that survived
//! every allowed attempt — a snapshot of its original arguments is recorded
//! here together with a human-readable reason. The store is bounded:
//! recording past capacity evicts the oldest entry, never blocks, and never
//! loses the newest entry.
//!
//! Entries live only for the lifetime of the process; callers that want to
//! inspect or reprocess them can [`drain`](DeadLetterSink::drain) the sink.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::Mutex;

/// A single captured terminal failure
#[derive(Debug, Clone)]
pub struct DeadLetterEntry<R> {
    /// Snapshot of the call's original arguments
    pub request: R,
    /// Human-readable description of the terminal failure
    pub reason: String,
    /// When the failure was recorded
    pub failed_at: SystemTime,
}

impl<R> DeadLetterEntry<R> {
    /// Create an entry stamped with the current time
    pub fn new(request: R, reason: impl Into<String>) -> Self {
        Self {
            request,
            reason: reason.into(),
            failed_at: SystemTime::now(),
        }
    }
}

#[derive(Debug)]
struct SinkState<R> {
    entries: VecDeque<DeadLetterEntry<R>>,
    total_recorded: u64,
    total_evicted: u64,
}

/// Bounded, insertion-ordered store of failed-call records.
///
/// The handle is cheap to clone; clones share the same store, and
/// [`record`](DeadLetterSink::record) takes the internal mutex so concurrent
/// writers cannot lose entries or double-evict.
#[derive(Debug)]
pub struct DeadLetterSink<R> {
    capacity: usize,
    state: Arc<Mutex<SinkState<R>>>,
}

impl<R> Clone for DeadLetterSink<R> {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            state: Arc::clone(&self.state),
        }
    }
}

impl<R> DeadLetterSink<R> {
    /// Reference capacity used by [`DeadLetterSink::new_default`]
    pub const DEFAULT_CAPACITY: usize = 10_000;

    /// Create a sink holding at most `capacity` entries.
    ///
    /// A capacity of zero is clamped to one so the newest entry can always
    /// be kept.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Arc::new(Mutex::new(SinkState {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                total_recorded: 0,
                total_evicted: 0,
            })),
        }
    }

    /// Create a sink with the reference capacity of 10,000 entries
    pub fn new_default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }

    /// Record an entry.
    ///
    /// If the sink is at capacity, the oldest entry is evicted first. Never
    /// fails and never waits on capacity.
    pub async fn record(&self, entry: DeadLetterEntry<R>) {
        let mut state = self.state.lock().await;
        state.total_recorded += 1;
        if state.entries.len() >= self.capacity {
            state.entries.pop_front();
            state.total_evicted += 1;
        }
        state.entries.push_back(entry);
    }

    /// Number of entries currently stored
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Check if the sink holds no entries
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Remove and return all entries, oldest first
    pub async fn drain(&self) -> Vec<DeadLetterEntry<R>> {
        let mut state = self.state.lock().await;
        state.entries.drain(..).collect()
    }

    /// Counters describing the sink's activity so far
    pub async fn stats(&self) -> DeadLetterStats {
        let state = self.state.lock().await;
        DeadLetterStats {
            current: state.entries.len(),
            capacity: self.capacity,
            total_recorded: state.total_recorded,
            total_evicted: state.total_evicted,
        }
    }

    /// Maximum number of entries the sink can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Statistics for the dead-letter sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterStats {
    /// Current number of entries
    pub current: usize,
    /// Maximum capacity
    pub capacity: usize,
    /// Total entries ever recorded
    pub total_recorded: u64,
    /// Total entries evicted due to capacity overflow
    pub total_evicted: u64,
}
