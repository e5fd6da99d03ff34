//! Full-stack scenarios for the retry orchestrator and its collaborators

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use backstop::{
    BoxError, CallError, CallResult, CircuitBreaker, CircuitBreakerConfig, DeadLetterSink,
    RetryConfig, RetryOrchestrator, TokenBucket, RATE_HINT_HEADER,
};

/// Orchestrator with fast defaults: no token waiting, breaker far from
/// tripping, small backoff
fn fast_orchestrator<R: Clone>(max_attempts: u32) -> RetryOrchestrator<R> {
    RetryOrchestrator::new(
        RetryConfig {
            max_attempts,
            base_backoff: Duration::from_millis(20),
        },
        TokenBucket::new(10_000.0, 1_000),
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 100,
            cooldown: Duration::from_secs(30),
        }),
        DeadLetterSink::new(100),
    )
}

#[tokio::test]
async fn retryable_status_exhausts_attempts() {
    let orchestrator = fast_orchestrator(4);
    let attempt_times: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

    let result: Result<(), CallError> = orchestrator
        .execute(7u32, {
            let attempt_times = Arc::clone(&attempt_times);
            move |_req| {
                let attempt_times = Arc::clone(&attempt_times);
                async move {
                    attempt_times.lock().unwrap().push(Instant::now());
                    Ok::<_, BoxError>(CallResult::with_status(500, ()))
                }
            }
        })
        .await;

    assert_eq!(
        result,
        Err(CallError::MaxAttemptsExceeded {
            attempts: 4,
            status: 500
        })
    );

    // All four attempts were made, with strictly increasing backoff gaps
    let times = attempt_times.lock().unwrap();
    assert_eq!(times.len(), 4);
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    for pair in gaps.windows(2) {
        assert!(pair[1] > pair[0], "backoff gaps not increasing: {gaps:?}");
    }

    // Exactly one dead-letter record for the whole exhausted chain
    let entries = orchestrator.sink().drain().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].request, 7);
    assert_eq!(
        entries[0].reason,
        "retryable status 500 persisted through 4 attempts"
    );
}

#[tokio::test]
async fn non_retryable_status_fails_fast() {
    let orchestrator = fast_orchestrator(6);
    let calls = Arc::new(AtomicU32::new(0));

    let start = Instant::now();
    let result: Result<(), CallError> = orchestrator
        .execute("doc-42", {
            let calls = Arc::clone(&calls);
            move |_req| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(CallResult::with_status(404, ()))
                }
            }
        })
        .await;

    assert_eq!(result, Err(CallError::NonRetryable { status: 404 }));
    // One attempt, no backoff sleep
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_millis(100));

    let entries = orchestrator.sink().drain().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, "non-retryable status 404");
}

#[tokio::test]
async fn upstream_error_is_terminal() {
    let orchestrator = fast_orchestrator(6);

    let result: Result<(), CallError> = orchestrator
        .execute(1u32, |_req| async move {
            Err::<CallResult<()>, BoxError>("connection reset".into())
        })
        .await;

    assert_eq!(
        result,
        Err(CallError::Upstream("connection reset".to_string()))
    );
    assert_eq!(orchestrator.sink().len().await, 1);
    // Exactly one breaker update for the single attempt
    assert_eq!(orchestrator.breaker().failure_count().await, 1);
}

#[tokio::test]
async fn rate_hint_reshapes_limiter_mid_chain() {
    let orchestrator = fast_orchestrator(3);
    let calls = Arc::new(AtomicU32::new(0));

    assert_eq!(orchestrator.limiter().rate().await, 10_000.0);

    let result = orchestrator
        .execute((), {
            let calls = Arc::clone(&calls);
            move |_req| {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        // Throttled, with a new advertised limit
                        Ok::<_, BoxError>(
                            CallResult::with_status(429, "").header(RATE_HINT_HEADER, "10"),
                        )
                    } else {
                        Ok(CallResult::ok("hits"))
                    }
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "hits");
    // The 429's hint took effect even though that attempt failed
    assert_eq!(orchestrator.limiter().rate().await, 10.0);
    // The retryable attempt was absorbed, nothing dead-lettered
    assert!(orchestrator.sink().is_empty().await);
}

#[tokio::test]
async fn unparseable_rate_hint_is_ignored() {
    let orchestrator = fast_orchestrator(1);

    let result: Result<&str, CallError> = orchestrator
        .execute((), |_req| async move {
            Ok::<_, BoxError>(CallResult::ok("data").header(RATE_HINT_HEADER, "not-a-number"))
        })
        .await;

    assert_eq!(result.unwrap(), "data");
    assert_eq!(orchestrator.limiter().rate().await, 10_000.0);
}

#[tokio::test]
async fn breaker_opens_and_rejects_without_calling_op() {
    let orchestrator = RetryOrchestrator::new(
        RetryConfig {
            max_attempts: 6,
            base_backoff: Duration::from_millis(5),
        },
        TokenBucket::new(10_000.0, 1_000),
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(30),
        }),
        DeadLetterSink::new(100),
    );
    let calls = Arc::new(AtomicU32::new(0));

    let op = {
        let calls = Arc::clone(&calls);
        move |_req: u32| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(CallResult::with_status(404, ()))
            }
        }
    };

    // Two terminal failures trip the breaker
    for req in [1u32, 2] {
        let result = orchestrator.execute(req, &op).await;
        assert_eq!(result, Err(CallError::NonRetryable { status: 404 }));
    }
    assert!(orchestrator.breaker().is_open().await);

    // The rejection propagates immediately, without invoking the call, and
    // is dead-lettered like any other terminal failure
    let result = orchestrator.execute(3u32, &op).await;
    assert_eq!(result, Err(CallError::CircuitOpen));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let entries = orchestrator.sink().drain().await;
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].request, 3);
    assert_eq!(entries[2].reason, CallError::CircuitOpen.to_string());
}

#[tokio::test]
async fn breaker_recloses_after_cooldown() {
    let orchestrator = RetryOrchestrator::new(
        RetryConfig {
            max_attempts: 2,
            base_backoff: Duration::from_millis(5),
        },
        TokenBucket::new(10_000.0, 1_000),
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_millis(50),
        }),
        DeadLetterSink::new(100),
    );

    let failed: Result<(), CallError> = orchestrator
        .execute((), |_req| async move {
            Ok::<_, BoxError>(CallResult::with_status(403, ()))
        })
        .await;
    assert_eq!(failed, Err(CallError::NonRetryable { status: 403 }));
    assert!(orchestrator.breaker().is_open().await);

    tokio::time::sleep(Duration::from_millis(60)).await;

    // Time alone recloses the gate; the next call goes straight through
    let recovered = orchestrator
        .execute((), |_req| async move { Ok::<_, BoxError>(CallResult::ok(99)) })
        .await;
    assert_eq!(recovered.unwrap(), 99);
    assert_eq!(orchestrator.breaker().failure_count().await, 0);
}

#[tokio::test]
async fn success_resets_breaker_failure_count() {
    let orchestrator = fast_orchestrator(2);
    let calls = Arc::new(AtomicU32::new(0));

    let result = orchestrator
        .execute((), {
            let calls = Arc::clone(&calls);
            move |_req| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Ok::<_, BoxError>(CallResult::with_status(503, "".to_string()))
                    } else {
                        Ok(CallResult::ok("recovered".to_string()))
                    }
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "recovered");
    // The 503 bumped the count, the 200 reset it
    assert_eq!(orchestrator.breaker().failure_count().await, 0);
    assert!(orchestrator.sink().is_empty().await);
}

#[tokio::test]
async fn shared_sink_evicts_oldest_across_calls() {
    let orchestrator = RetryOrchestrator::new(
        RetryConfig {
            max_attempts: 1,
            base_backoff: Duration::from_millis(5),
        },
        TokenBucket::new(10_000.0, 1_000),
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 100,
            cooldown: Duration::from_secs(30),
        }),
        DeadLetterSink::new(2),
    );

    for req in [1u32, 2, 3] {
        let result: Result<(), CallError> = orchestrator
            .execute(req, |_req| async move {
                Ok::<_, BoxError>(CallResult::with_status(400, ()))
            })
            .await;
        assert!(result.is_err());
    }

    let stats = orchestrator.sink().stats().await;
    assert_eq!(stats.total_recorded, 3);
    assert_eq!(stats.total_evicted, 1);

    let requests: Vec<u32> = orchestrator
        .sink()
        .drain()
        .await
        .into_iter()
        .map(|e| e.request)
        .collect();
    assert_eq!(requests, vec![2, 3]);
}

#[tokio::test]
async fn concurrent_callers_share_collaborators() {
    let orchestrator = fast_orchestrator::<u32>(6);

    let mut handles = Vec::new();
    for req in 0..8u32 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .execute(req, |r| async move { Ok::<_, BoxError>(CallResult::ok(r * 2)) })
                .await
        }));
    }

    for (req, handle) in handles.into_iter().enumerate() {
        let payload = handle.await.unwrap().unwrap();
        assert_eq!(payload, req as u32 * 2);
    }
    assert!(orchestrator.sink().is_empty().await);
}
