//! Failure classification and the bounded retry loop around single remote calls.

use std::{future::Future, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    errors::RemoteError,
    ports::{NoopObserver, ProgressObserver, Sleeper, TokioSleeper},
    Error, Result,
};

const RATE_LIMIT_MARKERS: &[&str] = &[
    "flood",
    "rate limit",
    "rate-limit",
    "ratelimit",
    "slow down",
    "too many requests",
    "retry after",
];

const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection aborted",
    "timed out",
    "timeout",
    "unreachable",
    "broken pipe",
    "dns",
    "name resolution",
    "temporarily unavailable",
];

/// How a failed remote call should be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    Transient,
    Fatal,
}

/// Classify an error by its text. Last resort for sources that only report strings.
pub fn classify(description: &str) -> FailureClass {
    let lower = description.to_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
        return FailureClass::RateLimited;
    }
    if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return FailureClass::Transient;
    }
    FailureClass::Fatal
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_cap: Duration,
    pub transient_cap: Duration,
    /// Upper bound for a server-requested wait (Telegram flood waits can be minutes).
    pub max_flood_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_cap: Duration::from_secs(30),
            transient_cap: Duration::from_secs(10),
            max_flood_wait: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// What to do after the failed 0-indexed `attempt`.
    pub fn decide(&self, error: &RemoteError, attempt: u32) -> RetryDecision {
        match error.class() {
            FailureClass::Fatal => RetryDecision::Stop,
            FailureClass::RateLimited => match error.retry_after() {
                Some(server) if server > self.max_flood_wait => RetryDecision::WaitTooLong(server),
                Some(server) => RetryDecision::RetryAfter(server),
                None => RetryDecision::RetryAfter(exponential(attempt, self.rate_limit_cap)),
            },
            FailureClass::Transient => {
                RetryDecision::RetryAfter(exponential(attempt, self.transient_cap))
            }
        }
    }
}

/// Outcome of [`RetryPolicy::decide`] for one failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then try again.
    RetryAfter(Duration),
    /// Not retryable.
    Stop,
    /// The server asked for a wait above `max_flood_wait`; retrying sooner would
    /// only be throttled again.
    WaitTooLong(Duration),
}

/// `min(2^attempt, cap)` seconds.
fn exponential(attempt: u32, cap: Duration) -> Duration {
    let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(cap)
}

/// What happened during one [`Retrier::call_traced`] invocation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
    pub delays: Vec<Duration>,
    pub last_class: Option<FailureClass>,
}

/// Wraps single remote operations with classified, capped exponential backoff.
#[derive(Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn ProgressObserver>,
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub async fn call<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RemoteError>>,
    {
        self.call_traced(operation, cancel, op).await.result
    }

    /// Like [`call`](Self::call) but also reports attempts and planned delays.
    pub async fn call_traced<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RemoteError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut outcome = RetryOutcome {
            result: Err(Error::Cancelled),
            attempts: 0,
            delays: Vec::new(),
            last_class: None,
        };

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                outcome.result = Err(Error::Cancelled);
                return outcome;
            }

            outcome.attempts = attempt + 1;
            let res = tokio::select! {
                _ = cancel.cancelled() => {
                    outcome.result = Err(Error::Cancelled);
                    return outcome;
                }
                res = op() => res,
            };

            let err = match res {
                Ok(v) => {
                    outcome.result = Ok(v);
                    return outcome;
                }
                Err(e) => e,
            };

            outcome.last_class = Some(err.class());
            let delay = match self.policy.decide(&err, attempt) {
                RetryDecision::RetryAfter(delay) => delay,
                RetryDecision::Stop => {
                    outcome.result = Err(Error::Remote {
                        operation: operation.to_string(),
                        source: err,
                    });
                    return outcome;
                }
                RetryDecision::WaitTooLong(retry_after) => {
                    outcome.result = Err(Error::FloodWaitTooLong {
                        operation: operation.to_string(),
                        retry_after,
                        max: self.policy.max_flood_wait,
                        last: err,
                    });
                    return outcome;
                }
            };

            if attempt + 1 >= max_attempts {
                outcome.result = Err(Error::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: outcome.attempts,
                    last: err,
                });
                return outcome;
            }

            self.observer
                .retry_scheduled(operation, attempt, err.class(), delay, &err);
            outcome.delays.push(delay);
            if let Err(e) = self.sleeper.sleep(delay, cancel).await {
                outcome.result = Err(e);
                return outcome;
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSleeper;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retrier(sleeper: Arc<RecordingSleeper>) -> Retrier {
        Retrier::new(RetryPolicy::default()).with_sleeper(sleeper)
    }

    #[test]
    fn classifies_by_keywords_case_insensitively() {
        assert_eq!(classify("FLOOD_WAIT_17"), FailureClass::RateLimited);
        assert_eq!(
            classify("Too Many Requests: retry after 5"),
            FailureClass::RateLimited
        );
        assert_eq!(classify("please Slow Down"), FailureClass::RateLimited);
        assert_eq!(classify("Connection Reset by peer"), FailureClass::Transient);
        assert_eq!(classify("operation timed out"), FailureClass::Transient);
        assert_eq!(classify("Broken pipe"), FailureClass::Transient);
        assert_eq!(classify("CHAT_ADMIN_REQUIRED"), FailureClass::Fatal);
        // Digits inside ids are not a throttling signal.
        assert_eq!(
            classify("telegram api error: Bad Request: chat -1004291234567 not found"),
            FailureClass::Fatal
        );
        assert_eq!(classify(""), FailureClass::Fatal);
    }

    #[test]
    fn structural_variants_skip_text_matching() {
        let e = RemoteError::Fatal("connection reset".to_string());
        assert_eq!(e.class(), FailureClass::Fatal);
        let e = RemoteError::Transient("chat not found".to_string());
        assert_eq!(e.class(), FailureClass::Transient);
        let e = RemoteError::Unclassified("FLOOD_WAIT_3".to_string());
        assert_eq!(e.class(), FailureClass::RateLimited);
    }

    #[test]
    fn backoff_is_capped_per_class() {
        let p = RetryPolicy::default();
        let rl = RemoteError::Unclassified("flood".to_string());
        let tr = RemoteError::Transient("timeout".to_string());
        let secs = |s| RetryDecision::RetryAfter(Duration::from_secs(s));
        assert_eq!(p.decide(&rl, 0), secs(1));
        assert_eq!(p.decide(&rl, 3), secs(8));
        assert_eq!(p.decide(&rl, 5), secs(30));
        assert_eq!(p.decide(&rl, 64), secs(30));
        assert_eq!(p.decide(&tr, 3), secs(8));
        assert_eq!(p.decide(&tr, 4), secs(10));
        assert_eq!(
            p.decide(&RemoteError::Fatal("no".to_string()), 0),
            RetryDecision::Stop
        );
    }

    #[test]
    fn server_retry_after_is_honoured_up_to_the_ceiling() {
        let p = RetryPolicy::default();
        let short = RemoteError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
            message: "retry".to_string(),
        };
        let long = RemoteError::RateLimited {
            retry_after: Some(Duration::from_secs(3600)),
            message: "retry".to_string(),
        };
        assert_eq!(
            p.decide(&short, 0),
            RetryDecision::RetryAfter(Duration::from_secs(7))
        );
        assert_eq!(
            p.decide(&long, 0),
            RetryDecision::WaitTooLong(Duration::from_secs(3600))
        );
    }

    #[tokio::test]
    async fn flood_wait_above_ceiling_fails_without_sleeping() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let outcome = retrier(sleeper.clone())
            .call_traced("fetch page", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(RemoteError::RateLimited {
                        retry_after: Some(Duration::from_secs(300)),
                        message: "FLOOD_WAIT_300".to_string(),
                    })
                }
            })
            .await;

        match outcome.result {
            Err(Error::FloodWaitTooLong {
                retry_after, max, ..
            }) => {
                assert_eq!(retry_after, Duration::from_secs(300));
                assert_eq!(max, Duration::from_secs(60));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn rate_limited_twice_then_success() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let outcome = retrier(sleeper.clone())
            .call_traced("fetch page", &cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(RemoteError::Unclassified("FLOOD_WAIT".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 2);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let slept = sleeper.slept();
        assert_eq!(slept.len(), 2);
        assert!(slept[0] <= slept[1]);
        assert!(slept.iter().all(|d| *d <= Duration::from_secs(30)));
        assert_eq!(slept, outcome.delays);
    }

    #[tokio::test]
    async fn fatal_fails_immediately_without_sleeping() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let outcome = retrier(sleeper.clone())
            .call_traced("fetch page", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RemoteError::Unclassified("CHAT_ADMIN_REQUIRED".into())) }
            })
            .await;

        assert!(matches!(outcome.result, Err(Error::Remote { .. })));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept().is_empty());
        assert_eq!(outcome.last_class, Some(FailureClass::Fatal));
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_error_and_never_exceeds_max_attempts() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let err = retrier(sleeper.clone())
            .call("fetch page", &cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(RemoteError::Transient(format!("timeout #{n}"))) }
            })
            .await
            .unwrap_err();

        match err {
            Error::RetriesExhausted {
                operation,
                attempts,
                last,
            } => {
                assert_eq!(operation, "fetch page");
                assert_eq!(attempts, 3);
                assert_eq!(last, RemoteError::Transient("timeout #2".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // No sleep after the final attempt.
        assert_eq!(
            sleeper.slept(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_attempt() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = retrier(sleeper.clone())
            .call_traced("fetch page", &cancel, || async { Ok::<_, RemoteError>(1) })
            .await;

        assert!(matches!(outcome.result, Err(Error::Cancelled)));
        assert_eq!(outcome.attempts, 0);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_aborts() {
        let cancel = CancellationToken::new();
        let sleeper = Arc::new(RecordingSleeper::cancelling(cancel.clone()));
        let calls = AtomicU32::new(0);

        let err = retrier(sleeper)
            .call("fetch page", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RemoteError::Transient("reset".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tokio_sleeper_returns_early_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = TokioSleeper
            .sleep(Duration::from_secs(3600), &cancel)
            .await;
        assert!(matches!(res, Err(Error::Cancelled)));
    }
}
