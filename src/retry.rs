//! Backoff policy for upstream search calls
//!
//! Every call to the search API goes through [`call_with_backoff`], an explicit
//! retry loop that classifies each failure and decides whether to sleep and
//! retry, abandon the current unit, or escalate to the caller:
//!
//! | failure | decision |
//! |---|---|
//! | rate limited, structured hint | sleep hint + margin, retry |
//! | rate limited, "try again in N minutes" text | sleep N + margin, retry; escalate if unparsable or above the cap |
//! | server error (5xx) | exponential backoff + jitter, retry |
//! | network failure | exponential backoff + jitter, retry |
//! | access denied / not found / restricted | skip the unit |
//! | anything else | exponential backoff + jitter, retry |
//!
//! Sleeps never exceed [`RetryConfig::max_delay`], and the number of retries
//! never exceeds [`RetryConfig::max_attempts`]. A sleep wakes early when the
//! job's cancellation token fires.
//!
//! # Example
//!
//! ```no_run
//! use search_harvest::config::RetryConfig;
//! use search_harvest::error::UpstreamError;
//! use search_harvest::retry::{call_with_backoff, NoopObserver, Outcome};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), UpstreamError> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let outcome = call_with_backoff(&config, &NoopObserver, &cancel, || async {
//!     Ok::<_, UpstreamError>(42)
//! })
//! .await?;
//! assert!(matches!(outcome, Outcome::Completed(42)));
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::UpstreamError;
use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What to do about a failed upstream call
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Sleep, then call again
    Retry {
        /// How long to sleep (already capped)
        delay: Duration,
        /// Human-readable reason, surfaced in the job status message
        reason: String,
    },
    /// Abandon the current unit and move on
    SkipUnit,
    /// Give up and hand the failure to the caller
    Escalate,
}

/// Result of a call made under the backoff policy
#[derive(Debug)]
pub enum Outcome<T> {
    /// The call succeeded
    Completed(T),
    /// The resource is permanently inaccessible; the unit should be skipped
    Skipped(UpstreamError),
    /// Cancellation fired while sleeping between attempts
    Interrupted,
}

/// Receives notice of every backoff sleep before it starts
#[async_trait]
pub trait BackoffObserver: Send + Sync {
    /// Called with the reason, sleep length and 1-based retry number
    async fn on_backoff(&self, reason: &str, delay: Duration, attempt: u32);
}

/// Observer that ignores backoff notifications
pub struct NoopObserver;

#[async_trait]
impl BackoffObserver for NoopObserver {
    async fn on_backoff(&self, _reason: &str, _delay: Duration, _attempt: u32) {}
}

#[allow(clippy::expect_used)] // literal pattern
fn wait_hint_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*(seconds?|minutes?|hours?)").expect("static wait pattern is valid")
    })
}

/// Parse a free-text wait hint such as "Try again in 3 minutes."
///
/// Only the first number/unit pair counts: "1 minute 30 seconds" reads as one
/// minute. Returns `None` when no pair is present.
pub fn parse_wait_hint(message: &str) -> Option<Duration> {
    let captures = wait_hint_pattern().captures(message)?;
    let amount: u64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str().to_lowercase();

    let secs = if unit.starts_with("second") {
        amount
    } else if unit.starts_with("minute") {
        amount.checked_mul(60)?
    } else {
        amount.checked_mul(3600)?
    };
    Some(Duration::from_secs(secs))
}

/// Exponential delay for the given 1-based retry number, jittered and capped
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    let base = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    let cap = config.max_delay.as_secs_f64();

    let base = if base.is_finite() { base.min(cap) } else { cap };
    let delay = Duration::from_secs_f64(base.max(0.0));
    let delay = if config.jitter { add_jitter(delay) } else { delay };
    delay.min(config.max_delay)
}

/// Decide how to react to `error` on the given 1-based retry number
pub fn classify(config: &RetryConfig, error: &UpstreamError, attempt: u32) -> RetryDecision {
    match error {
        UpstreamError::AccessDenied { .. } => RetryDecision::SkipUnit,
        UpstreamError::RateLimited {
            retry_after: Some(hint),
            ..
        } => RetryDecision::Retry {
            delay: (*hint + config.rate_limit_margin).min(config.max_delay),
            reason: "Rate limited".to_string(),
        },
        UpstreamError::RateLimited {
            retry_after: None,
            message,
        } => match parse_wait_hint(message) {
            Some(hint) if hint <= config.max_delay => RetryDecision::Retry {
                delay: (hint + config.rate_limit_margin).min(config.max_delay),
                reason: "API ratelimit".to_string(),
            },
            _ => RetryDecision::Escalate,
        },
        UpstreamError::Server { status } => RetryDecision::Retry {
            delay: backoff_delay(config, attempt),
            reason: format!("Server error {}", status),
        },
        UpstreamError::Network(_) => RetryDecision::Retry {
            delay: backoff_delay(config, attempt),
            reason: "Network error".to_string(),
        },
        UpstreamError::Other(_) => RetryDecision::Retry {
            delay: backoff_delay(config, attempt),
            reason: "Upstream error".to_string(),
        },
    }
}

/// Execute an upstream call under the backoff policy
///
/// Returns `Err` with the last failure once a failure escalates or the retry
/// budget is spent.
pub async fn call_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    observer: &dyn BackoffObserver,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<Outcome<T>, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Upstream call succeeded after retry");
                }
                return Ok(Outcome::Completed(value));
            }
            Err(e) => e,
        };

        let decision = classify(config, &error, attempt + 1);
        match decision {
            RetryDecision::SkipUnit => {
                tracing::warn!(error = %error, "Upstream resource inaccessible, skipping");
                return Ok(Outcome::Skipped(error));
            }
            RetryDecision::Escalate => {
                tracing::error!(error = %error, "Upstream failure is not retryable");
                return Err(error);
            }
            RetryDecision::Retry { .. } if attempt >= config.max_attempts => {
                tracing::error!(
                    error = %error,
                    attempts = attempt + 1,
                    "Upstream call failed after all retry attempts exhausted"
                );
                return Err(error);
            }
            RetryDecision::Retry { delay, reason } => {
                attempt += 1;

                tracing::warn!(
                    error = %error,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Upstream call failed, backing off"
                );

                observer.on_backoff(&reason, delay, attempt).await;

                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Backoff sleep interrupted by cancellation");
                        return Ok(Outcome::Interrupted);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            jitter: false,
            rate_limit_margin: Duration::from_millis(5),
        }
    }

    /// Records every backoff notification
    #[derive(Default)]
    struct RecordingObserver {
        calls: Mutex<Vec<(String, Duration, u32)>>,
    }

    #[async_trait]
    impl BackoffObserver for RecordingObserver {
        async fn on_backoff(&self, reason: &str, delay: Duration, attempt: u32) {
            self.calls
                .lock()
                .await
                .push((reason.to_string(), delay, attempt));
        }
    }

    #[test]
    fn test_parse_wait_hint_units() {
        assert_eq!(
            parse_wait_hint("You're doing that too much. Try again in 3 minutes."),
            Some(Duration::from_secs(180))
        );
        assert_eq!(
            parse_wait_hint("try again in 57 seconds"),
            Some(Duration::from_secs(57))
        );
        assert_eq!(
            parse_wait_hint("Try again in 1 HOUR"),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(parse_wait_hint("try again later"), None);
    }

    #[test]
    fn test_parse_wait_hint_uses_first_pair_only() {
        assert_eq!(
            parse_wait_hint("Try again in 1 minute 30 seconds."),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_classify_access_denied_skips() {
        let config = fast_config(3);
        let decision = classify(&config, &UpstreamError::AccessDenied { status: 403 }, 1);
        assert_eq!(decision, RetryDecision::SkipUnit);
    }

    #[test]
    fn test_classify_structured_rate_limit_uses_hint_plus_margin() {
        let config = fast_config(3);
        let error = UpstreamError::RateLimited {
            retry_after: Some(Duration::from_millis(50)),
            message: "429".into(),
        };
        match classify(&config, &error, 1) {
            RetryDecision::Retry { delay, .. } => assert_eq!(delay, Duration::from_millis(55)),
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_structured_rate_limit_is_capped() {
        let config = fast_config(3);
        let error = UpstreamError::RateLimited {
            retry_after: Some(Duration::from_secs(600)),
            message: "429".into(),
        };
        match classify(&config, &error, 1) {
            RetryDecision::Retry { delay, .. } => assert_eq!(delay, config.max_delay),
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_text_rate_limit() {
        let mut config = fast_config(3);
        config.max_delay = Duration::from_secs(600);

        let within = UpstreamError::RateLimited {
            retry_after: None,
            message: "Try again in 2 minutes".into(),
        };
        match classify(&config, &within, 1) {
            RetryDecision::Retry { delay, reason } => {
                assert_eq!(delay, Duration::from_secs(120) + config.rate_limit_margin);
                assert_eq!(reason, "API ratelimit");
            }
            other => panic!("expected retry, got {other:?}"),
        }

        let too_long = UpstreamError::RateLimited {
            retry_after: None,
            message: "Try again in 2 hours".into(),
        };
        assert_eq!(classify(&config, &too_long, 1), RetryDecision::Escalate);

        let unparsable = UpstreamError::RateLimited {
            retry_after: None,
            message: "slow down".into(),
        };
        assert_eq!(classify(&config, &unparsable, 1), RetryDecision::Escalate);
    }

    #[test]
    fn test_backoff_delay_is_exponential_without_jitter() {
        let config = fast_config(5);
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(10));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(20));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(40));
        assert_eq!(backoff_delay(&config, 10), Duration::from_millis(200));
    }

    #[test]
    fn test_backoff_delay_never_exceeds_cap() {
        let config = RetryConfig {
            jitter: true,
            backoff_multiplier: 10.0,
            ..fast_config(5)
        };
        for attempt in 1..=100 {
            assert!(backoff_delay(&config, attempt) <= config.max_delay);
        }
    }

    #[test]
    fn test_jitter_stays_within_double() {
        let delay = Duration::from_millis(100);
        for _ in 0..50 {
            let jittered = add_jitter(delay);
            assert!(jittered >= delay);
            assert!(jittered <= delay * 2);
        }
    }

    #[tokio::test]
    async fn test_success_no_retry() {
        let config = fast_config(3);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let outcome = call_with_backoff(&config, &NoopObserver, &CancellationToken::new(), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UpstreamError>(42)
            }
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Completed(42)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_errors_retry_then_succeed() {
        let config = fast_config(3);
        let observer = RecordingObserver::default();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let outcome = call_with_backoff(&config, &observer, &CancellationToken::new(), || {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(UpstreamError::Server { status: 503 })
                } else {
                    Ok("rows")
                }
            }
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Completed("rows")));
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        let calls = observer.calls.lock().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "Server error 503");
        assert_eq!(calls[0].2, 1);
        assert_eq!(calls[1].2, 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_escalates_last_error() {
        let config = fast_config(2);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = call_with_backoff(&config, &NoopObserver, &CancellationToken::new(), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(UpstreamError::Network("connection reset".into()))
            }
        })
        .await;

        assert_eq!(
            result.unwrap_err(),
            UpstreamError::Network("connection reset".into())
        );
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "should try initial + 2 retries"
        );
    }

    #[tokio::test]
    async fn test_access_denied_skips_without_retry() {
        let config = fast_config(3);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let outcome = call_with_backoff(&config, &NoopObserver, &CancellationToken::new(), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(UpstreamError::AccessDenied { status: 451 })
            }
        })
        .await
        .unwrap();

        assert!(matches!(
            outcome,
            Outcome::Skipped(UpstreamError::AccessDenied { status: 451 })
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unparsable_rate_limit_escalates_immediately() {
        let config = fast_config(5);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = call_with_backoff(&config, &NoopObserver, &CancellationToken::new(), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(UpstreamError::RateLimited {
                    retry_after: None,
                    message: "RATELIMIT".into(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_sleep() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            ..fast_config(3)
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let start = std::time::Instant::now();
        let outcome = call_with_backoff(&config, &NoopObserver, &cancel, || async {
            Err::<(), _>(UpstreamError::Server { status: 500 })
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Interrupted));
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "sleep should end on cancel, took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_individual_sleeps_never_exceed_max_delay() {
        let config = RetryConfig {
            max_attempts: 4,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(100),
            backoff_multiplier: 10.0,
            jitter: true,
            rate_limit_margin: Duration::ZERO,
        };
        let observer = RecordingObserver::default();

        let _ = call_with_backoff(&config, &observer, &CancellationToken::new(), || async {
            Err::<(), _>(UpstreamError::Other("boom".into()))
        })
        .await;

        let calls = observer.calls.lock().await;
        assert_eq!(calls.len(), 4, "one notification per retry");
        for (_, delay, _) in calls.iter() {
            assert!(*delay <= config.max_delay, "delay {delay:?} above cap");
        }
    }
}
