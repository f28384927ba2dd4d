use std::future::Future;
use std::time::Instant;

use rand::Rng;
use tokio::time::{sleep, Duration};

use super::FetchError;
use crate::logging::{log_fetch_attempt, log_retry};

/// Delay strategy between attempts. `attempt` is 0 for the first retry.
pub trait BackoffPolicy: Send + Sync {
    fn delay_for_attempt(&self, attempt: u32) -> Duration;
}

/// Exponential backoff: `base * 2^attempt`, clamped, with optional jitter.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 8000,
            jitter_factor: 0.0,
        }
    }
}

impl ExponentialBackoff {
    pub fn with_base(base_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms: base_delay_ms.saturating_mul(8),
            ..Default::default()
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * 2.0_f64.powi(attempt as i32);
        let clamped = base.min(self.max_delay_ms as f64);

        if self.jitter_factor <= 0.0 {
            return Duration::from_millis(clamped as u64);
        }
        let jitter_range = clamped * self.jitter_factor;
        let jitter: f64 = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_millis((clamped + jitter).max(0.0) as u64)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `retries` extra attempts are spent. Each attempt's latency is logged.
pub async fn retry_classified<F, Fut, T>(
    policy: &dyn BackoffPolicy,
    label: &str,
    retries: u32,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        let started = Instant::now();
        let result = operation(attempt).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                log_fetch_attempt(label, attempt + 1, latency_ms, "ok");
                return Ok(value);
            }
            Err(err) => {
                log_fetch_attempt(label, attempt + 1, latency_ms, &err.to_string());
                if attempt >= retries || !err.is_retryable() {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                log_retry(label, attempt + 1, delay.as_millis() as u64, &err.to_string());
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records requested delays and never sleeps.
    #[derive(Default)]
    struct RecordingBackoff {
        seen: Mutex<Vec<u32>>,
    }

    impl BackoffPolicy for RecordingBackoff {
        fn delay_for_attempt(&self, attempt: u32) -> Duration {
            self.seen.lock().unwrap().push(attempt);
            Duration::ZERO
        }
    }

    #[test]
    fn test_delay_schedule_matches_two_retries() {
        let policy = ExponentialBackoff::default();
        // retries=2 -> 1000ms, retries=1 -> 2000ms
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(8000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = ExponentialBackoff {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_factor: 0.5,
        };
        for _ in 0..50 {
            let d = policy.delay_for_attempt(0).as_millis();
            assert!((50..=150).contains(&d));
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let policy = RecordingBackoff::default();
        let result = retry_classified(&policy, "t", 2, |_| async { Ok::<_, FetchError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert!(policy.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let policy = RecordingBackoff::default();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = retry_classified(&policy, "t", 2, move |_| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::ServerError(503))
                } else {
                    Ok(1)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*policy.seen.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_classified_error() {
        let policy = RecordingBackoff::default();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = retry_classified(&policy, "t", 2, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::RateLimited) }
        })
        .await;
        assert_eq!(result.unwrap_err(), FetchError::RateLimited);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_key_is_not_retried() {
        let policy = RecordingBackoff::default();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = retry_classified(&policy, "t", 2, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::InvalidKey) }
        })
        .await;
        assert_eq!(result.unwrap_err(), FetchError::InvalidKey);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let policy = RecordingBackoff::default();
        let result = retry_classified(&policy, "t", 1, |attempt| async move {
            if attempt == 0 {
                Err(FetchError::Timeout)
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }
}
