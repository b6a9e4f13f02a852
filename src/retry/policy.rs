//! Retry policy: a pure decision function from `(attempt, error)` to an
//! optional delay. Stateless and cloneable.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::SessionError;

/// Decides, for a failed attempt, whether to retry and after what delay.
///
/// Built-in variants cover the common shapes (`ExponentialBackoff`, `Fixed`,
/// `NoRetry`); `Custom` accepts a boxed closure for anything else. Non-transient
/// errors (see [`SessionError::is_transient`]) are never retried by the
/// built-in variants regardless of attempt count — only `Custom` policies can
/// override that, since they own their own classification.
#[derive(Clone)]
pub enum RetryPolicy {
    /// `delay = clamp(min + delta * 2^attempt * jitter, min, max)`, jitter
    /// uniform in `[0.8, 1.2]`.
    ExponentialBackoff {
        max_attempts: u32,
        min: Duration,
        max: Duration,
        delta: Duration,
    },
    /// A constant delay between attempts, no jitter.
    Fixed { max_attempts: u32, delay: Duration },
    /// Never retries; the first failure is surfaced immediately.
    NoRetry,
    /// Caller-supplied decision function. Receives the raw attempt index and
    /// error and returns the delay (or `None` to stop). A custom policy is
    /// responsible for its own transient/non-transient classification.
    Custom(Arc<dyn Fn(u32, &SessionError) -> Option<Duration> + Send + Sync>),
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExponentialBackoff { max_attempts, min, max, delta } => f
                .debug_struct("ExponentialBackoff")
                .field("max_attempts", max_attempts)
                .field("min", min)
                .field("max", max)
                .field("delta", delta)
                .finish(),
            Self::Fixed { max_attempts, delay } => {
                f.debug_struct("Fixed").field("max_attempts", max_attempts).field("delay", delay).finish()
            }
            Self::NoRetry => f.write_str("NoRetry"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl RetryPolicy {
    /// `should_retry(attempt, error)`: `None` stops retrying, `Some(delay)`
    /// tells the retry engine how long to sleep before the next attempt.
    /// `attempt` is zero-indexed: the first failure is reported as attempt 0.
    pub fn should_retry(&self, attempt: u32, error: &SessionError) -> Option<Duration> {
        match self {
            Self::NoRetry => None,
            Self::Fixed { max_attempts, delay } => {
                if !error.is_transient() || attempt + 1 >= *max_attempts {
                    None
                } else {
                    Some(*delay)
                }
            }
            Self::ExponentialBackoff { max_attempts, min, max, delta } => {
                if !error.is_transient() || attempt + 1 >= *max_attempts {
                    None
                } else {
                    Some(Self::exponential_delay(*min, *max, *delta, attempt))
                }
            }
            Self::Custom(f) => f(attempt, error),
        }
    }

    fn exponential_delay(min: Duration, max: Duration, delta: Duration, attempt: u32) -> Duration {
        let growth = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let scaled = delta.checked_mul(growth).unwrap_or(max);
        let raw = min.checked_add(scaled).unwrap_or(max);
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        let jittered_nanos = (raw.as_nanos() as f64 * jitter).round().max(0.0) as u128;
        let jittered = Duration::from_nanos(jittered_nanos.min(u64::MAX as u128) as u64);
        jittered.clamp(min, max)
    }

    /// Constructs a `Custom` policy from any matching closure.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32, &SessionError) -> Option<Duration> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_error() -> SessionError {
        SessionError::Network { message: "dropped".into() }
    }

    #[test]
    fn no_retry_never_retries() {
        let policy = RetryPolicy::NoRetry;
        assert_eq!(policy.should_retry(0, &network_error()), None);
    }

    #[test]
    fn fixed_retries_until_max_attempts() {
        let policy = RetryPolicy::Fixed { max_attempts: 3, delay: Duration::from_millis(10) };
        assert_eq!(policy.should_retry(0, &network_error()), Some(Duration::from_millis(10)));
        assert_eq!(policy.should_retry(1, &network_error()), Some(Duration::from_millis(10)));
        assert_eq!(policy.should_retry(2, &network_error()), None);
    }

    #[test]
    fn fixed_never_retries_non_transient() {
        let policy = RetryPolicy::Fixed { max_attempts: 5, delay: Duration::from_millis(10) };
        assert_eq!(policy.should_retry(0, &SessionError::Unauthorized { message: "no".into() }), None);
        assert_eq!(policy.should_retry(0, &SessionError::ObjectDisposed), None);
    }

    #[test]
    fn exponential_backoff_clamps_into_min_max() {
        let policy = RetryPolicy::ExponentialBackoff {
            max_attempts: 10,
            min: Duration::from_millis(50),
            max: Duration::from_secs(2),
            delta: Duration::from_millis(100),
        };
        for attempt in 0..8 {
            let delay = policy.should_retry(attempt, &network_error()).expect("still retrying");
            assert!(delay >= Duration::from_millis(50), "attempt {attempt}: {delay:?} below min");
            assert!(delay <= Duration::from_secs(2), "attempt {attempt}: {delay:?} above max");
        }
    }

    #[test]
    fn exponential_backoff_stops_at_max_attempts() {
        let policy = RetryPolicy::ExponentialBackoff {
            max_attempts: 3,
            min: Duration::from_millis(10),
            max: Duration::from_secs(1),
            delta: Duration::from_millis(10),
        };
        assert!(policy.should_retry(0, &network_error()).is_some());
        assert!(policy.should_retry(1, &network_error()).is_some());
        assert_eq!(policy.should_retry(2, &network_error()), None);
    }

    #[test]
    fn custom_policy_gets_full_control() {
        let policy = RetryPolicy::custom(|attempt, _err| {
            if attempt < 1 {
                Some(Duration::from_millis(5))
            } else {
                None
            }
        });
        assert_eq!(policy.should_retry(0, &SessionError::Fatal { message: "x".into() }), Some(Duration::from_millis(5)));
        assert_eq!(policy.should_retry(1, &network_error()), None);
    }
}
