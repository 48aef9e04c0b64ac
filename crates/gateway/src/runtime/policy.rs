//! Retry/termination policy: what a connection close means, and how long to
//! wait before the next attempt.

use std::time::Duration;

use pl_domain::config::RetryConfig;
use pl_protocol::ErrorInfo;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Close classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseClass {
    /// The server rejected the credentials.  Never retried.
    Permanent,
    /// Anything else: reopen a fresh session with the same number.
    Transient,
}

/// Classify a close by its status code alone.  A close without a reason
/// carries no decision and never reaches this point.
pub fn classify(info: &ErrorInfo) -> CloseClass {
    if info.is_unauthorized() {
        CloseClass::Permanent
    } else {
        CloseClass::Transient
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deadlines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stand-in for "no deadline" when a configured timeout overflows.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `timeout` from now.  Saturates at [`FAR_FUTURE`] instead of
/// overflowing.
pub fn deadline_after(timeout: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Back-off
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Jittered exponential back-off with a hard cap on retries.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Retries allowed after the first attempt.  `0` disables retrying.
    pub max_retries: u32,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryBackoff {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            backoff_factor: cfg.backoff_factor.max(1.0),
            max_retries: cfg.max_attempts,
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.backoff_factor.powi(retry.min(i32::MAX as u32) as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        // Up to 25% on top so simultaneous sessions spread out.
        let jitter = capped_ms * 0.25 * pseudo_random_fraction(retry);
        Duration::from_millis((capped_ms + jitter) as u64)
    }

    /// Whether `retries_done` retries already used the whole budget.
    pub fn should_give_up(&self, retries_done: u32) -> bool {
        retries_done >= self.max_retries
    }
}

/// Deterministic fraction in [0, 1) derived from the retry number.
fn pseudo_random_fraction(retry: u32) -> f64 {
    let hash = retry.wrapping_add(1).wrapping_mul(2654435761);
    (hash as f64) / (u32::MAX as f64 + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_permanent() {
        let info = ErrorInfo::new(401, "logged out");
        assert_eq!(classify(&info), CloseClass::Permanent);
    }

    #[test]
    fn other_statuses_are_transient() {
        for status in [403, 408, 428, 440, 500, 503, 515] {
            let info = ErrorInfo::new(status, "closed");
            assert_eq!(classify(&info), CloseClass::Transient, "{status}");
        }
    }

    #[tokio::test]
    async fn huge_timeouts_saturate() {
        let now = tokio::time::Instant::now();
        let deadline = deadline_after(Duration::from_secs(u64::MAX));
        assert!(deadline >= now + Duration::from_secs(86_400 * 365));
        assert!(deadline_after(Duration::from_millis(10)) <= now + Duration::from_secs(1));
    }

    #[test]
    fn delay_grows_and_is_capped() {
        let p = RetryBackoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_retries: 5,
        };
        let d0 = p.delay_for_retry(0);
        let d3 = p.delay_for_retry(3);
        assert!(d0 >= Duration::from_secs(1) && d0 <= Duration::from_millis(1_250));
        assert!(d3 >= Duration::from_secs(8));
        assert!(p.delay_for_retry(50) <= Duration::from_millis(37_500));
    }

    #[test]
    fn zero_budget_never_retries() {
        let p = RetryBackoff {
            max_retries: 0,
            ..Default::default()
        };
        assert!(p.should_give_up(0));
    }

    #[test]
    fn budget_is_counted_in_retries() {
        let p = RetryBackoff {
            max_retries: 2,
            ..Default::default()
        };
        assert!(!p.should_give_up(0));
        assert!(!p.should_give_up(1));
        assert!(p.should_give_up(2));
    }

    #[test]
    fn from_config_clamps_shrinking_factor() {
        let cfg = RetryConfig {
            backoff_factor: 0.5,
            ..Default::default()
        };
        assert_eq!(RetryBackoff::from_config(&cfg).backoff_factor, 1.0);
    }
}
