//! Transport-level retry policy.
//!
//! Governs transient failures (connection errors, timeouts and the listed
//! status codes) before any error reaches the caller.

use std::time::{Duration, SystemTime};

use reqwest::{Method, StatusCode};

/// Retry settings attached to a client at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff multiplier in seconds.
    pub backoff_factor: f64,
    /// Upper bound for a single backoff sleep.
    pub max_backoff: Duration,
    /// Status codes that trigger a retry.
    pub statuses: Vec<u16>,
    /// Methods that may be retried.
    pub methods: Vec<Method>,
}

impl Default for RetryPolicy {
    /// Three retries, exponential backoff, every method retried.
    ///
    /// POST, PATCH and DELETE are retried too; the wrapped services are
    /// expected to tolerate duplicate submission. Use
    /// [`RetryPolicy::idempotent_only`] where they don't.
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 2.0,
            max_backoff: Duration::from_secs(120),
            statuses: vec![429, 500, 502, 503, 504],
            methods: vec![
                Method::HEAD,
                Method::GET,
                Method::OPTIONS,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
            ],
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Default policy restricted to methods without side effects on replay.
    #[must_use]
    pub fn idempotent_only() -> Self {
        Self {
            methods: vec![
                Method::HEAD,
                Method::GET,
                Method::OPTIONS,
                Method::PUT,
                Method::DELETE,
            ],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    #[must_use]
    pub fn with_statuses(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.statuses = statuses.into();
        self
    }

    #[must_use]
    pub fn with_methods(mut self, methods: impl Into<Vec<Method>>) -> Self {
        self.methods = methods.into();
        self
    }

    pub fn allows_method(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status.as_u16())
    }

    /// Sleep before the given retry (1-based).
    ///
    /// The first retry goes out immediately; retry `n` afterwards waits
    /// `backoff_factor * 2^(n-1)` seconds, capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry <= 1 || self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let exp = (retry - 1).min(16) as i32;
        let secs = self.backoff_factor * 2_f64.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }
}

/// Parses a `Retry-After` header value.
///
/// Accepts delay-seconds (`"120"`) and HTTP-date
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`); a date in the past yields zero.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use reqwest::{Method, StatusCode};

    use super::{parse_retry_after, RetryPolicy};

    #[test]
    fn default_policy_retries_every_method() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert!(policy.allows_method(&Method::POST));
        assert!(policy.allows_method(&Method::PATCH));
        assert!(policy.is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(policy.is_retryable_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(!policy.is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!policy.is_retryable_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn idempotent_only_excludes_post_and_patch() {
        let policy = RetryPolicy::idempotent_only();
        assert!(!policy.allows_method(&Method::POST));
        assert!(!policy.allows_method(&Method::PATCH));
        assert!(policy.allows_method(&Method::GET));
    }

    #[test]
    fn backoff_grows_exponentially_after_first_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default().with_max_backoff(Duration::from_secs(5));
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
    }

    #[test]
    fn retry_after_seconds_and_dates() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
        let future = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(30));
        let parsed = parse_retry_after(&future).expect("future date must parse");
        assert!(parsed <= Duration::from_secs(30));
        assert!(parsed >= Duration::from_secs(28));
        assert_eq!(parse_retry_after("soon"), None);
    }
}
