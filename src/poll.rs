//! Fixed-interval status polling with a timeout.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use crate::Result;

/// Result of one status check.
#[derive(Clone, Debug, PartialEq)]
pub enum PollStatus<T> {
    Pending,
    Done(T),
}

/// How a polling loop ended.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome<T> {
    Done(T),
    TimedOut,
}

impl<T> PollOutcome<T> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, PollOutcome::TimedOut)
    }
}

/// Sleep schedule for hand-written polling loops.
///
/// Useful when the check needs `&mut ApiClient`:
///
/// ```no_run
/// # async fn run(client: &mut sas_client::ApiClient) -> sas_client::Result<()> {
/// use std::time::Duration;
/// use sas_client::poll::PollSchedule;
///
/// let mut schedule = PollSchedule::new(Duration::from_secs(5), Duration::from_secs(600));
/// loop {
///     let job = client.get("api/v2/jobs/42/").await?;
///     if job.as_json().and_then(|j| j["finished"].as_str()).is_some() {
///         break;
///     }
///     if !schedule.wait().await {
///         break; // timed out
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PollSchedule {
    interval: Duration,
    timeout: Duration,
    started: Instant,
}

impl PollSchedule {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Sleeps one interval; returns `false` once the timeout has passed.
    pub async fn wait(&mut self) -> bool {
        sleep(self.interval).await;
        self.started.elapsed() <= self.timeout
    }
}

/// Calls `check` every `interval` until it reports [`PollStatus::Done`] or
/// `timeout` passes. Errors from `check` propagate immediately.
pub async fn poll_until<T, C, Fut>(interval: Duration, timeout: Duration, mut check: C) -> Result<PollOutcome<T>>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
{
    let mut schedule = PollSchedule::new(interval, timeout);
    loop {
        if let PollStatus::Done(value) = check().await? {
            return Ok(PollOutcome::Done(value));
        }
        if !schedule.wait().await {
            #[cfg(feature = "tracing")]
            tracing::error!("polling timed out after {:?}", schedule.elapsed());

            return Ok(PollOutcome::TimedOut);
        }
    }
}

/// Like [`poll_until`], but runs `cancel` once the timeout passes.
///
/// A failed cancellation is logged and the outcome is still
/// [`PollOutcome::TimedOut`].
pub async fn poll_until_or_cancel<T, C, Fut, Cancel>(
    interval: Duration,
    timeout: Duration,
    check: C,
    cancel: Cancel,
) -> Result<PollOutcome<T>>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
    Cancel: Future<Output = Result<()>>,
{
    let outcome = poll_until(interval, timeout, check).await?;
    if outcome.is_timed_out() {
        best_effort("cancellation after timeout", cancel).await;
    }
    Ok(outcome)
}

/// Runs a cleanup call whose failure must not mask the caller's outcome.
///
/// Returns whether the cleanup succeeded; failures are only logged.
pub async fn best_effort<Fut>(what: &str, cleanup: Fut) -> bool
where
    Fut: Future<Output = Result<()>>,
{
    match cleanup.await {
        Ok(()) => {
            #[cfg(feature = "tracing")]
            tracing::info!("{what} succeeded");
            true
        }
        Err(err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(code = %err.code(), "{what} failed: {err}");
            #[cfg(not(feature = "tracing"))]
            let _ = (what, err);
            false
        }
    }
}
