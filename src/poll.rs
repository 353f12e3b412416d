//! Bounded-retry poller driving a [`Probe`] to resolution.
//!
//! Replaces the hand-rolled wait loops that otherwise accumulate in every
//! end-to-end suite with a single driver parameterized by a [`PollSpec`].

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep_until};
use tracing::trace;

use crate::probe::{Outcome, Probe, from_fn};

/// How a single wait is paced and bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    /// Delay between consecutive probe evaluations. Must be non-zero.
    pub interval: Duration,
    /// Total wall-clock budget for the wait.
    pub timeout: Duration,
    /// Evaluate once before the first interval wait.
    pub immediate: bool,
}

impl PollSpec {
    /// Spec whose first evaluation happens after one interval.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            immediate: false,
        }
    }

    /// Spec whose first evaluation happens right away.
    pub fn immediate(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            immediate: true,
        }
    }
}

/// Terminal failure of a poll.
#[derive(Debug, Error)]
pub enum PollError {
    /// The probe reported a hard error; no retries were attempted after it.
    #[error("probe failed: {0}")]
    Failed(String),

    /// The budget elapsed while the probe was still pending.
    #[error("timed out after {budget:?}; last state: {last_pending}")]
    Timeout {
        /// The configured timeout that was exhausted.
        budget: Duration,
        /// Context from the most recent `Pending` outcome.
        last_pending: String,
    },
}

/// Drive `probe` until it is satisfied, fails hard, or the budget elapses.
///
/// The probe is evaluated at least once even when `spec.timeout` is shorter
/// than `spec.interval`. A `Satisfied` outcome returns immediately rather
/// than waiting out the budget, and a `Failed` outcome is surfaced without
/// further retries. The deadline is checked after each evaluation and
/// before the next sleep, so a poll never overshoots its budget by a full
/// interval. Retries are paced from the previous attempt's scheduled start
/// (remaining-interval sleep), not from when the evaluation finished.
pub async fn poll<P>(spec: &PollSpec, probe: &P) -> Result<(), PollError>
where
    P: Probe + ?Sized,
{
    debug_assert!(!spec.interval.is_zero(), "poll interval must be non-zero");

    let started = Instant::now();
    let deadline = started + spec.timeout;
    let mut next_attempt = if spec.immediate {
        started
    } else {
        started + spec.interval
    };
    let mut last_pending = String::from("probe was never evaluated");

    loop {
        sleep_until(next_attempt).await;

        match probe.evaluate().await {
            Outcome::Satisfied => return Ok(()),
            Outcome::Failed(reason) => return Err(PollError::Failed(reason)),
            Outcome::Pending(context) => {
                trace!(context = %context, "probe pending");
                last_pending = context;
            }
        }

        if Instant::now() >= deadline {
            return Err(PollError::Timeout {
                budget: spec.timeout,
                last_pending,
            });
        }
        next_attempt += spec.interval;
    }
}

/// Convenience wrapper: poll an async closure without naming a probe type.
pub async fn poll_fn<F, Fut>(spec: &PollSpec, f: F) -> Result<(), PollError>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send,
{
    poll(spec, &from_fn(f)).await
}
