//! Probe abstraction: a single idempotent state check against an external
//! system.
//!
//! A probe answers one question ("does the route exist", "does the stats
//! endpoint serve three backends", "are there four voting members") with a
//! tri-state [`Outcome`]. The [`crate::poll`] module drives a probe to
//! resolution; probes themselves never loop or sleep.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Result of a single probe evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The condition does not hold yet. The poller retries after its
    /// interval; the context string is surfaced if the wait times out.
    Pending(String),
    /// The condition holds. Polling stops successfully.
    Satisfied,
    /// Hard error. Polling stops immediately, no further retries.
    Failed(String),
}

impl Outcome {
    /// Shorthand for a [`Outcome::Pending`] with context.
    pub fn pending(context: impl Into<String>) -> Self {
        Outcome::Pending(context.into())
    }

    /// Shorthand for a [`Outcome::Failed`] with a reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Outcome::Failed(reason.into())
    }

    /// True for [`Outcome::Satisfied`].
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Outcome::Satisfied)
    }
}

/// A single idempotent check against an external system.
///
/// Implementations must reflect the *current* state on every call:
/// evaluating a probe N times must not change the observed system beyond
/// what the underlying read itself causes, and a probe that reported
/// [`Outcome::Satisfied`] once must report [`Outcome::Pending`] again if
/// the condition stops holding. Expected intermittent absence (a resource
/// that has not been created yet) is `Pending`, never `Failed`; `Failed`
/// is reserved for conditions that retrying cannot resolve.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Evaluate the check once.
    async fn evaluate(&self) -> Outcome;
}

/// Adapter turning an async closure into a [`Probe`] without a named type.
pub struct FnProbe<F, Fut> {
    f: F,
    _marker: std::marker::PhantomData<fn() -> Fut>,
}

/// Build a probe from an async closure.
///
/// ```ignore
/// let probe = probe::from_fn(|| async { Outcome::Satisfied });
/// ```
pub fn from_fn<F, Fut>(f: F) -> FnProbe<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send,
{
    FnProbe {
        f,
        _marker: std::marker::PhantomData,
    }
}

#[async_trait]
impl<F, Fut> Probe for FnProbe<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send,
{
    async fn evaluate(&self) -> Outcome {
        (self.f)().await
    }
}

#[async_trait]
impl<P: Probe + ?Sized> Probe for Arc<P> {
    async fn evaluate(&self) -> Outcome {
        (**self).evaluate().await
    }
}
