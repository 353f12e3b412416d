//! Multi-step scenarios with guaranteed cleanup.
//!
//! A scenario is an ordered sequence of one-shot actions and readiness
//! waits against a shared external cluster. Cleanup registered during any
//! step runs in reverse order of registration, exactly once, on every exit
//! path: step failure, wait timeout, panic, and normal completion. Tests
//! that mutate a shared cluster must never leak what they created, since
//! unrelated suites run against the same cluster afterwards.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::poll::{PollError, PollSpec, poll};
use crate::probe::Probe;

/// Why a step failed.
#[derive(Debug, Error)]
pub enum StepError {
    /// A one-shot action reported an error.
    #[error("{0}")]
    Action(String),

    /// A readiness wait failed or timed out.
    #[error(transparent)]
    Wait(#[from] PollError),
}

/// Failure of a scenario run, identifying the step that produced it.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The named step failed; cleanup already ran when this surfaces.
    #[error("step `{step}`: {source}")]
    Step {
        /// Name of the failing step.
        step: String,
        /// The underlying step failure.
        #[source]
        source: StepError,
    },
}

type ActionFuture = BoxFuture<'static, Result<(), String>>;
type ActionFn = Box<dyn FnOnce(ScenarioCtx) -> ActionFuture + Send>;
type CleanupFuture = BoxFuture<'static, Result<(), String>>;

struct Cleanup {
    label: String,
    run: CleanupFuture,
}

/// Handle passed to actions for registering deferred cleanup.
#[derive(Clone)]
pub struct ScenarioCtx {
    cleanups: Arc<Mutex<Vec<Cleanup>>>,
}

impl ScenarioCtx {
    /// Register a cleanup to run when the scenario exits.
    ///
    /// Cleanups run in reverse order of registration. A cleanup's error is
    /// logged but never masks the step failure that triggered the unwind.
    pub async fn defer<F>(&self, label: impl Into<String>, fut: F)
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.cleanups.lock().await.push(Cleanup {
            label: label.into(),
            run: fut.boxed(),
        });
    }
}

enum StepKind {
    Action(ActionFn),
    Wait {
        spec: PollSpec,
        probe: Box<dyn Probe>,
    },
}

struct Step {
    name: String,
    kind: StepKind,
}

/// An ordered sequence of actions and waits with guaranteed cleanup.
///
/// ```ignore
/// Scenario::new("weighted-route")
///     .action("create route", |ctx| async move { ... })
///     .wait("route admitted", timeouts.change_spec(), exists_probe)
///     .run()
///     .await?;
/// ```
pub struct Scenario {
    name: String,
    steps: Vec<Step>,
}

impl Scenario {
    /// Start an empty scenario.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a one-shot action. The action receives a [`ScenarioCtx`] for
    /// registering cleanup of whatever it creates.
    pub fn action<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(ScenarioCtx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.steps.push(Step {
            name: name.into(),
            kind: StepKind::Action(Box::new(move |ctx| f(ctx).boxed())),
        });
        self
    }

    /// Append a readiness wait: `probe` driven under `spec`.
    pub fn wait(
        mut self,
        name: impl Into<String>,
        spec: PollSpec,
        probe: impl Probe + 'static,
    ) -> Self {
        self.steps.push(Step {
            name: name.into(),
            kind: StepKind::Wait {
                spec,
                probe: Box::new(probe),
            },
        });
        self
    }

    /// Execute the steps in order.
    ///
    /// The first step failure aborts the remaining steps. All registered
    /// cleanups run before the failure is returned; a panic inside a step
    /// is resumed after cleanup. Failures are not aggregated: the caller
    /// sees the first hard failure or the first timeout.
    pub async fn run(self) -> Result<(), ScenarioError> {
        let ctx = ScenarioCtx {
            cleanups: Arc::new(Mutex::new(Vec::new())),
        };

        let mut failure: Option<ScenarioError> = None;
        let mut panic_payload: Option<Box<dyn std::any::Any + Send>> = None;

        for step in self.steps {
            info!(scenario = %self.name, step = %step.name, "running step");

            let outcome = match step.kind {
                StepKind::Action(f) => {
                    match AssertUnwindSafe(f(ctx.clone())).catch_unwind().await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(message)) => Err(StepError::Action(message)),
                        Err(payload) => {
                            panic_payload = Some(payload);
                            break;
                        }
                    }
                }
                StepKind::Wait { spec, probe } => {
                    match AssertUnwindSafe(poll(&spec, probe.as_ref()))
                        .catch_unwind()
                        .await
                    {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(poll_error)) => Err(StepError::Wait(poll_error)),
                        Err(payload) => {
                            panic_payload = Some(payload);
                            break;
                        }
                    }
                }
            };

            if let Err(source) = outcome {
                failure = Some(ScenarioError::Step {
                    step: step.name,
                    source,
                });
                break;
            }
        }

        Self::run_cleanups(&self.name, &ctx).await;

        if let Some(payload) = panic_payload {
            std::panic::resume_unwind(payload);
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Drain the cleanup stack, newest first. Cleanups registered while a
    /// cleanup runs are drained too.
    async fn run_cleanups(name: &str, ctx: &ScenarioCtx) {
        loop {
            let next = ctx.cleanups.lock().await.pop();
            let Some(cleanup) = next else {
                break;
            };
            info!(scenario = %name, cleanup = %cleanup.label, "running cleanup");
            match AssertUnwindSafe(cleanup.run).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(
                    scenario = %name,
                    cleanup = %cleanup.label,
                    error = %error,
                    "cleanup failed"
                ),
                Err(_) => warn!(
                    scenario = %name,
                    cleanup = %cleanup.label,
                    "cleanup panicked"
                ),
            }
        }
    }
}
