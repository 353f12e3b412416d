//! Harness configuration.
//!
//! Wait budgets are explicit values owned by the caller, not package-level
//! globals: every scenario builds its own [`PollSpec`]s from a `Timeouts`
//! it can tune in isolation.

use std::time::Duration;

use crate::poll::PollSpec;

/// Wait budgets for the classes of operation the platform suites exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Routing/config changes propagating through the platform.
    pub change: Duration,
    /// Image builds completing.
    pub build: Duration,
    /// Deployment rollouts completing.
    pub deploy: Duration,
    /// Control-plane membership converging after a machine change.
    pub membership: Duration,
    /// Pacing between CLI existence checks.
    pub cli_interval: Duration,
    /// Pacing between stats scrapes.
    pub stats_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            change: Duration::from_secs(3 * 60),
            build: Duration::from_secs(10 * 60),
            deploy: Duration::from_secs(2 * 60),
            membership: Duration::from_secs(20 * 60),
            cli_interval: Duration::from_secs(1),
            stats_interval: Duration::from_millis(100),
        }
    }
}

impl Timeouts {
    /// Spec for waits on propagating changes: paced at one second, first
    /// check after the first interval.
    pub fn change_spec(&self) -> PollSpec {
        PollSpec::new(Duration::from_secs(1), self.change)
    }

    /// Spec for CLI existence waits with an explicit budget (build waits
    /// and rollout waits use different budgets over the same pacing).
    pub fn cli_spec(&self, budget: Duration) -> PollSpec {
        PollSpec::new(self.cli_interval, budget)
    }

    /// Spec for stats scrapes: tight pacing, first scrape immediately.
    pub fn stats_spec(&self) -> PollSpec {
        PollSpec::immediate(self.stats_interval, self.change)
    }

    /// Spec for membership convergence waits.
    pub fn membership_spec(&self) -> PollSpec {
        PollSpec::new(Duration::from_secs(5), self.membership)
    }
}
