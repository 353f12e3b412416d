//! converge: a convergence-polling harness for platform end-to-end tests.
//!
//! End-to-end suites against a live cluster spend most of their logic
//! waiting: a route exists but is not admitted, a machine is created but
//! not running, a member joined but is not voting yet. This crate packages
//! that waiting once, instead of once per test file:
//!
//! - [`probe`]: a single idempotent check with a tri-state outcome
//!   (pending / satisfied / failed)
//! - [`poll`]: a bounded-retry driver for probes
//! - [`scenario`]: ordered actions and waits with guaranteed LIFO cleanup
//! - [`stats`]: delimited load-balancer stats parsing and balance checks
//! - [`cli`], [`http`], [`members`], [`machines`]: probes and actions over
//!   the surfaces the platform exposes (its CLI, routed HTTP endpoints,
//!   control-plane membership, machine lifecycle)
//! - [`cluster`], [`namespace`]: shared-cluster plumbing and namespace
//!   isolation for suites that run concurrently against one cluster

pub mod cli;
pub mod cluster;
pub mod config;
pub mod http;
pub mod machines;
pub mod members;
pub mod namespace;
pub mod poll;
pub mod probe;
pub mod scenario;
pub mod stats;

pub use cli::Cli;
pub use cluster::SharedCluster;
pub use config::Timeouts;
pub use http::HttpCheck;
pub use namespace::ScopedNamespace;
pub use poll::{PollError, PollSpec, poll, poll_fn};
pub use probe::{Outcome, Probe};
pub use scenario::{Scenario, ScenarioCtx, ScenarioError};
pub use stats::{BalanceBand, parse_stats};
