//! Control-plane membership introspection.
//!
//! The control plane publishes its voting members in an endpoints
//! ConfigMap (one entry per voting member, learners excluded). The
//! harness counts and health-checks members through that surface plus
//! plain endpoint reachability; it deliberately carries no consensus
//! client of its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube::Client;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

use crate::probe::{Outcome, Probe};

/// Port a member's client endpoint serves on.
const MEMBER_CLIENT_PORT: u16 = 2379;

/// Budget for one reachability check.
const HEALTH_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors from membership introspection.
#[derive(Debug, Error)]
pub enum MemberError {
    /// The endpoints ConfigMap could not be read.
    #[error("kubernetes api: {0}")]
    Kube(#[from] kube::Error),

    /// The endpoints ConfigMap exists but carries no member data.
    #[error("member endpoints configmap {namespace}/{name} has no data")]
    NoData {
        /// ConfigMap namespace.
        namespace: String,
        /// ConfigMap name.
        name: String,
    },
}

/// One voting member of the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Opaque member identifier (the ConfigMap data key).
    pub id: String,
    /// Host serving the member's client endpoint.
    pub endpoint: String,
}

/// Source of membership information. Mockable for cluster-free tests.
#[async_trait]
pub trait MemberInspector: Send + Sync {
    /// The current voting members.
    async fn voting_members(&self) -> Result<Vec<Member>, MemberError>;

    /// Whether the member's client endpoint is reachable.
    async fn is_healthy(&self, member: &Member) -> Result<bool, MemberError>;
}

/// Inspector backed by the control plane's member-endpoints ConfigMap.
pub struct EndpointsInspector {
    configmaps: Api<ConfigMap>,
    namespace: String,
    name: String,
}

impl EndpointsInspector {
    /// Read members from `namespace/name`.
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            configmaps: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl MemberInspector for EndpointsInspector {
    async fn voting_members(&self) -> Result<Vec<Member>, MemberError> {
        let configmap = self.configmaps.get(&self.name).await?;
        let data = configmap.data.ok_or_else(|| MemberError::NoData {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        })?;
        Ok(data
            .into_iter()
            .map(|(id, endpoint)| Member { id, endpoint })
            .collect())
    }

    async fn is_healthy(&self, member: &Member) -> Result<bool, MemberError> {
        let address = format!("{}:{}", member.endpoint, MEMBER_CLIENT_PORT);
        let reachable = tokio::time::timeout(HEALTH_CONNECT_TIMEOUT, TcpStream::connect(&address))
            .await
            .is_ok_and(|connected| connected.is_ok());
        debug!(member = %member.id, address = %address, reachable, "member health check");
        Ok(reachable)
    }
}

/// Probe satisfied when the voting-member count equals `expected` exactly.
///
/// Introspection errors are treated as pending: the API server is expected
/// to be briefly unreachable while the control plane rolls out.
pub struct MemberCountProbe {
    inspector: Arc<dyn MemberInspector>,
    expected: usize,
}

impl MemberCountProbe {
    /// Build the probe.
    pub fn new(inspector: Arc<dyn MemberInspector>, expected: usize) -> Self {
        Self {
            inspector,
            expected,
        }
    }
}

#[async_trait]
impl Probe for MemberCountProbe {
    async fn evaluate(&self) -> Outcome {
        match self.inspector.voting_members().await {
            Ok(members) if members.len() == self.expected => Outcome::Satisfied,
            Ok(members) => Outcome::pending(format!(
                "{} voting members, waiting for {}",
                members.len(),
                self.expected
            )),
            Err(error) => Outcome::pending(format!("membership unavailable: {error}")),
        }
    }
}

/// Probe satisfied when a voting member serves the given endpoint and its
/// endpoint answers.
pub struct HealthyMemberProbe {
    inspector: Arc<dyn MemberInspector>,
    endpoint: String,
}

impl HealthyMemberProbe {
    /// Build the probe for the member serving `endpoint`.
    pub fn new(inspector: Arc<dyn MemberInspector>, endpoint: impl Into<String>) -> Self {
        Self {
            inspector,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Probe for HealthyMemberProbe {
    async fn evaluate(&self) -> Outcome {
        let members = match self.inspector.voting_members().await {
            Ok(members) => members,
            Err(error) => return Outcome::pending(format!("membership unavailable: {error}")),
        };
        let Some(member) = members.iter().find(|m| m.endpoint == self.endpoint) else {
            return Outcome::pending(format!("no voting member at {}", self.endpoint));
        };
        match self.inspector.is_healthy(member).await {
            Ok(true) => Outcome::Satisfied,
            Ok(false) => Outcome::pending(format!("member {} not healthy yet", member.id)),
            Err(error) => Outcome::pending(format!("health check failed: {error}")),
        }
    }
}

/// Probe satisfied when no voting member serves the given endpoint.
pub struct MemberRemovedProbe {
    inspector: Arc<dyn MemberInspector>,
    endpoint: String,
}

impl MemberRemovedProbe {
    /// Build the probe for the member serving `endpoint`.
    pub fn new(inspector: Arc<dyn MemberInspector>, endpoint: impl Into<String>) -> Self {
        Self {
            inspector,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Probe for MemberRemovedProbe {
    async fn evaluate(&self) -> Outcome {
        match self.inspector.voting_members().await {
            Ok(members) if members.iter().any(|m| m.endpoint == self.endpoint) => {
                Outcome::pending(format!("member at {} still present", self.endpoint))
            }
            Ok(_) => Outcome::Satisfied,
            Err(error) => Outcome::pending(format!("membership unavailable: {error}")),
        }
    }
}
