//! Shared cluster connection.
//!
//! Connectivity is validated once per process; each caller then gets its
//! own `kube::Client` so suites stay isolated while sharing the one
//! external cluster.

use std::sync::Arc;

use kube::{Client, Config};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

static SHARED_CLUSTER: OnceCell<Arc<SharedCluster>> = OnceCell::const_new();

/// Errors establishing cluster connectivity.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// No usable kubeconfig/in-cluster configuration was found.
    #[error("failed to infer cluster configuration: {0}")]
    Config(#[from] kube::config::InferConfigError),

    /// The API server could not be reached or rejected the client.
    #[error("kubernetes api: {0}")]
    Kube(#[from] kube::Error),
}

/// Handle to the external cluster every scenario runs against.
///
/// The first [`SharedCluster::get`] validates connectivity; later calls
/// return the cached instance. The harness treats the cluster as shared
/// and append-only: it creates uniquely-named resources and never assumes
/// resources owned by other tenants are absent.
pub struct SharedCluster {
    _validated: (),
}

impl SharedCluster {
    /// Get or create the shared cluster handle.
    ///
    /// Safe to call from many tests concurrently; connectivity is checked
    /// exactly once.
    pub async fn get() -> Result<Arc<SharedCluster>, ClusterError> {
        SHARED_CLUSTER
            .get_or_try_init(|| async {
                let cluster = Self::connect().await?;
                Ok(Arc::new(cluster))
            })
            .await
            .cloned()
    }

    /// Create a fresh client for one scenario.
    pub async fn new_client(&self) -> Result<Client, ClusterError> {
        let config = Config::infer().await?;
        Ok(Client::try_from(config)?)
    }

    async fn connect() -> Result<Self, ClusterError> {
        let config = Config::infer().await?;
        let client = Client::try_from(config)?;

        let version = client.apiserver_version().await?;
        info!(
            platform = %version.platform,
            version = %version.git_version,
            "connected to cluster"
        );

        Ok(Self { _validated: () })
    }
}
