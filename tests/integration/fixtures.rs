//! Common initialization for the integration suites.

use std::sync::Arc;

use converge::cluster::SharedCluster;

// ============================================================
// Platform Locations
// ============================================================

/// Namespace holding the control plane's member-endpoints ConfigMap.
pub const ETCD_NAMESPACE: &str = "openshift-etcd";

/// Name of the member-endpoints ConfigMap.
pub const ETCD_ENDPOINTS_CONFIGMAP: &str = "etcd-endpoints";

/// Namespace holding control-plane machines.
pub const MACHINE_NAMESPACE: &str = "openshift-machine-api";

/// Router stats credentials used by the router fixtures.
pub const STATS_USER: &str = "admin";
pub const STATS_PASSWORD: &str = "password";

/// Port the router serves stats and health on.
pub const STATS_PORT: u16 = 1936;

// ============================================================
// Test Initialization
// ============================================================

/// Initialize tracing and validate cluster connectivity.
pub async fn init_test() -> Arc<SharedCluster> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,kube=warn,converge=debug")
        .with_test_writer()
        .try_init();

    SharedCluster::get()
        .await
        .expect("failed to connect to the cluster; is your kubeconfig configured?")
}
