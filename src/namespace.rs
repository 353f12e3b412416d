//! RAII namespace isolation.
//!
//! Scenarios sharing one external cluster isolate by namespace: each gets
//! a uniquely-suffixed namespace that is deleted when the handle drops,
//! even if the scenario panicked.
//!
//! Handles must be dropped on a multi-threaded runtime (use
//! `#[tokio::test(flavor = "multi_thread")]`): cleanup blocks on async
//! deletion via `block_in_place`.

use std::sync::atomic::{AtomicBool, Ordering};

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::{Client, Error};
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::probe::{Outcome, Probe};

/// Errors creating a scoped namespace.
#[derive(Debug, ThisError)]
pub enum NamespaceError {
    /// The namespace could not be created.
    #[error("failed to create namespace {name}: {source}")]
    Create {
        /// The generated namespace name.
        name: String,
        /// The underlying API error.
        #[source]
        source: kube::Error,
    },
}

/// A namespace that is deleted when dropped.
pub struct ScopedNamespace {
    client: Client,
    name: String,
    cleanup_initiated: AtomicBool,
}

impl ScopedNamespace {
    /// Create `{prefix}-{uuid8}`, labeled so leaked namespaces are
    /// attributable to the harness.
    pub async fn create(client: Client, prefix: &str) -> Result<Self, NamespaceError> {
        let mut suffix = Uuid::new_v4().to_string();
        suffix.truncate(8);
        let name = format!("{prefix}-{suffix}");

        let namespaces: Api<Namespace> = Api::all(client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                labels: Some(
                    [(
                        "app.kubernetes.io/managed-by".to_string(),
                        "converge".to_string(),
                    )]
                    .into_iter()
                    .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };

        namespaces
            .create(&PostParams::default(), &namespace)
            .await
            .map_err(|source| NamespaceError::Create {
                name: name.clone(),
                source,
            })?;

        info!(namespace = %name, "created scoped namespace");

        Ok(Self {
            client,
            name,
            cleanup_initiated: AtomicBool::new(false),
        })
    }

    /// The namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// An API client for namespaced resources inside this namespace.
    pub fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.name)
    }

    /// Probe satisfied once the namespace is fully gone.
    pub fn deleted_probe(client: Client, name: impl Into<String>) -> NamespaceDeletedProbe {
        NamespaceDeletedProbe {
            api: Api::all(client),
            name: name.into(),
        }
    }
}

impl Drop for ScopedNamespace {
    fn drop(&mut self) {
        if self.cleanup_initiated.swap(true, Ordering::SeqCst) {
            return;
        }

        let name = self.name.clone();
        let client = self.client.clone();
        debug!(namespace = %name, "dropping scoped namespace");

        tokio::task::block_in_place(|| {
            let handle = tokio::runtime::Handle::current();
            handle.block_on(async {
                let namespaces: Api<Namespace> = Api::all(client);
                let params = DeleteParams {
                    propagation_policy: Some(kube::api::PropagationPolicy::Background),
                    ..Default::default()
                };
                match namespaces.delete(&name, &params).await {
                    Ok(_) => debug!(namespace = %name, "namespace deletion initiated"),
                    Err(Error::Api(e)) if e.code == 404 => {
                        debug!(namespace = %name, "namespace already deleted");
                    }
                    Err(e) => {
                        warn!(namespace = %name, error = %e, "failed to delete namespace");
                    }
                }
            });
        });
    }
}

/// Probe over namespace termination.
pub struct NamespaceDeletedProbe {
    api: Api<Namespace>,
    name: String,
}

#[async_trait::async_trait]
impl Probe for NamespaceDeletedProbe {
    async fn evaluate(&self) -> Outcome {
        match self.api.get(&self.name).await {
            Ok(_) => Outcome::pending(format!("namespace {} still terminating", self.name)),
            Err(Error::Api(e)) if e.code == 404 => Outcome::Satisfied,
            Err(e) => Outcome::failed(format!("checking namespace {}: {e}", self.name)),
        }
    }
}
