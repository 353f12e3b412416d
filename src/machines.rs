//! Control-plane machine lifecycle.
//!
//! Scaling scenarios add and remove control-plane machines through the
//! machine API. The harness works with machines as dynamic objects: it
//! clones an existing running master rather than synthesizing provider
//! config it cannot know.

use kube::Client;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, ObjectMeta, PostParams};
use kube::core::{ApiResource, GroupVersionKind};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::probe::{Outcome, Probe};

const MACHINE_GROUP: &str = "machine.openshift.io";
const MACHINE_VERSION: &str = "v1beta1";
const MACHINE_KIND: &str = "Machine";

/// Label selector for control-plane machines.
const MASTER_SELECTOR: &str = "machine.openshift.io/cluster-api-machine-role=master";

/// Errors from machine lifecycle operations.
#[derive(Debug, Error)]
pub enum MachineError {
    /// The machine API rejected or failed a call.
    #[error("machine api: {0}")]
    Kube(#[from] kube::Error),

    /// No running master machine exists to clone.
    #[error("no running master machine found to clone")]
    NoRunningMaster,

    /// A machine object is missing a field the operation requires.
    #[error("machine {name} has no {field}")]
    MissingField {
        /// The machine name.
        name: String,
        /// The missing field.
        field: &'static str,
    },
}

/// The machine API resource this client drives.
pub fn machine_api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        MACHINE_GROUP,
        MACHINE_VERSION,
        MACHINE_KIND,
    ))
}

/// Client for control-plane machines in one namespace.
#[derive(Clone)]
pub struct MachineClient {
    api: Api<DynamicObject>,
}

impl MachineClient {
    /// Client over the machine namespace.
    pub fn new(client: Client, namespace: &str) -> Self {
        let resource = machine_api_resource();
        Self {
            api: Api::namespaced_with(client, namespace, &resource),
        }
    }

    /// All master machines.
    pub async fn masters(&self) -> Result<Vec<DynamicObject>, MachineError> {
        let params = ListParams::default().labels(MASTER_SELECTOR);
        Ok(self.api.list(&params).await?.items)
    }

    /// Master machines currently in the Running phase.
    pub async fn running_master_count(&self) -> Result<usize, MachineError> {
        Ok(self
            .masters()
            .await?
            .iter()
            .filter(|machine| phase_of(machine) == Some("Running"))
            .count())
    }

    /// Clone the newest running master into a fresh machine and return the
    /// new machine's name.
    ///
    /// Provider-assigned fields (`spec.providerID`, the whole `status`) are
    /// stripped so the machine controller provisions a new instance.
    pub async fn clone_master(&self) -> Result<String, MachineError> {
        let masters = self.masters().await?;
        let base = masters
            .iter()
            .filter(|machine| phase_of(machine) == Some("Running"))
            .max_by_key(|machine| machine.metadata.creation_timestamp.clone())
            .ok_or(MachineError::NoRunningMaster)?;

        let base_name = base.metadata.name.clone().ok_or(MachineError::MissingField {
            name: String::from("<unnamed>"),
            field: "metadata.name",
        })?;
        let mut suffix = Uuid::new_v4().to_string();
        suffix.truncate(5);
        let name = format!("{base_name}-{suffix}");

        let mut machine = base.clone();
        machine.metadata = ObjectMeta {
            name: Some(name.clone()),
            namespace: base.metadata.namespace.clone(),
            labels: base.metadata.labels.clone(),
            ..Default::default()
        };
        if let Some(spec) = machine.data.get_mut("spec").and_then(Value::as_object_mut) {
            spec.remove("providerID");
        }
        if let Some(data) = machine.data.as_object_mut() {
            data.remove("status");
        }

        self.api.create(&PostParams::default(), &machine).await?;
        info!(machine = %name, cloned_from = %base_name, "created master machine");
        Ok(name)
    }

    /// Delete a machine by name; already-gone is not an error.
    pub async fn delete(&self, name: &str) -> Result<(), MachineError> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(machine = %name, "deleted master machine");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(machine = %name, "machine already deleted");
                Ok(())
            }
            Err(e) => Err(MachineError::Kube(e)),
        }
    }

    /// The machine's internal IP address, once the provider reports one.
    pub async fn internal_ip(&self, name: &str) -> Result<String, MachineError> {
        let machine = self.api.get(name).await?;
        internal_ip_of(&machine).ok_or(MachineError::MissingField {
            name: name.to_string(),
            field: "status.addresses internal IP",
        })
    }

    /// Probe satisfied while the machine reports the Running phase; a
    /// machine reporting Failed is a hard error.
    pub fn running_probe(&self, name: impl Into<String>) -> MachinePhaseProbe {
        MachinePhaseProbe {
            api: self.api.clone(),
            name: name.into(),
        }
    }

    /// Probe satisfied once the machine no longer exists.
    pub fn gone_probe(&self, name: impl Into<String>) -> MachineGoneProbe {
        MachineGoneProbe {
            api: self.api.clone(),
            name: name.into(),
        }
    }

    /// Probe satisfied when exactly `expected` masters are Running.
    pub fn master_count_probe(&self, expected: usize) -> MasterCountProbe {
        MasterCountProbe {
            client: self.clone(),
            expected,
        }
    }
}

fn phase_of(machine: &DynamicObject) -> Option<&str> {
    machine
        .data
        .get("status")
        .and_then(|status| status.get("phase"))
        .and_then(Value::as_str)
}

fn internal_ip_of(machine: &DynamicObject) -> Option<String> {
    machine
        .data
        .get("status")
        .and_then(|status| status.get("addresses"))
        .and_then(Value::as_array)?
        .iter()
        .find(|address| {
            address.get("type").and_then(Value::as_str) == Some("InternalIP")
        })
        .and_then(|address| address.get("address"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Probe over a machine's phase.
pub struct MachinePhaseProbe {
    api: Api<DynamicObject>,
    name: String,
}

#[async_trait::async_trait]
impl Probe for MachinePhaseProbe {
    async fn evaluate(&self) -> Outcome {
        match self.api.get(&self.name).await {
            Ok(machine) => match phase_of(&machine) {
                Some("Running") => Outcome::Satisfied,
                Some("Failed") => {
                    Outcome::failed(format!("machine {} entered Failed phase", self.name))
                }
                Some(phase) => {
                    Outcome::pending(format!("machine {} in phase {phase}", self.name))
                }
                None => Outcome::pending(format!("machine {} has no phase yet", self.name)),
            },
            Err(kube::Error::Api(e)) if e.code == 404 => {
                Outcome::pending(format!("machine {} not visible yet", self.name))
            }
            Err(e) => Outcome::pending(format!("machine api unavailable: {e}")),
        }
    }
}

/// Probe over a machine's disappearance.
pub struct MachineGoneProbe {
    api: Api<DynamicObject>,
    name: String,
}

#[async_trait::async_trait]
impl Probe for MachineGoneProbe {
    async fn evaluate(&self) -> Outcome {
        match self.api.get(&self.name).await {
            Ok(machine) => {
                let phase = phase_of(&machine).unwrap_or("unknown");
                Outcome::pending(format!("machine {} still present ({phase})", self.name))
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Outcome::Satisfied,
            Err(e) => Outcome::pending(format!("machine api unavailable: {e}")),
        }
    }
}

/// Probe over the number of Running masters.
pub struct MasterCountProbe {
    client: MachineClient,
    expected: usize,
}

#[async_trait::async_trait]
impl Probe for MasterCountProbe {
    async fn evaluate(&self) -> Outcome {
        match self.client.running_master_count().await {
            Ok(count) if count == self.expected => Outcome::Satisfied,
            Ok(count) => Outcome::pending(format!(
                "{count} running masters, waiting for {}",
                self.expected
            )),
            Err(e) => Outcome::pending(format!("machine api unavailable: {e}")),
        }
    }
}
