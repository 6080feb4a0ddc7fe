use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use log::info;
use serde_json::json;

use super::models::{WorkloadRef, WorkloadResource};
use crate::error::ScaleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    Up,
    Down,
    NoOp,
}

impl ScaleDecision {
    pub fn between(current_desired: i32, target: i32) -> Self {
        match target.cmp(&current_desired) {
            std::cmp::Ordering::Greater => ScaleDecision::Up,
            std::cmp::Ordering::Less => ScaleDecision::Down,
            std::cmp::Ordering::Equal => ScaleDecision::NoOp,
        }
    }
}

/// Writes a StatefulSet's replica count. Performs no read first; the caller
/// decides from cached state.
#[async_trait]
pub trait ReplicaScaler: Send + Sync {
    async fn set_replicas(&self, workload: &WorkloadRef, replicas: i32) -> Result<(), ScaleError>;
}

/// Issues the patch unless `workload` is already at `target`. Never retries.
pub async fn scale_to(
    scaler: &dyn ReplicaScaler,
    workload: &WorkloadResource,
    target: i32,
) -> Result<ScaleDecision, ScaleError> {
    let decision = ScaleDecision::between(workload.desired_replicas, target);
    if decision != ScaleDecision::NoOp {
        scaler.set_replicas(&workload.workload, target).await?;
    }
    Ok(decision)
}

/// Patches the `scale` subresource through the cluster API.
#[derive(Clone)]
pub struct KubeScaler {
    client: Client,
}

impl KubeScaler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReplicaScaler for KubeScaler {
    async fn set_replicas(&self, workload: &WorkloadRef, replicas: i32) -> Result<(), ScaleError> {
        let statefulsets: Api<StatefulSet> = Api::namespaced(self.client.clone(), &workload.namespace);
        info!(target: "scaler", "Scaling {} to {} replicas", workload, replicas);

        statefulsets
            .patch_scale(
                &workload.name,
                &PatchParams::default(),
                &Patch::Merge(json!({
                    "spec": {
                        "replicas": replicas
                    }
                })),
            )
            .await
            .map_err(|e| match e {
                kube::Error::Api(resp) => ScaleError::Rejected {
                    workload: workload.to_string(),
                    code: resp.code,
                    reason: resp.reason,
                    message: resp.message,
                },
                source => ScaleError::Client {
                    workload: workload.to_string(),
                    source,
                },
            })?;
        Ok(())
    }
}
