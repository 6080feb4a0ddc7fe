use infrared_scaler_common::RoutingConfig;
use k8s_openapi::chrono::{DateTime, Utc};
use log::warn;
use std::collections::HashMap;

use super::models::{EndpointResource, ServerId, ServiceKey, WorkloadResource};

/// A Service whose routing document the proxy has accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub endpoint: EndpointResource,
    pub config: RoutingConfig,
}

/// Last observed cluster state.
///
/// Routes are keyed by the server id the proxy uses. Workloads are indexed by
/// the Service they back, so at most one StatefulSet is associated with a
/// Service at any time.
#[derive(Debug, Default)]
pub struct ResourceCache {
    routes: HashMap<ServerId, Route>,
    workloads: HashMap<ServiceKey, WorkloadResource>,
    workloads_synced_at: Option<DateTime<Utc>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, server_id: &str) -> Option<&Route> {
        self.routes.get(server_id)
    }

    pub fn store_route(&mut self, route: Route) {
        self.routes.insert(route.endpoint.server_id(), route);
    }

    pub fn evict_route(&mut self, server_id: &str) -> Option<Route> {
        self.routes.remove(server_id)
    }

    pub fn route_keys(&self) -> Vec<ServiceKey> {
        self.routes.values().map(|r| r.endpoint.key.clone()).collect()
    }

    pub fn workload_for(&self, service: &ServiceKey) -> Option<&WorkloadResource> {
        self.workloads.get(service)
    }

    /// Records a workload under the Service it names, replacing whatever was
    /// associated with that Service before.
    pub fn upsert_workload(&mut self, workload: WorkloadResource) -> Option<WorkloadResource> {
        let previous = self.workloads.insert(workload.service.clone(), workload);
        if let Some(prev) = &previous {
            let current = &self.workloads[&prev.service];
            if prev.workload != current.workload {
                warn!(
                    target: "cache",
                    "{} now backs service {}, replacing {}",
                    current.workload, prev.service, prev.workload
                );
            }
        }
        previous
    }

    /// Removes the association for `workload.service`, but only if it still
    /// points at `workload`.
    pub fn evict_workload(&mut self, workload: &WorkloadResource) -> bool {
        match self.workloads.get(&workload.service) {
            Some(cached) if cached.workload == workload.workload => {
                self.workloads.remove(&workload.service);
                true
            }
            _ => false,
        }
    }

    pub fn workloads(&self) -> impl Iterator<Item = &WorkloadResource> {
        self.workloads.values()
    }

    /// Remembers a replica count we successfully patched, until the watch
    /// delivers the object itself.
    pub fn record_desired_replicas(&mut self, service: &ServiceKey, replicas: i32) {
        if let Some(workload) = self.workloads.get_mut(service) {
            workload.desired_replicas = replicas;
        }
    }

    pub fn mark_workloads_synced(&mut self, at: DateTime<Utc>) {
        self.workloads_synced_at = Some(at);
    }

    pub fn mark_workloads_stale(&mut self) {
        self.workloads_synced_at = None;
    }

    /// When the workload view was last rebuilt from a full listing. `None`
    /// while the watch is disconnected or has not listed yet.
    pub fn workloads_synced_at(&self) -> Option<DateTime<Utc>> {
        self.workloads_synced_at
    }
}
