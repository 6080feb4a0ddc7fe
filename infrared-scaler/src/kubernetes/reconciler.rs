//! Keeps Infrared's routing documents in line with watched Services and
//! StatefulSets.
//!
//! Every document is recomputed from the cache in full, never patched from
//! history, so replayed or reordered events converge on the same result.
//! The cache only changes after the config store has confirmed a write.

use infrared_scaler_common::ConfigDocument;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::cache::{ResourceCache, Route};
use super::models::{EndpointResource, ServiceKey, WorkloadResource};
use super::watcher::WatchEvent;
use crate::error::PublishError;
use crate::occupancy::tracker::OccupancyTracker;
use crate::proxy::publisher::{config_id, ConfigStore, Removal};
use crate::proxy::synthesizer::Synthesizer;

pub struct Reconciler {
    store: Arc<dyn ConfigStore>,
    synthesizer: Synthesizer,
    config_path: String,
    domain_annotation: String,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        synthesizer: Synthesizer,
        config_path: impl Into<String>,
        domain_annotation: impl Into<String>,
    ) -> Self {
        Self {
            store,
            synthesizer,
            config_path: config_path.into(),
            domain_annotation: domain_annotation.into(),
        }
    }

    pub async fn service_event(
        &self,
        event: WatchEvent<Service>,
        cache: &mut ResourceCache,
        tracker: &mut OccupancyTracker,
    ) {
        match event {
            WatchEvent::Applied(svc) => self.apply_service(&svc, cache, tracker).await,
            WatchEvent::Deleted(svc) => match ServiceKey::from_meta("Service", &svc.metadata) {
                Ok(key) => {
                    info!(target: "reconciler", "Service {} deleted", key);
                    self.retract(&key, cache, tracker).await;
                }
                Err(e) => warn!(target: "reconciler", "Skipping Service delete: {}", e),
            },
            WatchEvent::Relisted(services) => {
                info!(target: "reconciler", "Reconciling {} listed Services", services.len());
                let listed: BTreeSet<ServiceKey> = services
                    .iter()
                    .filter_map(|svc| ServiceKey::from_meta("Service", &svc.metadata).ok())
                    .collect();
                for svc in &services {
                    self.apply_service(svc, cache, tracker).await;
                }
                for key in cache.route_keys() {
                    if !listed.contains(&key) {
                        info!(target: "reconciler", "Service {} vanished while disconnected", key);
                        self.retract(&key, cache, tracker).await;
                    }
                }
            }
            WatchEvent::StreamError(e) => {
                debug!(target: "reconciler", "Service stream error: {}", e);
            }
        }
    }

    pub async fn statefulset_event(
        &self,
        event: WatchEvent<StatefulSet>,
        cache: &mut ResourceCache,
        tracker: &mut OccupancyTracker,
        now: DateTime<Utc>,
    ) {
        match event {
            WatchEvent::Applied(sts) => {
                let workload = match WorkloadResource::from_statefulset(&sts) {
                    Ok(w) => w,
                    Err(e) => {
                        warn!(target: "reconciler", "Skipping StatefulSet: {}", e);
                        return;
                    }
                };
                let service = workload.service.clone();
                cache.upsert_workload(workload);
                self.refresh_route(&service, cache, tracker).await;
            }
            WatchEvent::Deleted(sts) => {
                let workload = match WorkloadResource::from_statefulset(&sts) {
                    Ok(w) => w,
                    Err(e) => {
                        warn!(target: "reconciler", "Skipping StatefulSet delete: {}", e);
                        return;
                    }
                };
                if cache.evict_workload(&workload) {
                    info!(target: "reconciler", "{} deleted", workload.workload);
                    self.refresh_route(&workload.service, cache, tracker).await;
                }
            }
            WatchEvent::Relisted(statefulsets) => {
                let listed: Vec<WorkloadResource> = statefulsets
                    .iter()
                    .filter_map(|sts| match WorkloadResource::from_statefulset(sts) {
                        Ok(w) => Some(w),
                        Err(e) => {
                            warn!(target: "reconciler", "Skipping StatefulSet: {}", e);
                            None
                        }
                    })
                    .collect();
                let gone: Vec<WorkloadResource> = cache
                    .workloads()
                    .filter(|cached| !listed.iter().any(|w| w.workload == cached.workload))
                    .cloned()
                    .collect();

                let mut touched = BTreeSet::new();
                for workload in gone {
                    cache.evict_workload(&workload);
                    touched.insert(workload.service);
                }
                for workload in listed {
                    touched.insert(workload.service.clone());
                    cache.upsert_workload(workload);
                }
                cache.mark_workloads_synced(now);
                info!(target: "reconciler", "StatefulSet view synced");

                for service in touched {
                    self.refresh_route(&service, cache, tracker).await;
                }
            }
            WatchEvent::StreamError(e) => {
                cache.mark_workloads_stale();
                debug!(target: "reconciler", "StatefulSet stream error: {}", e);
            }
        }
    }

    /// Add/update path for one Service.
    pub async fn apply_service(
        &self,
        svc: &Service,
        cache: &mut ResourceCache,
        tracker: &mut OccupancyTracker,
    ) {
        match EndpointResource::from_service(svc, &self.domain_annotation) {
            Ok(endpoint) => self.apply_endpoint(endpoint, cache, tracker).await,
            Err(e) => warn!(target: "reconciler", "Skipping Service: {}", e),
        }
    }

    async fn apply_endpoint(
        &self,
        endpoint: EndpointResource,
        cache: &mut ResourceCache,
        tracker: &mut OccupancyTracker,
    ) {
        let synthesized = self
            .synthesizer
            .synthesize(&endpoint, cache.workload_for(&endpoint.key));
        let config = match synthesized {
            Some(c) => c,
            None => return self.retract_if_published(&endpoint.key, cache, tracker).await,
        };

        let id = config_id(&self.config_path, &endpoint.key);
        let document = ConfigDocument::single(endpoint.server_id(), config.clone());
        if let Err(e) = self.store.upsert(&id, &document).await {
            error!(target: "reconciler", "Failed to update config for {}: {}", endpoint.key, e);
            return;
        }

        info!(target: "reconciler", "Updated config for {}", endpoint.key);
        cache.store_route(Route { endpoint, config });
    }

    /// Re-synthesizes an already routed Service after its StatefulSet changed.
    async fn refresh_route(
        &self,
        service: &ServiceKey,
        cache: &mut ResourceCache,
        tracker: &mut OccupancyTracker,
    ) {
        let route = match cache.route(&service.server_id()) {
            Some(r) => r.clone(),
            None => return,
        };
        let unchanged = self
            .synthesizer
            .synthesize(&route.endpoint, cache.workload_for(service))
            .map_or(false, |c| c == route.config);
        if unchanged {
            return;
        }
        self.apply_endpoint(route.endpoint, cache, tracker).await;
    }

    /// Removes the document of a Service that lost its domain, if one exists.
    async fn retract_if_published(
        &self,
        key: &ServiceKey,
        cache: &mut ResourceCache,
        tracker: &mut OccupancyTracker,
    ) {
        let id = config_id(&self.config_path, key);
        match self.store.exists(&id).await {
            Ok(true) => self.retract(key, cache, tracker).await,
            Ok(false) => {
                if cache.evict_route(&key.server_id()).is_some() {
                    tracker.evict(&key.server_id());
                }
                debug!(target: "reconciler", "Service {} has no domain, nothing published", key);
            }
            Err(e) => {
                error!(target: "reconciler", "Failed to look up config for {}: {}", key, e);
            }
        }
    }

    async fn retract(&self, key: &ServiceKey, cache: &mut ResourceCache, tracker: &mut OccupancyTracker) {
        match self.delete(key).await {
            Ok(removal) => {
                cache.evict_route(&key.server_id());
                tracker.evict(&key.server_id());
                match removal {
                    Removal::Deleted => info!(target: "reconciler", "Deleted config for {}", key),
                    Removal::AlreadyAbsent => {
                        debug!(target: "reconciler", "Config for {} was already gone", key)
                    }
                }
            }
            Err(e) => error!(target: "reconciler", "Failed to delete config for {}: {}", key, e),
        }
    }

    async fn delete(&self, key: &ServiceKey) -> Result<Removal, PublishError> {
        self.store.delete(&config_id(&self.config_path, key)).await
    }
}
