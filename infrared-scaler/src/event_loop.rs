//! The single consumer of watch notifications, callbacks and sweep ticks.
//!
//! [`Controller`] owns the resource cache and the occupancy tracker. Nothing
//! else holds them, so every mutation happens on this one task no matter
//! which runtime thread it is polled on.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::chrono::{DateTime, Utc};
use log::{debug, info};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::kubernetes::cache::ResourceCache;
use crate::kubernetes::reconciler::Reconciler;
use crate::kubernetes::watcher::WatchEvent;
use crate::occupancy::autoscaler::{Autoscaler, HookEvent};
use crate::occupancy::tracker::OccupancyTracker;

pub const EVENT_BUFFER: usize = 256;

#[derive(Debug)]
pub enum ControlEvent {
    Services(WatchEvent<Service>),
    StatefulSets(WatchEvent<StatefulSet>),
    Hook(HookEvent),
    Sweep,
}

pub struct Controller {
    reconciler: Reconciler,
    autoscaler: Autoscaler,
    cache: ResourceCache,
    tracker: OccupancyTracker,
}

impl Controller {
    pub fn new(reconciler: Reconciler, autoscaler: Autoscaler, idle_timeout: Duration) -> Self {
        Self {
            reconciler,
            autoscaler,
            cache: ResourceCache::new(),
            tracker: OccupancyTracker::new(idle_timeout),
        }
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn tracker(&self) -> &OccupancyTracker {
        &self.tracker
    }

    pub async fn handle(&mut self, event: ControlEvent, now: DateTime<Utc>) {
        match event {
            ControlEvent::Services(e) => {
                self.reconciler
                    .service_event(e, &mut self.cache, &mut self.tracker)
                    .await
            }
            ControlEvent::StatefulSets(e) => {
                self.reconciler
                    .statefulset_event(e, &mut self.cache, &mut self.tracker, now)
                    .await
            }
            ControlEvent::Hook(e) => {
                self.autoscaler
                    .handle(e, &mut self.cache, &mut self.tracker, now)
                    .await
            }
            ControlEvent::Sweep => {
                let report = self
                    .autoscaler
                    .sweep(&mut self.cache, &mut self.tracker, now)
                    .await;
                debug!(target: "event_loop", "Sweep finished: {:?}", report);
            }
        }
    }

    /// Processes events one at a time until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ControlEvent>) -> Self {
        info!(target: "event_loop", "Event loop started");
        while let Some(event) = rx.recv().await {
            self.handle(event, Utc::now()).await;
        }
        info!(target: "event_loop", "Event loop stopped");
        self
    }
}

/// Queues an idle sweep every `interval`, starting one interval from now.
pub async fn tick_sweeps(interval: Duration, tx: mpsc::Sender<ControlEvent>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if tx.send(ControlEvent::Sweep).await.is_err() {
            return;
        }
    }
}
