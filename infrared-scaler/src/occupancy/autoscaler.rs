//! Scales StatefulSets from the proxy's connection callbacks.
//!
//! A login attempt against a sleeping server wakes it; servers that stay
//! empty past the idle threshold are put back to sleep by the sweep.

use infrared_scaler_common::{
    CallbackMessage, PlayerData, PrePlayerJoinData, TOPIC_PLAYER_JOIN, TOPIC_PLAYER_LEAVE,
    TOPIC_PRE_PLAYER_JOIN,
};
use k8s_openapi::chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;

use super::tracker::{LeaveOutcome, OccupancyTracker};
use crate::kubernetes::cache::ResourceCache;
use crate::kubernetes::models::{ServerId, WorkloadResource};
use crate::kubernetes::scaler::{scale_to, ReplicaScaler, ScaleDecision};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    PreJoin { server_id: ServerId, login: bool },
    Join { server_id: ServerId, username: Option<String> },
    Leave { server_id: ServerId, username: Option<String> },
}

impl HookEvent {
    /// Decodes the first recognized topic. `Ok(None)` when none is recognized.
    pub fn from_message(message: CallbackMessage) -> Result<Option<Self>, serde_json::Error> {
        let topic = message.topics.iter().find(|t| {
            matches!(
                t.as_str(),
                TOPIC_PRE_PLAYER_JOIN | TOPIC_PLAYER_JOIN | TOPIC_PLAYER_LEAVE
            )
        });

        let event = match topic.map(String::as_str) {
            Some(TOPIC_PRE_PLAYER_JOIN) => {
                let data: PrePlayerJoinData = serde_json::from_value(message.data)?;
                HookEvent::PreJoin {
                    server_id: data.server.server_id,
                    login: data.is_login_request,
                }
            }
            Some(TOPIC_PLAYER_JOIN) => {
                let data: PlayerData = serde_json::from_value(message.data)?;
                HookEvent::Join {
                    server_id: data.server.server_id,
                    username: data.client.and_then(|c| c.username),
                }
            }
            Some(TOPIC_PLAYER_LEAVE) => {
                let data: PlayerData = serde_json::from_value(message.data)?;
                HookEvent::Leave {
                    server_id: data.server.server_id,
                    username: data.client.and_then(|c| c.username),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Outcome of one idle sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub scaled_down: Vec<ServerId>,
    pub failed: Vec<ServerId>,
    /// Kept for the next sweep because the workload view is not synced.
    pub retained: Vec<ServerId>,
    /// Retired without a patch (already at zero, or nothing to scale).
    pub retired: Vec<ServerId>,
}

pub struct Autoscaler {
    scaler: Arc<dyn ReplicaScaler>,
}

impl Autoscaler {
    pub fn new(scaler: Arc<dyn ReplicaScaler>) -> Self {
        Self { scaler }
    }

    pub async fn handle(
        &self,
        event: HookEvent,
        cache: &mut ResourceCache,
        tracker: &mut OccupancyTracker,
        now: DateTime<Utc>,
    ) {
        match event {
            HookEvent::PreJoin { server_id, login } => {
                if !login {
                    debug!(target: "autoscaler", "Ignoring status ping for {}", server_id);
                    return;
                }
                self.wake(&server_id, cache, tracker, now).await;
            }
            HookEvent::Join { server_id, username } => {
                let count = tracker.join(&server_id, now);
                info!(
                    target: "autoscaler",
                    "{} joined {}, {} connected",
                    username.as_deref().unwrap_or("<unknown>"),
                    server_id,
                    count
                );
            }
            HookEvent::Leave { server_id, username } => {
                let who = username.as_deref().unwrap_or("<unknown>");
                match tracker.leave(&server_id, now) {
                    LeaveOutcome::Remaining(n) => {
                        info!(target: "autoscaler", "{} left {}, {} connected", who, server_id, n)
                    }
                    LeaveOutcome::Emptied => {
                        info!(target: "autoscaler", "{} left {}, server is empty", who, server_id)
                    }
                    LeaveOutcome::UnknownServer => warn!(
                        target: "autoscaler",
                        "Unknown leave: {} left {} which has no occupancy record",
                        who,
                        server_id
                    ),
                    LeaveOutcome::Underflow => warn!(
                        target: "autoscaler",
                        "Unknown leave: {} left {} which already had no connections",
                        who,
                        server_id
                    ),
                }
            }
        }
    }

    /// Scales a sleeping server to one replica. A woken server gets an empty
    /// occupancy record so the sweep puts it back to sleep if nobody joins.
    async fn wake(
        &self,
        server_id: &str,
        cache: &mut ResourceCache,
        tracker: &mut OccupancyTracker,
        now: DateTime<Utc>,
    ) {
        if cache.workloads_synced_at().is_none() {
            warn!(target: "autoscaler", "Not waking {}: StatefulSet view is not synced", server_id);
            return;
        }
        let workload = match resolve(cache, server_id) {
            Some(w) => w,
            None => return,
        };
        if workload.desired_replicas != 0 {
            debug!(
                target: "autoscaler",
                "{} already wants {} replicas, no change",
                workload.workload,
                workload.desired_replicas
            );
            return;
        }

        match scale_to(self.scaler.as_ref(), &workload, 1).await {
            Ok(ScaleDecision::Up) => {
                cache.record_desired_replicas(&workload.service, 1);
                tracker.touch(server_id, now);
                info!(target: "autoscaler", "Waking {} for {}", workload.workload, server_id);
            }
            Ok(_) => {}
            Err(e) => error!(target: "autoscaler", "Failed to wake {}: {}", server_id, e),
        }
    }

    /// Scales down every server that has been empty past the idle threshold.
    ///
    /// Each server is handled on its own; a failed patch is logged and the
    /// record retired anyway, so at most one attempt is made per idle period.
    pub async fn sweep(
        &self,
        cache: &mut ResourceCache,
        tracker: &mut OccupancyTracker,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        let synced = cache.workloads_synced_at().is_some();

        for server_id in tracker.idle_servers(now) {
            if !synced {
                report.retained.push(server_id);
                continue;
            }

            let workload = match resolve(cache, &server_id) {
                Some(w) if w.desired_replicas != 0 => w,
                _ => {
                    tracker.evict(&server_id);
                    report.retired.push(server_id);
                    continue;
                }
            };

            info!(target: "autoscaler", "{} has been idle, scaling {} down", server_id, workload.workload);
            match scale_to(self.scaler.as_ref(), &workload, 0).await {
                Ok(_) => {
                    cache.record_desired_replicas(&workload.service, 0);
                    report.scaled_down.push(server_id.clone());
                }
                Err(e) => {
                    error!(target: "autoscaler", "Failed to scale down {}: {}", server_id, e);
                    report.failed.push(server_id.clone());
                }
            }
            tracker.evict(&server_id);
        }

        if !report.retained.is_empty() {
            warn!(
                target: "autoscaler",
                "StatefulSet view is not synced, postponing scale-down of {} idle servers",
                report.retained.len()
            );
        }
        report
    }
}

fn resolve(cache: &ResourceCache, server_id: &str) -> Option<WorkloadResource> {
    let route = match cache.route(server_id) {
        Some(r) => r,
        None => {
            warn!(target: "autoscaler", "No route is known for server {}", server_id);
            return None;
        }
    };
    match cache.workload_for(&route.endpoint.key) {
        Some(w) => Some(w.clone()),
        None => {
            warn!(
                target: "autoscaler",
                "No StatefulSet backs service {} (server {})",
                route.endpoint.key,
                server_id
            );
            None
        }
    }
}
