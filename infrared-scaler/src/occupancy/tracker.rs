use k8s_openapi::chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::kubernetes::models::ServerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyRecord {
    pub connections: u32,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyState {
    /// No connection event seen since the record was last retired.
    Unseen,
    IdleEmpty,
    Occupied,
    /// Empty for longer than the idle threshold; due for scale-down.
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Remaining(u32),
    Emptied,
    /// Leave for a server we hold no record of. Nothing is created.
    UnknownServer,
    /// Leave while the counter is already zero. The counter stays at zero.
    Underflow,
}

/// Live connection counts per server.
///
/// Every method completes without suspending, so a read and the write that
/// follows it can't be split by another event.
#[derive(Debug)]
pub struct OccupancyTracker {
    records: HashMap<ServerId, OccupancyRecord>,
    idle_threshold: Duration,
}

impl OccupancyTracker {
    pub fn new(idle_threshold: std::time::Duration) -> Self {
        Self {
            records: HashMap::new(),
            idle_threshold: Duration::from_std(idle_threshold)
                .unwrap_or_else(|_| Duration::days(365)),
        }
    }

    pub fn join(&mut self, server_id: &str, now: DateTime<Utc>) -> u32 {
        let record = self
            .records
            .entry(server_id.to_string())
            .or_insert(OccupancyRecord {
                connections: 0,
                last_activity: now,
            });
        record.connections = record.connections.saturating_add(1);
        record.last_activity = now;
        record.connections
    }

    /// Refreshes last-activity without touching the counter, creating an
    /// empty record if none exists.
    pub fn touch(&mut self, server_id: &str, now: DateTime<Utc>) {
        self.records
            .entry(server_id.to_string())
            .or_insert(OccupancyRecord {
                connections: 0,
                last_activity: now,
            })
            .last_activity = now;
    }

    pub fn leave(&mut self, server_id: &str, now: DateTime<Utc>) -> LeaveOutcome {
        let record = match self.records.get_mut(server_id) {
            Some(r) => r,
            None => return LeaveOutcome::UnknownServer,
        };
        record.last_activity = now;
        match record.connections {
            0 => LeaveOutcome::Underflow,
            1 => {
                record.connections = 0;
                LeaveOutcome::Emptied
            }
            n => {
                record.connections = n - 1;
                LeaveOutcome::Remaining(n - 1)
            }
        }
    }

    pub fn get(&self, server_id: &str) -> Option<&OccupancyRecord> {
        self.records.get(server_id)
    }

    pub fn state(&self, server_id: &str, now: DateTime<Utc>) -> OccupancyState {
        match self.records.get(server_id) {
            None => OccupancyState::Unseen,
            Some(r) if r.connections > 0 => OccupancyState::Occupied,
            Some(r) if self.is_idle(r, now) => OccupancyState::Draining,
            Some(_) => OccupancyState::IdleEmpty,
        }
    }

    /// Servers in the draining state, sorted by id.
    pub fn idle_servers(&self, now: DateTime<Utc>) -> Vec<ServerId> {
        let mut idle: Vec<ServerId> = self
            .records
            .keys()
            .filter(|id| self.state(id, now) == OccupancyState::Draining)
            .cloned()
            .collect();
        idle.sort();
        idle
    }

    pub fn evict(&mut self, server_id: &str) -> Option<OccupancyRecord> {
        self.records.remove(server_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn is_idle(&self, record: &OccupancyRecord, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(record.last_activity) > self.idle_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> OccupancyTracker {
        OccupancyTracker::new(std::time::Duration::from_secs(300))
    }

    #[test]
    fn join_creates_and_counts() {
        let mut t = tracker();
        let now = Utc::now();

        assert_eq!(t.state("s", now), OccupancyState::Unseen);
        assert_eq!(t.join("s", now), 1);
        assert_eq!(t.join("s", now), 2);
        assert_eq!(t.state("s", now), OccupancyState::Occupied);
    }

    #[test]
    fn last_leave_empties_server() {
        let mut t = tracker();
        let now = Utc::now();
        t.join("s", now);
        t.join("s", now);

        assert_eq!(t.leave("s", now), LeaveOutcome::Remaining(1));
        assert_eq!(t.leave("s", now), LeaveOutcome::Emptied);
        assert_eq!(t.state("s", now), OccupancyState::IdleEmpty);
    }

    #[test]
    fn counter_never_goes_below_zero() {
        let mut t = tracker();
        let now = Utc::now();

        assert_eq!(t.leave("ghost", now), LeaveOutcome::UnknownServer);
        assert!(t.get("ghost").is_none());

        t.join("s", now);
        t.leave("s", now);
        for _ in 0..3 {
            assert_eq!(t.leave("s", now), LeaveOutcome::Underflow);
        }
        assert_eq!(t.get("s").unwrap().connections, 0);
    }

    #[test]
    fn empty_server_drains_after_threshold() {
        let mut t = tracker();
        let then = Utc::now();
        t.join("s", then);
        t.leave("s", then);

        assert!(t.idle_servers(then + Duration::seconds(300)).is_empty());

        let later = then + Duration::seconds(301);
        assert_eq!(t.state("s", later), OccupancyState::Draining);
        assert_eq!(t.idle_servers(later), vec!["s".to_string()]);
    }

    #[test]
    fn touch_keeps_counter_and_resets_idle_clock() {
        let mut t = tracker();
        let then = Utc::now();

        t.touch("woken", then);
        assert_eq!(t.get("woken").unwrap().connections, 0);
        assert_eq!(t.state("woken", then), OccupancyState::IdleEmpty);

        t.join("s", then);
        let later = then + Duration::seconds(400);
        t.touch("s", later);
        assert_eq!(t.get("s").unwrap().connections, 1);
        assert_eq!(t.get("s").unwrap().last_activity, later);

        assert_eq!(t.idle_servers(later), vec!["woken".to_string()]);
    }

    #[test]
    fn occupied_server_is_never_idle() {
        let mut t = tracker();
        let then = Utc::now();
        t.join("s", then);

        assert!(t.idle_servers(then + Duration::hours(2)).is_empty());
    }

    #[test]
    fn activity_resets_idle_clock() {
        let mut t = tracker();
        let then = Utc::now();
        t.join("s", then);
        t.leave("s", then);

        let later = then + Duration::seconds(200);
        t.join("s", later);
        t.leave("s", later);

        assert!(t.idle_servers(then + Duration::seconds(400)).is_empty());
        assert_eq!(t.idle_servers(later + Duration::seconds(301)).len(), 1);
    }
}
