//! Supervised watch streams.
//!
//! Each resource kind gets one supervisor task that turns the raw watch into
//! typed [`WatchEvent`]s on a channel. A stream error is reported, then the
//! watch is rebuilt from scratch after a fixed delay so the consumer always
//! gets a full relist after an outage.

use futures::StreamExt;
use kube::runtime::watcher;
use kube::{Api, Resource};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Applied(K),
    Deleted(K),
    /// Complete current state of the collection.
    Relisted(Vec<K>),
    StreamError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Connecting,
    Synced,
    Reconnecting,
}

impl WatchState {
    /// State after the watch delivered `event`.
    pub fn after<K>(self, event: &WatchEvent<K>) -> Self {
        match event {
            WatchEvent::Relisted(_) => WatchState::Synced,
            WatchEvent::StreamError(_) => WatchState::Reconnecting,
            WatchEvent::Applied(_) | WatchEvent::Deleted(_) => self,
        }
    }
}

fn translate<K>(event: watcher::Event<K>) -> WatchEvent<K> {
    match event {
        watcher::Event::Applied(obj) => WatchEvent::Applied(obj),
        watcher::Event::Deleted(obj) => WatchEvent::Deleted(obj),
        watcher::Event::Restarted(objs) => WatchEvent::Relisted(objs),
    }
}

/// Runs until the receiving side of `tx` is dropped.
pub async fn supervise<K, T>(
    kind: &'static str,
    api: Api<K>,
    reconnect_delay: Duration,
    tx: mpsc::Sender<T>,
    wrap: fn(WatchEvent<K>) -> T,
) where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let mut state = WatchState::Connecting;
    loop {
        info!(target: "watcher", "{} watch connecting", kind);
        let stream = watcher(api.clone(), watcher::Config::default());
        futures::pin_mut!(stream);

        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(event) => translate(event),
                Err(e) => WatchEvent::StreamError(e.to_string()),
            };

            let next = state.after(&event);
            if next != state {
                debug!(target: "watcher", "{} watch {:?} -> {:?}", kind, state, next);
                if next == WatchState::Synced {
                    info!(target: "watcher", "{} watch synced", kind);
                }
                state = next;
            }

            let failed = matches!(event, WatchEvent::StreamError(_));
            if let WatchEvent::StreamError(e) = &event {
                warn!(
                    target: "watcher",
                    "{} watch failed, relisting in {}s: {}",
                    kind,
                    reconnect_delay.as_secs(),
                    e
                );
            }
            if tx.send(wrap(event)).await.is_err() {
                return;
            }
            if failed {
                break;
            }
        }

        if state != WatchState::Reconnecting {
            warn!(target: "watcher", "{} watch ended, relisting in {}s", kind, reconnect_delay.as_secs());
            state = WatchState::Reconnecting;
        }
        tokio::time::sleep(reconnect_delay).await;
        debug!(target: "watcher", "{} watch {:?} -> {:?}", kind, state, WatchState::Connecting);
        state = WatchState::Connecting;
    }
}
