//! Bridge from the GameServer watch stream to the event handler
//!
//! The watcher delivers snapshots; this module keeps the last-seen
//! copy per identity so updates can carry the previous version, and
//! reconciles relists against that map so objects deleted while the
//! watch was down still produce a deleted notification. A periodic
//! resync re-delivers every live object as an update, which doubles as
//! the requeue net for events dropped after retries were exhausted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::ListParams;
use kube::runtime::watcher::{self, watcher, Event};
use kube::runtime::WatchStreamExt;
use kube::Api;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::gameserver::{GameServer, NamespacedName};
use crate::handler::Handler;

/// Consumer of GameServer lifecycle notifications.
pub trait GameServerEvents: Send + Sync {
    fn on_added(&self, gs: &GameServer);
    fn on_updated(&self, old: Option<&GameServer>, new: &GameServer);
    fn on_deleted(&self, gs: &GameServer);
}

impl GameServerEvents for Handler {
    fn on_added(&self, gs: &GameServer) {
        Handler::on_added(self, gs);
    }
    fn on_updated(&self, old: Option<&GameServer>, new: &GameServer) {
        Handler::on_updated(self, old, new);
    }
    fn on_deleted(&self, gs: &GameServer) {
        Handler::on_deleted(self, gs);
    }
}

#[derive(Default)]
struct WatchState {
    last_seen: HashMap<NamespacedName, GameServer>,
    relist_seen: HashSet<NamespacedName>,
}

impl WatchState {
    fn apply<H: GameServerEvents + ?Sized>(&mut self, handler: &H, event: Event<GameServer>) {
        match event {
            Event::Init => {
                self.relist_seen.clear();
            }
            Event::InitApply(gs) => {
                self.relist_seen.insert(gs.namespaced_name());
                self.upsert(handler, gs);
            }
            Event::InitDone => {
                // Objects that vanished while the watch was down.
                let gone: Vec<_> = self
                    .last_seen
                    .keys()
                    .filter(|id| !self.relist_seen.contains(id))
                    .cloned()
                    .collect();
                for id in gone {
                    if let Some(old) = self.last_seen.remove(&id) {
                        handler.on_deleted(&old);
                    }
                }
                self.relist_seen.clear();
                debug!(objects = self.last_seen.len(), "Relist complete");
            }
            Event::Apply(gs) => {
                self.upsert(handler, gs);
            }
            Event::Delete(gs) => {
                self.last_seen.remove(&gs.namespaced_name());
                handler.on_deleted(&gs);
            }
        }
    }

    fn upsert<H: GameServerEvents + ?Sized>(&mut self, handler: &H, gs: GameServer) {
        match self.last_seen.insert(gs.namespaced_name(), gs.clone()) {
            Some(old) => handler.on_updated(Some(&old), &gs),
            None => handler.on_added(&gs),
        }
    }
}

/// Drive the GameServer watch until the stream ends.
pub async fn run<H: GameServerEvents + ?Sized>(api: Api<GameServer>, handler: Arc<H>) {
    info!("Starting GameServer watch");

    let mut state = WatchState::default();
    let stream = watcher(api, watcher::Config::default()).default_backoff();
    let mut stream = std::pin::pin!(stream);

    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => state.apply(handler.as_ref(), event),
            Err(error) => warn!(error = %error, "Watch stream error"),
        }
    }
}

/// Periodically re-deliver every live GameServer as an update.
pub async fn resync<H: GameServerEvents + ?Sized>(
    api: Api<GameServer>,
    handler: Arc<H>,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The watcher's initial list already delivered everything once.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                debug!(objects = list.items.len(), "Periodic resync");
                for gs in list {
                    handler.on_updated(None, &gs);
                }
            }
            Err(error) => warn!(error = %error, "Resync list failed"),
        }
    }
}
