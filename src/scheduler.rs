//! # Feed Scheduler
//! Polls every active feed on its own timer and keeps one snapshot per feed.
//!
//! - One abortable timer task per active feed; the view decides which feeds are active.
//! - Every fetch is spawned separately, so a slow backend call never holds up a timer
//!   and stopping a timer never cancels a fetch that is already in flight.
//! - Each fetch carries a per-feed issue number; a resolution older than the last one
//!   applied is dropped, so the most recently issued fetch wins.
//! - Failures keep the last good payload and only raise the error flag.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::entity::Entity;
use crate::feeds::{Cadence, FeedRegistry, FeedSnapshot, ViewMode};

/// Emitted whenever a feed's snapshot slot changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedUpdate {
    pub feed: String,
}

#[derive(Debug)]
struct Slot {
    snapshot: FeedSnapshot,
    issued: u64,
    applied: u64,
    refreshed_at: Option<Instant>,
}

struct Shared {
    registry: FeedRegistry,
    slots: RwLock<HashMap<String, Slot>>,
    updates: broadcast::Sender<FeedUpdate>,
}

#[derive(Debug, Clone, Copy)]
struct Control {
    view: ViewMode,
    cadence: Cadence,
}

pub struct FeedScheduler {
    shared: Arc<Shared>,
    control: Mutex<Control>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl FeedScheduler {
    pub fn new(registry: FeedRegistry, view: ViewMode) -> Self {
        crate::metrics::describe_once();
        let slots = registry
            .iter()
            .map(|d| {
                (
                    d.name.clone(),
                    Slot {
                        snapshot: FeedSnapshot::empty(d.name.clone()),
                        issued: 0,
                        applied: 0,
                        refreshed_at: None,
                    },
                )
            })
            .collect();
        let (updates, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                registry,
                slots: RwLock::new(slots),
                updates,
            }),
            control: Mutex::new(Control {
                view,
                cadence: Cadence::Default,
            }),
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Start timers for the feeds active in the current view. Needs a tokio runtime.
    pub fn start(&self) {
        self.reconcile(false);
    }

    pub fn registry(&self) -> &FeedRegistry {
        &self.shared.registry
    }

    pub fn view(&self) -> ViewMode {
        self.control.lock().view
    }

    pub fn cadence(&self) -> Cadence {
        self.control.lock().cadence
    }

    /// Switch the active view. Feeds that drop out stop polling but keep their payload;
    /// feeds that come in resume from whatever was cached.
    pub fn set_view(&self, view: ViewMode) {
        {
            let mut c = self.control.lock();
            if c.view == view {
                return;
            }
            c.view = view;
        }
        tracing::info!(target: "scheduler", %view, "view switched");
        self.reconcile(false);
    }

    /// Change the global cadence; running timers restart with their new period.
    pub fn set_cadence(&self, cadence: Cadence) {
        {
            let mut c = self.control.lock();
            if c.cadence == cadence {
                return;
            }
            c.cadence = cadence;
        }
        tracing::info!(target: "scheduler", ?cadence, "cadence changed");
        self.reconcile(true);
    }

    /// Names of feeds with a running timer, in registry order.
    pub fn active_feeds(&self) -> Vec<String> {
        let timers = self.timers.lock();
        self.shared
            .registry
            .iter()
            .filter(|d| timers.contains_key(&d.name))
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.shared.updates.subscribe()
    }

    pub fn snapshot(&self, feed: &str) -> Option<FeedSnapshot> {
        self.shared
            .slots
            .read()
            .get(feed)
            .map(|s| s.snapshot.clone())
    }

    /// All snapshots in registry order.
    pub fn snapshots(&self) -> Vec<FeedSnapshot> {
        let slots = self.shared.slots.read();
        self.shared
            .registry
            .iter()
            .filter_map(|d| slots.get(&d.name).map(|s| s.snapshot.clone()))
            .collect()
    }

    /// Entities decoded from a feed's cached payload.
    pub fn entities(&self, feed: &str) -> Vec<Entity> {
        self.snapshot(feed)
            .map(|s| s.entities())
            .unwrap_or_default()
    }

    /// One out-of-band fetch. The feed's own timer is left alone.
    pub fn refetch(&self, feed: &str) -> Option<JoinHandle<()>> {
        if self.shared.registry.get(feed).is_none() {
            tracing::debug!(target: "scheduler", feed, "refetch of unknown feed ignored");
            return None;
        }
        Some(spawn_fetch(&self.shared, feed))
    }

    /// One fetch for every registered feed, active or not. No ordering between feeds.
    pub fn refetch_all(&self) -> Vec<JoinHandle<()>> {
        self.shared
            .registry
            .names()
            .iter()
            .map(|name| spawn_fetch(&self.shared, name))
            .collect()
    }

    /// Abort every timer. In-flight fetches still complete and land in their slots.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock();
        for (feed, handle) in timers.drain() {
            tracing::debug!(target: "scheduler", %feed, "timer stopped");
            handle.abort();
        }
        gauge!("scheduler_active_feeds").set(0.0);
    }

    fn reconcile(&self, restart: bool) {
        let Control { view, cadence } = *self.control.lock();
        let mut timers = self.timers.lock();

        for desc in self.shared.registry.iter() {
            let period = desc
                .effective_interval(cadence)
                .filter(|_| desc.activation.is_active(view));
            let running = timers.contains_key(&desc.name);

            match period {
                Some(period) if !running || restart => {
                    if let Some(old) = timers.remove(&desc.name) {
                        old.abort();
                    }
                    let delay = self.first_delay(&desc.name, desc.stale_after, period);
                    tracing::debug!(
                        target: "scheduler",
                        feed = %desc.name,
                        period_ms = period.as_millis() as u64,
                        delay_ms = delay.as_millis() as u64,
                        "timer started"
                    );
                    let handle = spawn_timer(self.shared.clone(), desc.name.clone(), period, delay);
                    timers.insert(desc.name.clone(), handle);
                }
                Some(_) => {}
                None => {
                    if let Some(old) = timers.remove(&desc.name) {
                        tracing::debug!(target: "scheduler", feed = %desc.name, "timer stopped");
                        old.abort();
                    }
                }
            }
        }
        gauge!("scheduler_active_feeds").set(timers.len() as f64);
    }

    /// Fetch right away unless the cached payload is still fresh; then wait until it
    /// goes stale, but never longer than one period.
    fn first_delay(&self, feed: &str, stale_after: Duration, period: Duration) -> Duration {
        let refreshed_at = self
            .shared
            .slots
            .read()
            .get(feed)
            .and_then(|s| s.refreshed_at);
        match refreshed_at {
            Some(at) => stale_after.saturating_sub(at.elapsed()).min(period),
            None => Duration::ZERO,
        }
    }
}

impl Drop for FeedScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_timer(
    shared: Arc<Shared>,
    feed: String,
    period: Duration,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            // Detached: the next tick may fire before this fetch resolves.
            let _ = spawn_fetch(&shared, &feed);
        }
    })
}

fn spawn_fetch(shared: &Arc<Shared>, feed: &str) -> JoinHandle<()> {
    let seq = {
        let mut slots = shared.slots.write();
        match slots.get_mut(feed) {
            Some(slot) => {
                slot.issued += 1;
                slot.snapshot.loading = true;
                slot.issued
            }
            None => return tokio::spawn(async {}),
        }
    };
    counter!("feed_fetch_total", "feed" => feed.to_string()).increment(1);
    notify(shared, feed);

    let shared = shared.clone();
    let feed = feed.to_string();
    tokio::spawn(async move {
        let Some(source) = shared.registry.get(&feed).map(|d| d.source.clone()) else {
            return;
        };
        let result = source.fetch().await;
        apply(&shared, &feed, seq, result);
    })
}

fn apply(shared: &Shared, feed: &str, seq: u64, result: anyhow::Result<Value>) {
    {
        let mut slots = shared.slots.write();
        let Some(slot) = slots.get_mut(feed) else {
            return;
        };
        if seq <= slot.applied {
            tracing::debug!(
                target: "scheduler",
                feed,
                seq,
                applied = slot.applied,
                "stale resolution dropped"
            );
            counter!("feed_fetch_discarded_total", "feed" => feed.to_string()).increment(1);
            return;
        }
        slot.applied = seq;
        let still_loading = seq < slot.issued;

        match result {
            Ok(payload) => {
                slot.snapshot = FeedSnapshot {
                    feed: feed.to_string(),
                    payload: Some(payload),
                    fetched_at: Some(Utc::now()),
                    loading: still_loading,
                    error: false,
                };
                slot.refreshed_at = Some(Instant::now());
                tracing::trace!(target: "scheduler", feed, seq, "snapshot replaced");
            }
            Err(e) => {
                tracing::warn!(target: "scheduler", feed, seq, error = ?e, "feed fetch failed");
                counter!("feed_fetch_errors_total", "feed" => feed.to_string()).increment(1);
                slot.snapshot = FeedSnapshot {
                    loading: still_loading,
                    error: true,
                    ..slot.snapshot.clone()
                };
            }
        }
    }
    notify(shared, feed);
}

fn notify(shared: &Shared, feed: &str) {
    // No subscribers is fine.
    let _ = shared.updates.send(FeedUpdate {
        feed: feed.to_string(),
    });
}
