// src/alerts/service.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::detector::{AlertView, ChangeDetector, TickOutcome};
use super::{Alert, AlertConfig};
use crate::entity::Entity;
use crate::feeds::FeedSnapshot;
use crate::scheduler::FeedScheduler;

/// Background side of the alert queue: follows the scheduler's movers snapshots,
/// runs the countdown sweep, and serializes every mutation through one lock.
pub struct AlertService {
    detector: Arc<Mutex<ChangeDetector>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AlertService {
    pub fn new(cfg: AlertConfig) -> Self {
        crate::metrics::describe_once();
        Self {
            detector: Arc::new(Mutex::new(ChangeDetector::new(cfg))),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Follow `feed` on `scheduler` and start the countdown sweep. Needs a tokio runtime.
    /// The movers endpoint is fetched by the scheduler only; every new payload it lands
    /// is one tick here.
    pub fn start(&self, scheduler: Arc<FeedScheduler>, feed: &str) {
        let period = self.detector.lock().config().countdown_period();
        let mut tasks = self.tasks.lock();
        tasks.push(spawn_movers_watch(
            self.detector.clone(),
            scheduler,
            feed.to_string(),
        ));
        tasks.push(spawn_countdown(self.detector.clone(), period));
    }

    /// Apply one already-decoded movers snapshot.
    pub fn apply(&self, entities: &[Entity]) -> TickOutcome {
        self.detector.lock().apply_snapshot(entities, Instant::now())
    }

    pub fn view(&self, expanded: bool) -> AlertView {
        self.detector.lock().view(Instant::now(), expanded)
    }

    pub fn dismiss(&self, id: u64) -> Option<Alert> {
        self.detector.lock().dismiss(id)
    }

    pub fn dismiss_all(&self) -> usize {
        self.detector.lock().dismiss_all()
    }

    pub fn snooze(&self) {
        self.detector.lock().snooze(Instant::now());
    }

    pub fn reset_session(&self) {
        self.detector.lock().reset_session();
    }

    pub fn has_seen(&self, ticker: &str) -> bool {
        self.detector.lock().has_seen(ticker)
    }

    pub fn queue_len(&self) -> usize {
        self.detector.lock().queue_len()
    }

    /// Stop following movers and stop the countdown sweep.
    pub fn shutdown(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for AlertService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One movers tick from a scheduler snapshot. Only a payload newer than `last` counts:
/// an empty slot, a loading flag or a failed fetch (which keeps the old payload and its
/// timestamp) leave the detector untouched.
pub fn apply_new_snapshot(
    detector: &Mutex<ChangeDetector>,
    snap: &FeedSnapshot,
    last: &mut Option<DateTime<Utc>>,
) -> Option<TickOutcome> {
    let fetched_at = snap.fetched_at?;
    if snap.payload.is_none() || *last == Some(fetched_at) {
        return None;
    }
    *last = Some(fetched_at);
    let entities = snap.entities();
    // The lock covers the whole partition -> mark -> enqueue step.
    let outcome = detector.lock().apply_snapshot(&entities, Instant::now());
    Some(outcome)
}

pub fn spawn_movers_watch(
    detector: Arc<Mutex<ChangeDetector>>,
    scheduler: Arc<FeedScheduler>,
    feed: String,
) -> JoinHandle<()> {
    let mut updates = scheduler.subscribe();
    tokio::spawn(async move {
        let mut last = None;
        let tick = |last: &mut Option<DateTime<Utc>>| {
            let Some(snap) = scheduler.snapshot(&feed) else {
                return;
            };
            match apply_new_snapshot(&detector, &snap, last) {
                Some(out) if !out.created.is_empty() => {
                    tracing::debug!(
                        target: "alerts",
                        created = out.created.len(),
                        evicted = out.evicted,
                        "movers tick"
                    );
                }
                Some(_) => tracing::trace!(target: "alerts", "movers tick: nothing new"),
                None => {}
            }
        };

        // Catch up with whatever landed before we subscribed.
        tick(&mut last);
        loop {
            match updates.recv().await {
                Ok(u) if u.feed == feed => tick(&mut last),
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!(target: "alerts", skipped = n, "movers watch lagged");
                    tick(&mut last);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

pub fn spawn_countdown(
    detector: Arc<Mutex<ChangeDetector>>,
    period: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let gone = detector.lock().expire(Instant::now());
            if gone > 0 {
                tracing::trace!(target: "alerts", gone, "alerts expired");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::{FeedDescriptor, FeedRegistry, FeedSource, StaticSource, ViewMode};
    use serde_json::json;
    use std::time::Duration;

    fn movers_sched(src: &Arc<StaticSource>, every: Duration) -> Arc<FeedScheduler> {
        let desc = FeedDescriptor::new("movers", src.clone() as Arc<dyn FeedSource>).every(every);
        Arc::new(FeedScheduler::new(
            FeedRegistry::new().register(desc),
            ViewMode::Momentum,
        ))
    }

    #[tokio::test]
    async fn failed_fetch_changes_nothing() {
        let det = Mutex::new(ChangeDetector::new(AlertConfig::default()));
        let src = Arc::new(StaticSource::new(
            "movers",
            json!({"movers": [{"ticker": "AAA", "change_percent": 9.0}]}),
        ));
        let sched = movers_sched(&src, Duration::ZERO);
        let mut last = None;

        // Nothing fetched yet.
        assert!(apply_new_snapshot(&det, &sched.snapshot("movers").unwrap(), &mut last).is_none());

        sched.refetch("movers").unwrap().await.unwrap();
        let out = apply_new_snapshot(&det, &sched.snapshot("movers").unwrap(), &mut last).unwrap();
        assert_eq!(out.created, vec![1]);

        src.set_payload(json!({"movers": [{"ticker": "BBB", "change_percent": 9.0}]}));
        src.fail_next();
        sched.refetch("movers").unwrap().await.unwrap();
        let snap = sched.snapshot("movers").unwrap();
        assert!(snap.error);
        assert!(apply_new_snapshot(&det, &snap, &mut last).is_none());
        assert_eq!(det.lock().seen_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn follows_scheduler_without_fetching_on_its_own() {
        let src = Arc::new(StaticSource::new(
            "movers",
            json!({"movers": [{"ticker": "AAA", "change_percent": 9.0}]}),
        ));
        let sched = movers_sched(&src, Duration::from_secs(30));
        let svc = AlertService::new(AlertConfig::default());
        sched.start();
        svc.start(sched.clone(), "movers");

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(svc.view(false).shown.len(), 1);
        // One fetch of the endpoint, shared by the feed slot and the alerts.
        assert_eq!(src.calls(), 1);

        time::sleep(Duration::from_secs(12)).await;
        assert_eq!(svc.queue_len(), 0);
        assert!(svc.has_seen("AAA"));

        src.set_payload(json!({"movers": [{"ticker": "BBB", "change_percent": 9.0}]}));
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(src.calls(), 2);
        assert!(svc.has_seen("BBB"));

        svc.shutdown();
        src.set_payload(json!({"movers": [{"ticker": "CCC", "change_percent": 9.0}]}));
        time::sleep(Duration::from_secs(60)).await;
        assert!(!svc.has_seen("CCC"));
        sched.shutdown();
    }
}
