// src/alerts/detector.rs
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::time::Instant;

use super::snooze::Snooze;
use super::{Alert, AlertConfig};
use crate::entity::Entity;

/// What one movers snapshot did to the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Ids of alerts created by this tick, in snapshot order.
    pub created: Vec<u64>,
    /// Alerts pushed off the tail by the queue cap.
    pub evicted: usize,
    /// The tick was skipped because alerts are snoozed.
    pub snoozed: bool,
}

/// One toast as the front end draws it.
#[derive(Debug, Clone, Serialize)]
pub struct AlertCard {
    pub id: u64,
    pub entity: Entity,
    pub created_at: DateTime<Utc>,
    /// Lifetime left in `[0, 1]`, drives the countdown bar.
    pub remaining: f64,
}

/// Display-capped view of the queue.
#[derive(Debug, Clone, Serialize)]
pub struct AlertView {
    pub shown: Vec<AlertCard>,
    /// Alerts beyond the display cap, summarized as a count.
    pub overflow: usize,
    pub snoozed: bool,
    pub snooze_remaining_secs: Option<u64>,
}

/// Session state for movers alerts. Owns the SeenSet, the id counter and the queue;
/// nothing else mutates them.
#[derive(Debug)]
pub struct ChangeDetector {
    cfg: AlertConfig,
    seen: HashSet<String>,
    /// Newest first.
    queue: VecDeque<Alert>,
    next_id: u64,
    snooze: Snooze,
}

impl ChangeDetector {
    pub fn new(cfg: AlertConfig) -> Self {
        let cfg = cfg.sanitized();
        let snooze = Snooze::new(cfg.snooze());
        Self {
            queue: VecDeque::with_capacity(cfg.max_queue + 1),
            cfg,
            seen: HashSet::new(),
            next_id: 1,
            snooze,
        }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.cfg
    }

    fn is_significant(&self, e: &Entity) -> bool {
        match self.cfg.min_move_pct {
            Some(min) => e.change_pct.abs() >= min,
            None => true,
        }
    }

    /// Apply one movers snapshot: partition into seen/new, mark new as seen,
    /// prepend an alert per new ticker, then trim to the queue cap.
    /// Nothing happens while snoozed, not even SeenSet updates.
    pub fn apply_snapshot(&mut self, entities: &[Entity], now: Instant) -> TickOutcome {
        if self.snooze.is_active(now) {
            counter!("alerts_suppressed_snooze_total").increment(1);
            tracing::debug!(target: "alerts", movers = entities.len(), "tick skipped while snoozed");
            return TickOutcome {
                snoozed: true,
                ..TickOutcome::default()
            };
        }

        let mut fresh = Vec::new();
        for e in entities {
            if !self.is_significant(e) {
                continue;
            }
            // insert() is false for tickers already alerted on, including repeats in this snapshot
            if self.seen.insert(e.ticker.clone()) {
                fresh.push(e);
            }
        }

        let created_utc = Utc::now();
        let mut created = Vec::with_capacity(fresh.len());
        let mut batch = Vec::with_capacity(fresh.len());
        for e in fresh {
            let id = self.next_id;
            self.next_id += 1;
            created.push(id);
            batch.push(Alert {
                id,
                entity: Entity {
                    first_seen: true,
                    ..e.clone()
                },
                created_utc,
                dismissed: false,
                created_at: now,
            });
        }
        // Keep snapshot order at the top of the queue.
        for alert in batch.into_iter().rev() {
            tracing::info!(
                target: "alerts",
                id = alert.id,
                ticker = %alert.entity.ticker,
                change_pct = alert.entity.change_pct,
                "new mover"
            );
            self.queue.push_front(alert);
        }

        let mut evicted = 0;
        while self.queue.len() > self.cfg.max_queue {
            self.queue.pop_back();
            evicted += 1;
        }

        counter!("alerts_created_total").increment(created.len() as u64);
        counter!("alerts_evicted_total").increment(evicted as u64);
        gauge!("alerts_queue_len").set(self.queue.len() as f64);

        TickOutcome {
            created,
            evicted,
            snoozed: false,
        }
    }

    /// Remove alerts whose countdown reached zero. Returns how many went.
    pub fn expire(&mut self, now: Instant) -> usize {
        let lifetime = self.cfg.lifetime();
        let before = self.queue.len();
        self.queue.retain(|a| !a.is_expired(now, lifetime));
        let gone = before - self.queue.len();
        if gone > 0 {
            counter!("alerts_expired_total").increment(gone as u64);
            gauge!("alerts_queue_len").set(self.queue.len() as f64);
        }
        gone
    }

    /// Remove one alert right away, whatever its countdown says.
    pub fn dismiss(&mut self, id: u64) -> Option<Alert> {
        let pos = self.queue.iter().position(|a| a.id == id)?;
        let mut alert = self.queue.remove(pos)?;
        alert.dismissed = true;
        gauge!("alerts_queue_len").set(self.queue.len() as f64);
        Some(alert)
    }

    /// Clear the queue. Already-seen tickers stay suppressed.
    pub fn dismiss_all(&mut self) -> usize {
        let n = self.queue.len();
        self.queue.clear();
        gauge!("alerts_queue_len").set(0.0);
        n
    }

    /// Clear the queue and mute new alerts for the snooze duration.
    pub fn snooze(&mut self, now: Instant) {
        let cleared = self.dismiss_all();
        self.snooze.start(now);
        tracing::info!(target: "alerts", cleared, secs = self.cfg.snooze_secs, "alerts snoozed");
    }

    pub fn snooze_remaining(&self, now: Instant) -> Option<Duration> {
        self.snooze.remaining(now)
    }

    /// Forget the session: SeenSet, queue, snooze and id counter.
    pub fn reset_session(&mut self) {
        self.seen.clear();
        self.queue.clear();
        self.snooze.clear();
        self.next_id = 1;
        gauge!("alerts_queue_len").set(0.0);
    }

    pub fn has_seen(&self, ticker: &str) -> bool {
        self.seen.contains(ticker)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Live alerts, newest first. Alerts past their lifetime are hidden even if the
    /// sweep has not removed them yet.
    pub fn alerts(&self, now: Instant) -> impl Iterator<Item = &Alert> {
        let lifetime = self.cfg.lifetime();
        self.queue
            .iter()
            .filter(move |a| !a.is_expired(now, lifetime))
    }

    /// At most `display_cap` cards plus an overflow count, or everything when `expanded`.
    pub fn view(&self, now: Instant, expanded: bool) -> AlertView {
        let lifetime = self.cfg.lifetime();
        let live: Vec<&Alert> = self.alerts(now).collect();
        let cap = if expanded { live.len() } else { self.cfg.display_cap };
        let shown = live
            .iter()
            .take(cap)
            .map(|a| AlertCard {
                id: a.id,
                entity: a.entity.clone(),
                created_at: a.created_utc,
                remaining: a.remaining_fraction(now, lifetime),
            })
            .collect::<Vec<_>>();
        let remaining = self.snooze.remaining(now);
        AlertView {
            overflow: live.len() - shown.len(),
            shown,
            snoozed: remaining.is_some(),
            snooze_remaining_secs: remaining.map(|d| d.as_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movers(tickers: &[&str]) -> Vec<Entity> {
        tickers.iter().map(|t| Entity::new(*t, 5.0)).collect()
    }

    #[test]
    fn new_tickers_alert_once() {
        let mut d = ChangeDetector::new(AlertConfig::default());
        let t0 = Instant::now();
        let first = d.apply_snapshot(&movers(&["AAA", "BBB"]), t0);
        assert_eq!(first.created, vec![1, 2]);
        let second = d.apply_snapshot(&movers(&["AAA", "BBB", "CCC"]), t0);
        assert_eq!(second.created, vec![3]);
        // newest first, snapshot order within a tick
        let order: Vec<_> = d.alerts(t0).map(|a| a.entity.ticker.clone()).collect();
        assert_eq!(order, vec!["CCC", "AAA", "BBB"]);
        assert!(d.alerts(t0).all(|a| a.entity.first_seen));
    }

    #[test]
    fn duplicate_in_one_snapshot_alerts_once() {
        let mut d = ChangeDetector::new(AlertConfig::default());
        let out = d.apply_snapshot(&movers(&["AAA", "AAA"]), Instant::now());
        assert_eq!(out.created.len(), 1);
    }

    #[test]
    fn below_threshold_is_not_marked_seen() {
        let cfg = AlertConfig {
            min_move_pct: Some(5.0),
            ..AlertConfig::default()
        };
        let mut d = ChangeDetector::new(cfg);
        let t0 = Instant::now();
        d.apply_snapshot(&[Entity::new("AAA", 2.0)], t0);
        assert!(!d.has_seen("AAA"));
        let out = d.apply_snapshot(&[Entity::new("AAA", -6.0)], t0);
        assert_eq!(out.created.len(), 1);
    }

    #[test]
    fn view_caps_display_and_counts_overflow() {
        let mut d = ChangeDetector::new(AlertConfig::default());
        let t0 = Instant::now();
        d.apply_snapshot(&movers(&["A", "B", "C", "D", "E", "F", "G"]), t0);
        let v = d.view(t0, false);
        assert_eq!(v.shown.len(), 5);
        assert_eq!(v.overflow, 2);
        let all = d.view(t0, true);
        assert_eq!(all.shown.len(), 7);
        assert_eq!(all.overflow, 0);
    }

    #[test]
    fn dismiss_and_dismiss_all_keep_seen_set() {
        let mut d = ChangeDetector::new(AlertConfig::default());
        let t0 = Instant::now();
        d.apply_snapshot(&movers(&["A", "B"]), t0);
        let gone = d.dismiss(1).unwrap();
        assert!(gone.dismissed);
        assert!(d.dismiss(1).is_none());
        assert_eq!(d.dismiss_all(), 1);
        assert_eq!(d.seen_count(), 2);
        assert!(d.apply_snapshot(&movers(&["A", "B"]), t0).created.is_empty());
    }

    #[test]
    fn countdown_expires_and_hides() {
        let mut d = ChangeDetector::new(AlertConfig::default());
        let t0 = Instant::now();
        d.apply_snapshot(&movers(&["A"]), t0);
        let later = t0 + Duration::from_secs(12);
        assert_eq!(d.alerts(later).count(), 0);
        assert_eq!(d.queue_len(), 1);
        assert_eq!(d.expire(later), 1);
        assert_eq!(d.queue_len(), 0);
    }

    #[test]
    fn reset_session_allows_realert() {
        let mut d = ChangeDetector::new(AlertConfig::default());
        let t0 = Instant::now();
        d.apply_snapshot(&movers(&["A"]), t0);
        d.reset_session();
        let out = d.apply_snapshot(&movers(&["A"]), t0);
        assert_eq!(out.created, vec![1]);
    }
}
