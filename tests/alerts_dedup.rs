// tests/alerts_dedup.rs
use std::collections::HashSet;
use std::time::Duration;

use pulse_feeds::alerts::{AlertConfig, ChangeDetector};
use pulse_feeds::Entity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

fn movers(tickers: &[String]) -> Vec<Entity> {
    tickers.iter().map(|t| Entity::new(t.as_str(), 6.0)).collect()
}

fn names(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i}")).collect()
}

#[test]
fn random_tick_sequences_alert_each_ticker_once() {
    let pool = names("T", 40);
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..50 {
        let mut det = ChangeDetector::new(AlertConfig::default());
        let t0 = Instant::now();
        let mut seen: HashSet<String> = HashSet::new();
        let mut alerted: Vec<String> = Vec::new();

        for tick in 0..30u64 {
            let len = rng.random_range(0..12);
            let snapshot: Vec<String> = (0..len)
                .map(|_| pool[rng.random_range(0..pool.len())].clone())
                .collect();
            let before = det.seen_count();
            let out = det.apply_snapshot(&movers(&snapshot), t0 + Duration::from_secs(tick));

            let fresh: HashSet<&String> = snapshot.iter().filter(|t| !seen.contains(*t)).collect();
            assert_eq!(out.created.len(), fresh.len());
            assert_eq!(det.seen_count(), before + fresh.len());
            assert!(det.queue_len() <= 20);

            for t in &snapshot {
                if seen.insert(t.clone()) {
                    alerted.push(t.clone());
                }
            }
        }
        let unique: HashSet<&String> = alerted.iter().collect();
        assert_eq!(unique.len(), alerted.len());
    }
}

#[test]
fn queue_caps_at_twenty_dropping_the_oldest() {
    let mut det = ChangeDetector::new(AlertConfig::default());
    let t0 = Instant::now();

    let first = det.apply_snapshot(&movers(&names("A", 15)), t0);
    assert_eq!(first.evicted, 0);
    let second = det.apply_snapshot(&movers(&names("B", 10)), t0 + Duration::from_secs(1));
    assert_eq!(second.evicted, 5);
    assert_eq!(det.queue_len(), 20);

    let view = det.view(t0 + Duration::from_secs(1), true);
    let tickers: Vec<&str> = view.shown.iter().map(|c| c.entity.ticker.as_str()).collect();
    assert_eq!(tickers.len(), 20);
    assert_eq!(tickers[0], "B0");
    assert_eq!(tickers[9], "B9");
    assert_eq!(tickers[10], "A0");
    // A10..A14 were the oldest entries at the tail.
    assert!(!tickers.contains(&"A10"));
    assert!(!tickers.contains(&"A14"));
}

#[test]
fn display_cap_summarizes_overflow() {
    let mut det = ChangeDetector::new(AlertConfig::default());
    let t0 = Instant::now();
    det.apply_snapshot(&movers(&names("C", 8)), t0);

    let capped = det.view(t0, false);
    assert_eq!(capped.shown.len(), 5);
    assert_eq!(capped.overflow, 3);

    let full = det.view(t0, true);
    assert_eq!(full.shown.len(), 8);
    assert_eq!(full.overflow, 0);
}

#[test]
fn snooze_suppresses_without_touching_seen_set() {
    let mut det = ChangeDetector::new(AlertConfig::default());
    let t0 = Instant::now();
    det.apply_snapshot(&movers(&names("S", 3)), t0);
    det.snooze(t0);
    assert_eq!(det.queue_len(), 0);

    let during = det.apply_snapshot(&movers(&names("N", 4)), t0 + Duration::from_secs(60));
    assert!(during.snoozed);
    assert!(during.created.is_empty());
    assert_eq!(det.seen_count(), 3);
    assert!(!det.has_seen("N0"));
    assert!(det.view(t0 + Duration::from_secs(60), false).snoozed);

    // Still listed after the snooze window: alerts now, once.
    let after = det.apply_snapshot(&movers(&names("N", 4)), t0 + Duration::from_secs(601));
    assert!(!after.snoozed);
    assert_eq!(after.created.len(), 4);
    let again = det.apply_snapshot(&movers(&names("N", 4)), t0 + Duration::from_secs(631));
    assert!(again.created.is_empty());
}

#[test]
fn alerts_count_down_and_expire_after_lifetime() {
    let mut det = ChangeDetector::new(AlertConfig::default());
    let t0 = Instant::now();
    det.apply_snapshot(&movers(&names("E", 1)), t0);

    let mut last = f64::INFINITY;
    for ms in (0..12_000).step_by(500) {
        let view = det.view(t0 + Duration::from_millis(ms), false);
        let r = view.shown[0].remaining;
        assert!(r <= last, "remaining went up at {ms}ms");
        assert!((0.0..=1.0).contains(&r));
        last = r;
    }

    let at_end = t0 + Duration::from_secs(12);
    assert!(det.view(at_end, false).shown.is_empty());
    assert_eq!(det.expire(at_end), 1);
    assert_eq!(det.queue_len(), 0);
    assert!(det.has_seen("E0"));
}

#[test]
fn dismiss_all_keeps_tickers_suppressed() {
    let mut det = ChangeDetector::new(AlertConfig::default());
    let t0 = Instant::now();
    let out = det.apply_snapshot(&movers(&names("D", 2)), t0);
    assert!(det.dismiss(out.created[0]).is_some());
    assert!(det.dismiss(out.created[0]).is_none());
    assert_eq!(det.dismiss_all(), 1);

    let again = det.apply_snapshot(&movers(&names("D", 2)), t0 + Duration::from_secs(1));
    assert!(again.created.is_empty());
}
