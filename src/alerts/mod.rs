// src/alerts/mod.rs
//! Movers alerts: session dedup, bounded toast queue, countdown, snooze.

pub mod detector;
pub mod service;
pub mod snooze;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::entity::Entity;

pub use detector::{AlertView, ChangeDetector, TickOutcome};
pub use service::AlertService;
pub use snooze::Snooze;

fn default_lifetime_secs() -> u64 {
    12
}
fn default_max_queue() -> usize {
    20
}
fn default_display_cap() -> usize {
    5
}
fn default_snooze_secs() -> u64 {
    600
}
fn default_countdown_ms() -> u64 {
    250
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_lifetime_secs")]
    pub lifetime_secs: u64,
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,
    #[serde(default = "default_display_cap")]
    pub display_cap: usize,
    #[serde(default = "default_snooze_secs")]
    pub snooze_secs: u64,
    /// Minimum absolute move (percent) for a mover to count as significant.
    #[serde(default)]
    pub min_move_pct: Option<f64>,
    /// Countdown sweep period.
    #[serde(default = "default_countdown_ms")]
    pub countdown_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: default_lifetime_secs(),
            max_queue: default_max_queue(),
            display_cap: default_display_cap(),
            snooze_secs: default_snooze_secs(),
            min_move_pct: None,
            countdown_ms: default_countdown_ms(),
        }
    }
}

impl AlertConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    pub fn snooze(&self) -> Duration {
        Duration::from_secs(self.snooze_secs)
    }

    pub fn countdown_period(&self) -> Duration {
        Duration::from_millis(self.countdown_ms.max(10))
    }

    /// Out-of-range values fall back to defaults.
    pub fn sanitized(mut self) -> Self {
        if self.lifetime_secs == 0 {
            self.lifetime_secs = default_lifetime_secs();
        }
        if self.max_queue == 0 {
            self.max_queue = default_max_queue();
        }
        if self.display_cap == 0 {
            self.display_cap = default_display_cap();
        }
        if self.min_move_pct.is_some_and(|v| !v.is_finite() || v < 0.0) {
            self.min_move_pct = None;
        }
        self
    }
}

/// A toast for one newly seen ticker.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: u64,
    pub entity: Entity,
    pub created_utc: DateTime<Utc>,
    pub dismissed: bool,
    #[serde(skip)]
    pub created_at: Instant,
}

impl Alert {
    /// Share of the lifetime still left, in `[0, 1]`, from elapsed wall-clock time.
    pub fn remaining_fraction(&self, now: Instant, lifetime: Duration) -> f64 {
        if lifetime.is_zero() {
            return 0.0;
        }
        let elapsed = now.saturating_duration_since(self.created_at);
        (1.0 - elapsed.as_secs_f64() / lifetime.as_secs_f64()).clamp(0.0, 1.0)
    }

    pub fn is_expired(&self, now: Instant, lifetime: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_fraction_decays_with_time() {
        let t0 = Instant::now();
        let a = Alert {
            id: 1,
            entity: Entity::new("NVDA", 6.0),
            created_utc: Utc::now(),
            dismissed: false,
            created_at: t0,
        };
        let life = Duration::from_secs(12);
        assert_eq!(a.remaining_fraction(t0, life), 1.0);
        assert!((a.remaining_fraction(t0 + Duration::from_secs(3), life) - 0.75).abs() < 1e-9);
        assert_eq!(a.remaining_fraction(t0 + Duration::from_secs(30), life), 0.0);
        assert!(a.is_expired(t0 + life, life));
        assert!(!a.is_expired(t0 + Duration::from_millis(11_999), life));
    }

    #[test]
    fn sanitize_rejects_negative_threshold() {
        let cfg = AlertConfig {
            min_move_pct: Some(-1.0),
            max_queue: 0,
            ..AlertConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.min_move_pct, None);
        assert_eq!(cfg.max_queue, 20);
    }
}
