// src/alerts/snooze.rs
use std::time::Duration;

use tokio::time::Instant;

/// Fixed-length mute window for the alert queue.
/// - Starting it again while active restarts the window.
/// - There is no early cancel; the window simply runs out.
/// - State is re-evaluated lazily: callers ask `is_active(now)` at the start of each tick.
#[derive(Debug, Clone)]
pub struct Snooze {
    duration: Duration,
    until: Option<Instant>,
}

impl Snooze {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            until: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.until = Some(now + self.duration);
    }

    /// True while muted. Clears the window once it has run out.
    pub fn is_active(&mut self, now: Instant) -> bool {
        match self.until {
            Some(until) if now < until => true,
            Some(_) => {
                self.until = None;
                tracing::info!(target: "alerts", "snooze ended");
                false
            }
            None => false,
        }
    }

    /// Time left, without mutating state.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    pub fn clear(&mut self) {
        self.until = None;
    }
}
