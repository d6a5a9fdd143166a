// src/feeds/registry.rs
//! Feed descriptors: which feeds exist, how often they refresh, when they are live.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::source::FeedSource;

/// Floor for screener-style feeds whose backend response is itself cached for a minute.
pub const SCREENER_FLOOR: Duration = Duration::from_secs(60);
/// Floor for catalyst feeds (FDA calendar and friends), cached longer upstream.
pub const CATALYST_FLOOR: Duration = Duration::from_secs(120);

/// Dashboard views. Exactly one (`News`) is recency-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    Momentum,
    Scanner,
    Social,
    Catalyst,
    News,
}

impl ViewMode {
    pub const ALL: [ViewMode; 5] = [
        ViewMode::Momentum,
        ViewMode::Scanner,
        ViewMode::Social,
        ViewMode::Catalyst,
        ViewMode::News,
    ];

    pub fn is_recency_sensitive(self) -> bool {
        matches!(self, ViewMode::News)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Momentum => "momentum",
            ViewMode::Scanner => "scanner",
            ViewMode::Social => "social",
            ViewMode::Catalyst => "catalyst",
            ViewMode::News => "news",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ViewMode::ALL
            .into_iter()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| anyhow::anyhow!("unknown view mode: {s}"))
    }
}

/// When a feed should be polled in the background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Always,
    Views(Vec<ViewMode>),
}

impl Activation {
    pub fn is_active(&self, view: ViewMode) -> bool {
        match self {
            Activation::Always => true,
            Activation::Views(vs) => vs.contains(&view),
        }
    }
}

/// Global refresh cadence selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cadence {
    /// Each feed uses its own configured interval.
    #[default]
    Default,
    /// Tightened "live" mode: every polled feed uses this interval, subject to floors.
    Live(Duration),
}

#[derive(Clone)]
pub struct FeedDescriptor {
    pub name: String,
    pub source: Arc<dyn FeedSource>,
    pub activation: Activation,
    /// `Duration::ZERO` means manual refresh only.
    pub interval: Duration,
    /// Minimum polling interval for heavy feeds; `Duration::ZERO` for light ones.
    pub min_interval: Duration,
    /// Cached payload younger than this is not refetched on (re)activation.
    pub stale_after: Duration,
}

impl fmt::Debug for FeedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedDescriptor")
            .field("name", &self.name)
            .field("source", &self.source.name())
            .field("activation", &self.activation)
            .field("interval", &self.interval)
            .field("min_interval", &self.min_interval)
            .field("stale_after", &self.stale_after)
            .finish()
    }
}

impl FeedDescriptor {
    pub fn new(name: impl Into<String>, source: Arc<dyn FeedSource>) -> Self {
        Self {
            name: name.into(),
            source,
            activation: Activation::Always,
            interval: Duration::from_secs(30),
            min_interval: Duration::ZERO,
            stale_after: Duration::ZERO,
        }
    }

    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn manual(mut self) -> Self {
        self.interval = Duration::ZERO;
        self
    }

    pub fn heavy(mut self, floor: Duration) -> Self {
        self.min_interval = floor;
        self
    }

    pub fn active_in(mut self, views: &[ViewMode]) -> Self {
        self.activation = Activation::Views(views.to_vec());
        self
    }

    pub fn stale_after(mut self, d: Duration) -> Self {
        self.stale_after = d;
        self
    }

    pub fn is_heavy(&self) -> bool {
        !self.min_interval.is_zero()
    }

    /// Polling period under `cadence`, or `None` for manual-only feeds.
    /// A heavy feed never goes below its floor, whatever the cadence says.
    pub fn effective_interval(&self, cadence: Cadence) -> Option<Duration> {
        if self.interval.is_zero() {
            return None;
        }
        let base = match cadence {
            Cadence::Default => self.interval,
            Cadence::Live(d) if d.is_zero() => self.interval,
            Cadence::Live(d) => d,
        };
        Some(base.max(self.min_interval))
    }
}

/// Immutable set of descriptors for one view session, kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    feeds: Vec<FeedDescriptor>,
    by_name: HashMap<String, usize>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. A later registration with the same name replaces the earlier one.
    pub fn register(mut self, desc: FeedDescriptor) -> Self {
        match self.by_name.get(&desc.name) {
            Some(&idx) => self.feeds[idx] = desc,
            None => {
                self.by_name.insert(desc.name.clone(), self.feeds.len());
                self.feeds.push(desc);
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FeedDescriptor> {
        self.by_name.get(name).map(|&i| &self.feeds[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedDescriptor> {
        self.feeds.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.feeds.iter().map(|d| d.name.clone()).collect()
    }

    pub fn active_in(&self, view: ViewMode) -> impl Iterator<Item = &FeedDescriptor> {
        self.feeds
            .iter()
            .filter(move |d| d.activation.is_active(view))
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::source::StaticSource;
    use serde_json::json;

    fn src() -> Arc<dyn FeedSource> {
        Arc::new(StaticSource::new("t", json!([])))
    }

    #[test]
    fn heavy_floor_beats_live_cadence() {
        let light = FeedDescriptor::new("a", src()).every(Duration::from_secs(10));
        let heavy = FeedDescriptor::new("b", src())
            .every(Duration::from_secs(120))
            .heavy(CATALYST_FLOOR);
        let live = Cadence::Live(Duration::from_secs(5));

        assert_eq!(light.effective_interval(live), Some(Duration::from_secs(5)));
        assert_eq!(heavy.effective_interval(live), Some(Duration::from_secs(120)));
        assert_eq!(
            heavy.effective_interval(Cadence::Default),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn manual_feeds_have_no_interval() {
        let d = FeedDescriptor::new("lookup", src()).manual();
        assert_eq!(d.effective_interval(Cadence::Live(Duration::from_secs(5))), None);
    }

    #[test]
    fn activation_by_view() {
        let d = FeedDescriptor::new("news", src()).active_in(&[ViewMode::News]);
        assert!(d.activation.is_active(ViewMode::News));
        assert!(!d.activation.is_active(ViewMode::Momentum));
    }

    #[test]
    fn register_replaces_same_name() {
        let reg = FeedRegistry::new()
            .register(FeedDescriptor::new("a", src()).every(Duration::from_secs(10)))
            .register(FeedDescriptor::new("a", src()).every(Duration::from_secs(20)));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("a").unwrap().interval, Duration::from_secs(20));
    }

    #[test]
    fn view_mode_parses_case_insensitive() {
        assert_eq!("NEWS".parse::<ViewMode>().unwrap(), ViewMode::News);
        assert!("charts".parse::<ViewMode>().is_err());
    }
}
