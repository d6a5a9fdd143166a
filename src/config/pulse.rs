// src/config/pulse.rs
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::alerts::AlertConfig;
use crate::feeds::{dashboard_registry, Cadence, FeedRegistry, ViewMode};

fn default_base_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}
fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_view() -> ViewMode {
    ViewMode::Momentum
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_request_timeout_secs() -> u64 {
    40
}

/// Per-feed tuning on top of the built-in dashboard feed set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedOverride {
    /// 0 turns the feed into manual-only.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub min_interval_secs: Option<u64>,
    #[serde(default)]
    pub stale_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Backend API root, e.g. `http://127.0.0.1:8000/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Global live cadence in seconds; unset means each feed's own interval.
    #[serde(default)]
    pub live_secs: Option<u64>,
    #[serde(default = "default_view")]
    pub initial_view: ViewMode,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Where search history and watchlist live.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub feeds: HashMap<String, FeedOverride>,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bind_addr: default_bind_addr(),
            live_secs: None,
            initial_view: default_view(),
            request_timeout_secs: default_request_timeout_secs(),
            data_dir: default_data_dir(),
            alerts: AlertConfig::default(),
            feeds: HashMap::new(),
        }
    }
}

impl PulseConfig {
    pub fn sanitized(mut self) -> Self {
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if self.base_url.is_empty() {
            self.base_url = default_base_url();
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        if self.live_secs == Some(0) {
            self.live_secs = None;
        }
        self.alerts = self.alerts.sanitized();
        self
    }

    pub fn cadence(&self) -> Cadence {
        match self.live_secs {
            Some(s) if s > 0 => Cadence::Live(Duration::from_secs(s)),
            _ => Cadence::Default,
        }
    }

    pub fn http_client(&self) -> anyhow::Result<Client> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .build()?)
    }

    /// Dashboard feeds against `base_url`, with per-feed overrides applied.
    /// Overrides naming unknown feeds are logged and ignored.
    pub fn registry(&self, client: &Client) -> FeedRegistry {
        let base = dashboard_registry(&self.base_url, client);
        for name in self.feeds.keys() {
            if base.get(name).is_none() {
                tracing::warn!(feed = %name, "config override for unknown feed ignored");
            }
        }
        base.iter()
            .cloned()
            .map(|mut d| {
                if let Some(o) = self.feeds.get(&d.name) {
                    if let Some(s) = o.interval_secs {
                        d.interval = Duration::from_secs(s);
                    }
                    if let Some(s) = o.min_interval_secs {
                        d.min_interval = Duration::from_secs(s);
                    }
                    if let Some(s) = o.stale_secs {
                        d.stale_after = Duration::from_secs(s);
                    }
                }
                d
            })
            .fold(FeedRegistry::new(), FeedRegistry::register)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::{NEWS, VWAP_MOMENTUM};

    #[test]
    fn overrides_apply_to_named_feeds() {
        let mut cfg = PulseConfig::default();
        cfg.feeds.insert(
            NEWS.into(),
            FeedOverride {
                interval_secs: Some(0),
                ..FeedOverride::default()
            },
        );
        cfg.feeds.insert(
            VWAP_MOMENTUM.into(),
            FeedOverride {
                min_interval_secs: Some(90),
                ..FeedOverride::default()
            },
        );
        let reg = cfg.registry(&Client::new());
        assert_eq!(reg.get(NEWS).unwrap().effective_interval(Cadence::Default), None);
        assert_eq!(
            reg.get(VWAP_MOMENTUM)
                .unwrap()
                .effective_interval(Cadence::Live(Duration::from_secs(5))),
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn zero_live_secs_means_default_cadence() {
        let cfg = PulseConfig {
            live_secs: Some(0),
            ..PulseConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.cadence(), Cadence::Default);
    }
}
