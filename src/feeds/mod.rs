// src/feeds/mod.rs
pub mod lookup;
pub mod registry;
pub mod snapshot;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

pub use registry::{
    Activation, Cadence, FeedDescriptor, FeedRegistry, ViewMode, CATALYST_FLOOR, SCREENER_FLOOR,
};
pub use lookup::StockLookup;
pub use snapshot::FeedSnapshot;
pub use source::{FeedSource, HttpFeedSource, StaticSource};

// Feed names used across the dashboard.
pub const MOVERS: &str = "movers";
pub const MARKET_PULSE: &str = "market_pulse";
pub const MOMENTUM_SCANNER: &str = "momentum_scanner";
pub const VWAP_MOMENTUM: &str = "vwap_momentum";
pub const SOCIAL_TRENDING: &str = "social_trending";
pub const FDA_CATALYST: &str = "fda_catalyst";
pub const NEWS: &str = "news";

/// Scanner feeds whose agreement is tracked by the correlation index.
pub const SCANNER_FEEDS: &[&str] = &[MARKET_PULSE, MOMENTUM_SCANNER, VWAP_MOMENTUM, SOCIAL_TRENDING];

/// Feed whose entities a view lists by default.
pub fn primary_feed(view: ViewMode) -> &'static str {
    match view {
        ViewMode::Momentum => MARKET_PULSE,
        ViewMode::Scanner => MOMENTUM_SCANNER,
        ViewMode::Social => SOCIAL_TRENDING,
        ViewMode::Catalyst => FDA_CATALYST,
        ViewMode::News => NEWS,
    }
}

/// The stock dashboard feed set against one backend.
///
/// | feed | endpoint | interval | floor |
/// |---|---|---|---|
/// | movers | `/top-movers` | 30s | - |
/// | market_pulse | `/momentum/market-pulse` | 30s | - |
/// | momentum_scanner | `/momentum/scanner` | 30s | - |
/// | vwap_momentum | `/screener/vwap-momentum` | 60s | 60s |
/// | social_trending | `/trending/social` | 60s | - |
/// | fda_catalyst | `/catalyst/fda` | 120s | 120s |
/// | news | `/news` | 60s | - |
pub fn dashboard_registry(base_url: &str, client: &Client) -> FeedRegistry {
    let http = |name: &str, path: &str| -> Arc<dyn FeedSource> {
        Arc::new(HttpFeedSource::new(name, base_url, path, client.clone()))
    };
    let secs = Duration::from_secs;

    FeedRegistry::new()
        .register(
            FeedDescriptor::new(MOVERS, http(MOVERS, "/top-movers"))
                .every(secs(30))
                .stale_after(secs(15)),
        )
        .register(
            FeedDescriptor::new(MARKET_PULSE, http(MARKET_PULSE, "/momentum/market-pulse"))
                .every(secs(30))
                .active_in(&[ViewMode::Momentum, ViewMode::Scanner])
                .stale_after(secs(15)),
        )
        .register(
            FeedDescriptor::new(MOMENTUM_SCANNER, http(MOMENTUM_SCANNER, "/momentum/scanner"))
                .every(secs(30))
                .active_in(&[ViewMode::Momentum, ViewMode::Scanner])
                .stale_after(secs(15)),
        )
        .register(
            FeedDescriptor::new(VWAP_MOMENTUM, http(VWAP_MOMENTUM, "/screener/vwap-momentum"))
                .every(secs(60))
                .heavy(SCREENER_FLOOR)
                .active_in(&[ViewMode::Scanner])
                .stale_after(secs(60)),
        )
        .register(
            FeedDescriptor::new(SOCIAL_TRENDING, http(SOCIAL_TRENDING, "/trending/social"))
                .every(secs(60))
                .active_in(&[ViewMode::Social, ViewMode::Scanner])
                .stale_after(secs(30)),
        )
        .register(
            FeedDescriptor::new(FDA_CATALYST, http(FDA_CATALYST, "/catalyst/fda"))
                .every(secs(120))
                .heavy(CATALYST_FLOOR)
                .active_in(&[ViewMode::Catalyst])
                .stale_after(secs(300)),
        )
        .register(
            FeedDescriptor::new(NEWS, http(NEWS, "/news"))
                .every(secs(60))
                .active_in(&[ViewMode::News])
                .stale_after(secs(30)),
        )
}
