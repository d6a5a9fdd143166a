//! # Dashboard
//! One instance of every component plus the background tasks that connect them.
//!
//! - the scheduler polls the feeds of the current view,
//! - the alert service follows the scheduler's movers snapshots,
//! - a correlation task rebuilds the scanner index whenever a scanner slot changes,
//! - search history and watchlist persist under the configured data directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::alerts::{AlertConfig, AlertService};
use crate::config::PulseConfig;
use crate::correlation::CorrelationIndex;
use crate::entity::{normalize_ticker, Entity};
use crate::feeds::{
    primary_feed, Cadence, FeedRegistry, FeedSnapshot, StockLookup, ViewMode, MOVERS,
    SCANNER_FEEDS,
};
use crate::pipeline::{merge_ranked, FilterState};
use crate::scheduler::FeedScheduler;
use crate::storage::{SearchHistory, Watchlist};

/// Parameters of one rendered list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// Feed to list; defaults to the view's primary feed.
    #[serde(default)]
    pub feed: Option<String>,
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub min_score: Option<f64>,
    /// Defaults to the dashboard's current view.
    #[serde(default)]
    pub view: Option<ViewMode>,
}

struct Storage {
    history: tokio::sync::Mutex<SearchHistory>,
    watchlist: tokio::sync::Mutex<Watchlist>,
}

pub struct Dashboard {
    scheduler: Arc<FeedScheduler>,
    alerts: AlertService,
    correlation: Arc<RwLock<CorrelationIndex>>,
    scanner_feeds: Arc<Vec<String>>,
    cadence: Cadence,
    lookup: Option<StockLookup>,
    storage: Option<Storage>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Dashboard {
    /// Bare dashboard: no stock lookup, no persisted lists.
    pub fn new(registry: FeedRegistry, view: ViewMode, alerts: AlertConfig) -> Self {
        let scanner_feeds = SCANNER_FEEDS
            .iter()
            .filter(|f| registry.get(f).is_some())
            .map(|f| f.to_string())
            .collect();
        Self {
            scheduler: Arc::new(FeedScheduler::new(registry, view)),
            alerts: AlertService::new(alerts),
            correlation: Arc::new(RwLock::new(CorrelationIndex::new())),
            scanner_feeds: Arc::new(scanner_feeds),
            cadence: Cadence::Default,
            lookup: None,
            storage: None,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub async fn from_config(cfg: &PulseConfig) -> Result<Self> {
        let client = cfg.http_client()?;
        let registry = cfg.registry(&client);
        let dash = Self::new(registry, cfg.initial_view, cfg.alerts.clone())
            .with_cadence(cfg.cadence())
            .with_lookup(StockLookup::new(cfg.base_url.clone(), client))
            .with_storage(&cfg.data_dir)
            .await;
        Ok(dash)
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_lookup(mut self, lookup: StockLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub async fn with_storage(mut self, dir: &Path) -> Self {
        self.storage = Some(Storage {
            history: tokio::sync::Mutex::new(
                SearchHistory::load(dir.join("search_history.json")).await,
            ),
            watchlist: tokio::sync::Mutex::new(Watchlist::load(dir.join("watchlist.json")).await),
        });
        self
    }

    /// Start polling, the movers watch and the correlation task. Needs a tokio runtime.
    pub fn start(&self) {
        self.scheduler.set_cadence(self.cadence);
        self.scheduler.start();

        if self.scheduler.registry().get(MOVERS).is_some() {
            self.alerts.start(self.scheduler.clone(), MOVERS);
        } else {
            tracing::warn!(target: "alerts", "no movers feed registered, alerts disabled");
        }

        self.tasks.lock().push(spawn_correlation_updater(
            self.scheduler.clone(),
            self.correlation.clone(),
            self.scanner_feeds.clone(),
        ));
        tracing::info!(
            view = %self.scheduler.view(),
            feeds = ?self.scheduler.active_feeds(),
            "dashboard started"
        );
    }

    pub fn shutdown(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        self.scheduler.shutdown();
        self.alerts.shutdown();
    }

    pub fn scheduler(&self) -> &FeedScheduler {
        &self.scheduler
    }

    pub fn alerts(&self) -> &AlertService {
        &self.alerts
    }

    pub fn view(&self) -> ViewMode {
        self.scheduler.view()
    }

    pub fn set_view(&self, view: ViewMode) {
        self.scheduler.set_view(view);
    }

    pub fn cadence(&self) -> Cadence {
        self.scheduler.cadence()
    }

    /// Switch live mode at runtime: `0` goes back to each feed's own interval.
    pub fn set_live_secs(&self, secs: u64) -> Cadence {
        let cadence = match secs {
            0 => Cadence::Default,
            s => Cadence::Live(Duration::from_secs(s)),
        };
        self.scheduler.set_cadence(cadence);
        cadence
    }

    pub fn snapshot(&self, feed: &str) -> Option<FeedSnapshot> {
        self.scheduler.snapshot(feed)
    }

    pub fn snapshots(&self) -> Vec<FeedSnapshot> {
        self.scheduler.snapshots()
    }

    /// False when no such feed is registered.
    pub fn refetch(&self, feed: &str) -> bool {
        self.scheduler.refetch(feed).is_some()
    }

    /// Fire one fetch per registered feed; returns how many were issued.
    pub fn refresh_all(&self) -> usize {
        self.scheduler.refetch_all().len()
    }

    pub fn scanner_feeds(&self) -> &[String] {
        &self.scanner_feeds
    }

    /// Rebuild the correlation index from the current scanner snapshots.
    pub fn rebuild_correlation(&self) {
        rebuild_correlation(&self.scheduler, &self.correlation, &self.scanner_feeds);
    }

    /// Other scanner feeds reporting `ticker`, excluding `feed` itself.
    pub fn correlation(&self, ticker: &str, feed: Option<&str>) -> Option<Vec<String>> {
        self.correlation.read().lookup(ticker, feed)
    }

    pub fn correlation_agreement(&self, ticker: &str) -> usize {
        self.correlation.read().agreement(ticker)
    }

    /// The ordered list a view renders, or `None` for an unknown feed.
    ///
    /// A non-empty search pins the searched ticker first: the backend lookup result
    /// when one is configured and knows the ticker, else the feed's own row for it.
    pub async fn list(&self, q: &ListQuery) -> Option<Vec<Entity>> {
        let view = q.view.unwrap_or_else(|| self.view());
        let feed = q.feed.as_deref().unwrap_or(primary_feed(view));
        let primary = self.scheduler.snapshot(feed)?.entities();

        let mut state = FilterState::new(view).with_search(q.search.clone());
        if let Some(min) = q.min_score {
            state = state.with_min_score(min);
        }

        let searched = self.searched_entity(&q.search, &primary).await;
        Some(merge_ranked(&primary, searched.as_ref(), &state, Utc::now()))
    }

    async fn searched_entity(&self, search: &str, primary: &[Entity]) -> Option<Entity> {
        let ticker = normalize_ticker(search);
        if ticker.is_empty() {
            return None;
        }
        let found = match &self.lookup {
            Some(lookup) => match lookup.lookup(&ticker).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(target: "feeds", %ticker, "stock lookup failed: {e:#}");
                    None
                }
            },
            None => None,
        }
        .or_else(|| primary.iter().find(|e| e.ticker == ticker).cloned())?;

        if let Err(e) = self.record_search(&found.ticker).await {
            tracing::warn!(ticker = %found.ticker, "search history not saved: {e:#}");
        }
        Some(found)
    }

    async fn record_search(&self, ticker: &str) -> Result<()> {
        match &self.storage {
            Some(s) => s.history.lock().await.add(ticker).await,
            None => Ok(()),
        }
    }

    pub async fn search_history(&self) -> Vec<String> {
        match &self.storage {
            Some(s) => s.history.lock().await.items().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn clear_search_history(&self) -> Result<()> {
        match &self.storage {
            Some(s) => s.history.lock().await.clear().await,
            None => Ok(()),
        }
    }

    pub async fn watchlist(&self) -> Vec<String> {
        match &self.storage {
            Some(s) => s.watchlist.lock().await.items().to_vec(),
            None => Vec::new(),
        }
    }

    /// Returns false when already watched or when no storage is configured.
    pub async fn watch(&self, ticker: &str) -> Result<bool> {
        match &self.storage {
            Some(s) => s.watchlist.lock().await.add(ticker).await,
            None => Ok(false),
        }
    }

    pub async fn unwatch(&self, ticker: &str) -> Result<bool> {
        match &self.storage {
            Some(s) => s.watchlist.lock().await.remove(ticker).await,
            None => Ok(false),
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

fn rebuild_correlation(
    scheduler: &FeedScheduler,
    index: &RwLock<CorrelationIndex>,
    scanners: &[String],
) {
    let labelled: Vec<(&str, Vec<Entity>)> = scanners
        .iter()
        .map(|f| (f.as_str(), scheduler.entities(f)))
        .collect();
    let fresh = CorrelationIndex::build(labelled.iter().map(|(f, es)| (*f, es.as_slice())));
    tracing::trace!(target: "feeds", entries = fresh.len(), "correlation rebuilt");
    *index.write() = fresh;
}

fn spawn_correlation_updater(
    scheduler: Arc<FeedScheduler>,
    index: Arc<RwLock<CorrelationIndex>>,
    scanners: Arc<Vec<String>>,
) -> JoinHandle<()> {
    let mut updates = scheduler.subscribe();
    tokio::spawn(async move {
        rebuild_correlation(&scheduler, &index, &scanners);
        loop {
            match updates.recv().await {
                Ok(u) if scanners.contains(&u.feed) => {
                    rebuild_correlation(&scheduler, &index, &scanners);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!(target: "feeds", skipped = n, "correlation updater lagged");
                    rebuild_correlation(&scheduler, &index, &scanners);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
