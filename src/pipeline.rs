// src/pipeline.rs
//! Ranked filter/merge: the single ordered list a view renders.
//!
//! Order of rules:
//! 1. a searched entity (lookup by the user) is always included,
//! 2. the rest is dropped below the minimum score,
//! 3. then outside the recency window (recency-sensitive view only),
//! 4. then when it does not match the search string,
//! 5. searched entity first, the rest by descending score; ties keep input order.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::feeds::ViewMode;

/// Recency window for the recency-sensitive view.
pub const RECENCY_WINDOW: Duration = Duration::from_secs(3 * 3600);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// Free-text search; also the basis of the out-of-band searched entity.
    #[serde(default)]
    pub search: String,
    /// Minimum score; entities strictly below it are dropped.
    #[serde(default)]
    pub min_score: f64,
    #[serde(default = "default_recency_secs")]
    pub recency_secs: u64,
    pub view: ViewMode,
}

fn default_recency_secs() -> u64 {
    RECENCY_WINDOW.as_secs()
}

impl FilterState {
    pub fn new(view: ViewMode) -> Self {
        Self {
            search: String::new(),
            min_score: 0.0,
            recency_secs: default_recency_secs(),
            view,
        }
    }

    pub fn with_search(mut self, s: impl Into<String>) -> Self {
        self.search = s.into();
        self
    }

    pub fn with_min_score(mut self, min: f64) -> Self {
        self.min_score = min;
        self
    }

    pub fn recency(&self) -> Duration {
        Duration::from_secs(self.recency_secs)
    }

    fn within_recency(&self, e: &Entity, now: DateTime<Utc>) -> bool {
        if !self.view.is_recency_sensitive() {
            return true;
        }
        let Ok(window) = chrono::Duration::from_std(self.recency()) else {
            return true;
        };
        // undated rows cannot prove they are recent
        e.published_at.is_some_and(|ts| now - ts <= window)
    }
}

/// Produce the rendered list from the primary results and an optional searched entity.
pub fn merge_ranked(
    primary: &[Entity],
    searched: Option<&Entity>,
    state: &FilterState,
    now: DateTime<Utc>,
) -> Vec<Entity> {
    let needle = state.search.trim().to_lowercase();

    let mut rest: Vec<&Entity> = primary
        .iter()
        .filter(|e| !matches!(searched, Some(s) if s.ticker == e.ticker))
        .filter(|e| e.rank_score() >= state.min_score)
        .filter(|e| state.within_recency(e, now))
        .filter(|e| e.matches_lower(&needle))
        .collect();

    // sort_by is stable: equal scores keep their input order
    rest.sort_by(|a, b| b.rank_score().total_cmp(&a.rank_score()));

    searched
        .into_iter()
        .chain(rest)
        .cloned()
        .collect()
}
