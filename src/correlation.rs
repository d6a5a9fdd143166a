//! # Cross-feed correlation
//! Reverse index from ticker to the scanner feeds currently reporting it.
//!
//! The index is rebuilt from scratch on every call to [`CorrelationIndex::rebuild`];
//! nothing carries over between rebuilds. Tickers seen by a single feed are pruned,
//! so a lookup hit always means at least two scanners agree.

use std::collections::HashMap;

use metrics::gauge;
use serde::Serialize;

use crate::entity::{normalize_ticker, Entity};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CorrelationIndex {
    /// ticker -> feed labels in discovery order
    entries: HashMap<String, Vec<String>>,
}

impl CorrelationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from labelled snapshots.
    pub fn build<'a, I>(feeds: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [Entity])>,
    {
        let mut idx = Self::new();
        idx.rebuild(feeds);
        idx
    }

    /// Discard everything and index the given snapshots.
    pub fn rebuild<'a, I>(&mut self, feeds: I)
    where
        I: IntoIterator<Item = (&'a str, &'a [Entity])>,
    {
        let mut all: HashMap<String, Vec<String>> = HashMap::new();
        for (label, entities) in feeds {
            for e in entities {
                let labels = all.entry(e.ticker.clone()).or_default();
                // a feed listing the same ticker twice still counts once
                if !labels.iter().any(|l| l == label) {
                    labels.push(label.to_string());
                }
            }
        }
        all.retain(|_, labels| labels.len() >= 2);
        gauge!("correlation_entries").set(all.len() as f64);
        self.entries = all;
    }

    /// Labels of the *other* feeds reporting `ticker`, or `None` without multi-feed
    /// agreement. `self_label` is the feed the caller is displaying, if any.
    pub fn lookup(&self, ticker: &str, self_label: Option<&str>) -> Option<Vec<String>> {
        let labels = self.entries.get(&normalize_ticker(ticker))?;
        Some(
            labels
                .iter()
                .filter(|l| Some(l.as_str()) != self_label)
                .cloned()
                .collect(),
        )
    }

    /// Number of feeds agreeing on `ticker` (0 when not indexed).
    pub fn agreement(&self, ticker: &str) -> usize {
        self.entries
            .get(&normalize_ticker(ticker))
            .map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tickers with their labels, highest agreement first, then alphabetical.
    pub fn ranked(&self) -> Vec<(String, Vec<String>)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .map(|(t, l)| (t.clone(), l.clone()))
            .collect();
        out.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));
        out
    }
}
