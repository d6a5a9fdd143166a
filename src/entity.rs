//! # Entities
//! A traded ticker as it appears inside a feed payload.
//!
//! Backend payloads are loosely shaped: each endpoint wraps its list under a
//! different key (`movers`, `stocks`, `opportunities`, ...) and individual rows
//! disagree on field names. Decoding here is tolerant: anything that does not
//! look like a list of tickers becomes an empty list, and rows that fail to
//! decode are skipped instead of failing the whole payload.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys under which backend endpoints wrap their result lists.
const LIST_KEYS: &[&str] = &[
    "movers",
    "stocks",
    "opportunities",
    "trending",
    "results",
    "items",
    "events",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Upper-cased ticker symbol.
    pub ticker: String,
    /// Percentage move for the session (e.g. `7.5` for +7.5%).
    #[serde(default)]
    pub change_pct: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    /// Ranking score; falls back to the percentage move when absent.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Set on the copy held by an alert: this was the first sighting in the session.
    #[serde(default)]
    pub first_seen: bool,
}

impl Entity {
    pub fn new(ticker: impl Into<String>, change_pct: f64) -> Self {
        Self {
            ticker: normalize_ticker(&ticker.into()),
            change_pct,
            price: None,
            volume: None,
            score: None,
            published_at: None,
            title: None,
            reason: None,
            first_seen: false,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_published_at(mut self, ts: DateTime<Utc>) -> Self {
        self.published_at = Some(ts);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Score used for thresholds and ordering.
    pub fn rank_score(&self) -> f64 {
        self.score.unwrap_or(self.change_pct)
    }

    /// Case-insensitive substring match over ticker, title and reason.
    /// `needle` must already be lowercase.
    pub fn matches_lower(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.ticker.to_lowercase().contains(needle)
            || self
                .title
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(needle))
            || self
                .reason
                .as_deref()
                .is_some_and(|r| r.to_lowercase().contains(needle))
    }
}

pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

// --- raw row as sent by the backend ---

#[derive(Debug, Deserialize)]
struct RawLive {
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    change_percent: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(alias = "symbol")]
    ticker: Option<String>,
    #[serde(default, alias = "price_change", alias = "change_pct")]
    change_percent: Option<f64>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default, alias = "score")]
    momentum_score: Option<f64>,
    #[serde(default, alias = "timestamp")]
    published_at: Option<Value>,
    #[serde(default, alias = "company_name")]
    title: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    /// News rows: comma-separated tickers the story mentions.
    #[serde(default)]
    tickers: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    drug_name: Option<String>,
    #[serde(default)]
    live_data: Option<RawLive>,
}

impl RawEntity {
    /// Tickers this row speaks for: its own `ticker`, else each entry of `tickers`.
    fn tickers(&self) -> Vec<String> {
        if let Some(t) = self.ticker.as_deref().map(normalize_ticker).filter(|t| !t.is_empty()) {
            return vec![t];
        }
        let mut out: Vec<String> = Vec::new();
        for t in self.tickers.as_deref().unwrap_or_default().split(',') {
            let t = normalize_ticker(t);
            if !t.is_empty() && !out.contains(&t) {
                out.push(t);
            }
        }
        out
    }

    /// One entity per ticker; a news story tagged with two tickers lists under both.
    fn into_entities(self) -> Vec<Entity> {
        let tickers = self.tickers();
        if tickers.is_empty() {
            return Vec::new();
        }
        let live = self.live_data;
        let template = Entity {
            ticker: String::new(),
            change_pct: self
                .change_percent
                .or_else(|| live.as_ref().and_then(|l| l.change_percent))
                .unwrap_or(0.0),
            price: self.price.or_else(|| live.as_ref().and_then(|l| l.price)),
            volume: self.volume.or_else(|| live.as_ref().and_then(|l| l.volume)),
            score: self.momentum_score,
            published_at: self.published_at.as_ref().and_then(parse_timestamp),
            title: self.title,
            reason: self.reason.or(self.drug_name).or(self.summary),
            first_seen: false,
        };
        tickers
            .into_iter()
            .map(|ticker| Entity {
                ticker,
                ..template.clone()
            })
            .collect()
    }
}

/// RFC 3339, naive ISO 8601 (taken as UTC) or unix seconds.
fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|n| n.and_utc())
            }),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

fn list_of(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(map) => {
            if let Some(items) = LIST_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_array))
            {
                return Some(items);
            }
            // `{ "data": ... }` wrapper
            map.get("data").and_then(list_of)
        }
        _ => None,
    }
}

/// Decode every row of a feed payload that carries a ticker.
/// Malformed or empty payloads yield an empty list.
pub fn extract_entities(payload: &Value) -> Vec<Entity> {
    let Some(items) = list_of(payload) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|row| serde_json::from_value::<RawEntity>(row.clone()).ok())
        .flat_map(RawEntity::into_entities)
        .collect()
}

/// Decode a single-entity lookup payload (e.g. `/stock/{ticker}`).
pub fn extract_single(payload: &Value) -> Option<Entity> {
    if payload.get("error").is_some() {
        return None;
    }
    serde_json::from_value::<RawEntity>(payload.clone())
        .ok()
        .and_then(|raw| raw.into_entities().into_iter().next())
}
