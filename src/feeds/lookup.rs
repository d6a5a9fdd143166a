// src/feeds/lookup.rs
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;

use super::source::{FeedSource, HttpFeedSource};
use crate::entity::{extract_single, normalize_ticker, Entity};

/// Single-entity lookup (`/stock/{ticker}`), fetched on demand when the user searches.
#[derive(Clone)]
pub struct StockLookup {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl StockLookup {
    pub fn new(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            timeout: Duration::from_secs(10),
        }
    }

    /// `Ok(None)` when the backend does not know the ticker.
    pub async fn lookup(&self, ticker: &str) -> Result<Option<Entity>> {
        let t = normalize_ticker(ticker);
        if t.is_empty() || !t.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
            return Ok(None);
        }
        let source = HttpFeedSource::new(
            format!("stock:{t}"),
            &self.base_url,
            &format!("/stock/{t}"),
            self.client.clone(),
        )
        .with_timeout(self.timeout);
        let payload = source.fetch().await?;
        Ok(extract_single(&payload))
    }
}
