// src/feeds/source.rs
use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;

/// One read-only backend endpoint. Every call returns the full current snapshot.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Value>;
    fn name(&self) -> &str;
}

/// GET `{base_url}{path}` and decode the body as JSON.
#[derive(Clone)]
pub struct HttpFeedSource {
    name: String,
    url: String,
    client: Client,
    /// Per-request timeout; the client's own timeout applies when unset.
    timeout: Option<Duration>,
}

impl HttpFeedSource {
    pub fn new(name: impl Into<String>, base_url: &str, path: &str, client: Client) -> Self {
        let url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Self {
            name: name.into(),
            url,
            client,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<Value> {
        let mut req = self.client.get(&self.url);
        if let Some(t) = self.timeout {
            req = req.timeout(t);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("fetch {}", self.url))?
            .error_for_status()
            .with_context(|| format!("{} non-2xx", self.url))?;
        let body = resp
            .text()
            .await
            .with_context(|| format!("read {} body", self.url))?;

        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        // A body we cannot parse counts as "no results", not as a failed fetch.
        match serde_json::from_str(trimmed) {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::debug!(target: "feeds", feed = %self.name, error = %e, "unparseable body");
                Ok(Value::Null)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory source serving a fixed payload, with scripted failures.
///
/// A test and demo fixture: integration tests and local runs drive the scheduler with it
/// when no backend is reachable. Production registries are built from [`HttpFeedSource`]
/// by `feeds::dashboard_registry`; nothing in the service wires this type in.
pub struct StaticSource {
    name: String,
    inner: Mutex<StaticInner>,
}

struct StaticInner {
    payload: Value,
    scripted: VecDeque<Option<Value>>,
    calls: usize,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(StaticInner {
                payload,
                scripted: VecDeque::new(),
                calls: 0,
            }),
        }
    }

    /// Replace the payload served from now on.
    pub fn set_payload(&self, payload: Value) {
        self.inner.lock().payload = payload;
    }

    /// The next call fails.
    pub fn fail_next(&self) {
        self.inner.lock().scripted.push_back(None);
    }

    /// The next call returns `payload` once, then falls back to the standing payload.
    pub fn respond_once(&self, payload: Value) {
        self.inner.lock().scripted.push_back(Some(payload));
    }

    pub fn calls(&self) -> usize {
        self.inner.lock().calls
    }
}

#[async_trait::async_trait]
impl FeedSource for StaticSource {
    async fn fetch(&self) -> Result<Value> {
        let mut inner = self.inner.lock();
        inner.calls += 1;
        match inner.scripted.pop_front() {
            Some(Some(v)) => Ok(v),
            Some(None) => anyhow::bail!("{}: scripted failure", self.name),
            None => Ok(inner.payload.clone()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn http_url_joins_cleanly() {
        let s = HttpFeedSource::new("m", "http://api:8000/api/", "/top-movers", Client::new());
        assert_eq!(s.url(), "http://api:8000/api/top-movers");
    }

    #[tokio::test]
    async fn static_source_scripts_failures() {
        let s = StaticSource::new("x", json!({"movers": []}));
        s.fail_next();
        assert!(s.fetch().await.is_err());
        assert_eq!(s.fetch().await.unwrap(), json!({"movers": []}));
        assert_eq!(s.calls(), 2);
    }
}
