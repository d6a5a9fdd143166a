// src/storage.rs
//! Durable per-user lists: search history and watchlist, kept as small JSON files.
//! A missing or unreadable file loads as an empty list.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;

use crate::entity::normalize_ticker;

pub const SEARCH_HISTORY_CAP: usize = 10;

async fn read_list<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    match fs::read_to_string(path).await {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), "ignoring corrupt list file: {e}");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

async fn write_list<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create {}", dir.display()))?;
    }
    let body = serde_json::to_vec_pretty(items).context("serialize list")?;
    fs::write(path, body)
        .await
        .with_context(|| format!("write {}", path.display()))
}

/// Most-recent-first, de-duplicated, capped list of searched tickers.
#[derive(Debug, Clone)]
pub struct SearchHistory {
    path: PathBuf,
    cap: usize,
    items: Vec<String>,
}

impl SearchHistory {
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut items: Vec<String> = read_list(&path).await;
        items.truncate(SEARCH_HISTORY_CAP);
        Self {
            path,
            cap: SEARCH_HISTORY_CAP,
            items,
        }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Move `ticker` to the front, dropping the oldest beyond the cap.
    pub async fn add(&mut self, ticker: &str) -> Result<()> {
        let t = normalize_ticker(ticker);
        if t.is_empty() {
            return Ok(());
        }
        self.items.retain(|x| *x != t);
        self.items.insert(0, t);
        self.items.truncate(self.cap);
        write_list(&self.path, &self.items).await
    }

    pub async fn remove(&mut self, ticker: &str) -> Result<bool> {
        let t = normalize_ticker(ticker);
        let before = self.items.len();
        self.items.retain(|x| *x != t);
        let removed = self.items.len() != before;
        if removed {
            write_list(&self.path, &self.items).await?;
        }
        Ok(removed)
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.items.clear();
        write_list(&self.path, &self.items).await
    }
}

/// Ordered set of tickers the user follows.
#[derive(Debug, Clone)]
pub struct Watchlist {
    path: PathBuf,
    items: Vec<String>,
}

impl Watchlist {
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut items: Vec<String> = Vec::new();
        for t in read_list::<String>(&path).await {
            let t = normalize_ticker(&t);
            if !t.is_empty() && !items.contains(&t) {
                items.push(t);
            }
        }
        Self { path, items }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn contains(&self, ticker: &str) -> bool {
        let t = normalize_ticker(ticker);
        self.items.iter().any(|x| *x == t)
    }

    /// Returns false when the ticker was already listed.
    pub async fn add(&mut self, ticker: &str) -> Result<bool> {
        let t = normalize_ticker(ticker);
        if t.is_empty() || self.items.contains(&t) {
            return Ok(false);
        }
        self.items.push(t);
        write_list(&self.path, &self.items).await?;
        Ok(true)
    }

    pub async fn remove(&mut self, ticker: &str) -> Result<bool> {
        let t = normalize_ticker(ticker);
        let before = self.items.len();
        self.items.retain(|x| *x != t);
        let removed = self.items.len() != before;
        if removed {
            write_list(&self.path, &self.items).await?;
        }
        Ok(removed)
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.items.clear();
        write_list(&self.path, &self.items).await
    }
}
