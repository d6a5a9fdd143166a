use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::entity::{extract_entities, Entity};

/// Current state of one feed as seen by consumers. Always a full copy:
/// every refresh swaps the whole value, never a field at a time.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub feed: String,
    /// Last good payload; stays in place while refreshing and after failures.
    pub payload: Option<Value>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub loading: bool,
    pub error: bool,
}

impl FeedSnapshot {
    pub fn empty(feed: impl Into<String>) -> Self {
        Self {
            feed: feed.into(),
            payload: None,
            fetched_at: None,
            loading: false,
            error: false,
        }
    }

    /// Entities in the cached payload; empty when nothing has arrived yet.
    pub fn entities(&self) -> Vec<Entity> {
        self.payload
            .as_ref()
            .map(extract_entities)
            .unwrap_or_default()
    }
}
