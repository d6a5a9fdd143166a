// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod alerts;
pub mod api;
pub mod config;
pub mod correlation;
pub mod dashboard;
pub mod entity;
pub mod feeds;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod storage;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::dashboard::{Dashboard, ListQuery};
pub use crate::entity::Entity;
pub use crate::feeds::{Cadence, FeedRegistry, FeedSnapshot, ViewMode};
pub use crate::scheduler::{FeedScheduler, FeedUpdate};
