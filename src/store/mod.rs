//! Persistence contracts used by the scheduler and delivery pipeline.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::diff::Cursor;
use crate::source::types::SourceConfig;

pub mod pg;
#[cfg(test)]
pub mod memory;

/// Per-source cursor and ever-delivered set. One writer per source at a time.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// `None` until the first successful poll of the source.
    async fn load(&self, source_id: i32) -> Result<Option<Cursor>>;
    async fn save(&self, source_id: i32, cursor: &Cursor) -> Result<()>;
    /// Idempotent: marking an identifier twice is a no-op.
    async fn mark_delivered(&self, source_id: i32, identifier: &str) -> Result<()>;
    async fn is_delivered(&self, source_id: i32, identifier: &str) -> Result<bool>;
    /// Subset of `identifiers` already delivered for the source.
    async fn delivered_among(&self, source_id: i32, identifiers: &[String]) -> Result<HashSet<String>>;
    /// Whether anything at all has been delivered for the source.
    async fn has_any_delivered(&self, source_id: i32) -> Result<bool>;
}

/// Source configuration as written by the `source` command.
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    async fn active_sources(&self) -> Result<Vec<SourceConfig>>;
}
