use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{CursorStore, SourceRegistry};
use crate::diff::Cursor;
use crate::source::types::SourceConfig;

/// In-process store for pipeline and scheduler tests.
#[derive(Default)]
pub struct MemoryStore {
    sources: Mutex<Vec<SourceConfig>>,
    cursors: Mutex<HashMap<i32, Cursor>>,
    delivered: Mutex<HashMap<i32, HashSet<String>>>,
    /// Sources whose cursor load fails, to exercise isolation.
    broken: Mutex<HashSet<i32>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_sources(sources: Vec<SourceConfig>) -> Self {
        let store = Self::default();
        *store.sources.lock().unwrap() = sources;
        store
    }

    pub fn set_sources(&self, sources: Vec<SourceConfig>) {
        *self.sources.lock().unwrap() = sources;
    }

    pub fn break_source(&self, source_id: i32) {
        self.broken.lock().unwrap().insert(source_id);
    }

    pub fn cursor(&self, source_id: i32) -> Option<Cursor> {
        self.cursors.lock().unwrap().get(&source_id).cloned()
    }

    pub fn delivered(&self, source_id: i32) -> HashSet<String> {
        self.delivered.lock().unwrap().get(&source_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn load(&self, source_id: i32) -> Result<Option<Cursor>> {
        if self.broken.lock().unwrap().contains(&source_id) {
            bail!("store unavailable for source {source_id}");
        }
        Ok(self.cursors.lock().unwrap().get(&source_id).cloned())
    }

    async fn save(&self, source_id: i32, cursor: &Cursor) -> Result<()> {
        self.cursors.lock().unwrap().insert(source_id, cursor.clone());
        Ok(())
    }

    async fn mark_delivered(&self, source_id: i32, identifier: &str) -> Result<()> {
        self.delivered.lock().unwrap().entry(source_id).or_default().insert(identifier.to_string());
        Ok(())
    }

    async fn is_delivered(&self, source_id: i32, identifier: &str) -> Result<bool> {
        Ok(self.delivered.lock().unwrap().get(&source_id).is_some_and(|s| s.contains(identifier)))
    }

    async fn delivered_among(&self, source_id: i32, identifiers: &[String]) -> Result<HashSet<String>> {
        let guard = self.delivered.lock().unwrap();
        let Some(set) = guard.get(&source_id) else { return Ok(HashSet::new()) };
        Ok(identifiers.iter().filter(|id| set.contains(*id)).cloned().collect())
    }

    async fn has_any_delivered(&self, source_id: i32) -> Result<bool> {
        Ok(self.delivered.lock().unwrap().get(&source_id).is_some_and(|s| !s.is_empty()))
    }
}

#[async_trait]
impl SourceRegistry for MemoryStore {
    async fn active_sources(&self) -> Result<Vec<SourceConfig>> {
        Ok(self.sources.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_delivered_is_idempotent() {
        let store = MemoryStore::new();
        store.mark_delivered(1, "/a").await.unwrap();
        store.mark_delivered(1, "/a").await.unwrap();
        assert!(store.is_delivered(1, "/a").await.unwrap());
        assert!(!store.is_delivered(2, "/a").await.unwrap());
        assert_eq!(store.delivered(1).len(), 1);
    }

    #[tokio::test]
    async fn delivered_among_filters_to_known() {
        let store = MemoryStore::new();
        store.mark_delivered(1, "/b").await.unwrap();
        let ids = vec!["/a".to_string(), "/b".to_string()];
        let known = store.delivered_among(1, &ids).await.unwrap();
        assert_eq!(known, HashSet::from(["/b".to_string()]));
    }

    #[tokio::test]
    async fn has_any_delivered_is_per_source() {
        let store = MemoryStore::new();
        assert!(!store.has_any_delivered(1).await.unwrap());
        store.mark_delivered(1, "/a").await.unwrap();
        assert!(store.has_any_delivered(1).await.unwrap());
        assert!(!store.has_any_delivered(2).await.unwrap());
    }
}
