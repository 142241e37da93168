//! TTL-memoized result cache for the full export.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::export::ExportAllPage;

/// Memoizes export-all pages keyed by (page, size) — the dump has no filters,
/// so pagination is the whole key.
///
/// Writes elsewhere in the system do NOT invalidate entries; staleness is
/// bounded only by the TTL, and the export endpoint advertises that bound via
/// cache-control. Two concurrent misses for the same key may both compute and
/// overwrite, which is harmless for an idempotent read.
pub struct ExportCache {
    ttl: Duration,
    entries: RwLock<HashMap<(i64, i64), CacheEntry>>,
}

struct CacheEntry {
    payload: ExportAllPage,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

impl ExportCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached page for (page, size), evicting it when expired.
    pub async fn get(&self, page: i64, size: i64) -> Option<ExportAllPage> {
        let mut entries = self.entries.write().await;
        match entries.get(&(page, size)) {
            Some(entry) if entry.is_expired(self.ttl) => {
                entries.remove(&(page, size));
                None
            }
            Some(entry) => Some(entry.payload.clone()),
            None => None,
        }
    }

    /// Stores a page unless it is empty: an empty page must be recomputed on
    /// the next call, not pinned as "forever empty".
    pub async fn insert(&self, page: i64, size: i64, payload: &ExportAllPage) {
        if payload.translations.is_empty() {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.insert(
            (page, size),
            CacheEntry {
                payload: payload.clone(),
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
