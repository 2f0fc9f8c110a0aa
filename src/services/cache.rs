//! Time-bounded cache for raw fetch and rating results
//!
//! Keyed by (source, title, year) so repeated discovery/sync runs within a
//! short window avoid redundant network calls. This is the only state shared
//! across calls; the `RwLock` guarantees readers never observe a
//! partially-written entry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: String,
    pub title: String,
    pub year: Option<i32>,
}

impl CacheKey {
    /// Key for a whole-page fetch, where no single title applies.
    pub fn for_source(source: &str) -> Self {
        Self {
            source: source.to_string(),
            title: String::new(),
            year: None,
        }
    }

    pub fn for_title(source: &str, title: &str, year: Option<i32>) -> Self {
        Self {
            source: source.to_string(),
            title: title.to_lowercase(),
            year,
        }
    }
}

struct CacheEntry {
    payload: String,
    inserted_at: Instant,
}

/// Concurrent TTL cache for raw (pre-parse) payloads.
pub struct FetchCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl FetchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached payload if present and not expired.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        debug!(source = %key.source, title = %key.title, "cache hit");
        Some(entry.payload.clone())
    }

    pub fn insert(&self, key: CacheKey, payload: String) {
        let mut entries = self.entries.write();
        // Opportunistic cleanup keeps the map bounded between runs.
        entries.retain(|_, e| e.inserted_at.elapsed() <= self.ttl);
        entries.insert(
            key,
            CacheEntry {
                payload,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let cache = FetchCache::new(Duration::from_secs(60));
        let key = CacheKey::for_title("radarr", "Weapons", Some(2025));
        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), "payload".to_string());
        assert_eq!(cache.get(&key).as_deref(), Some("payload"));
    }

    #[test]
    fn test_expiry() {
        let cache = FetchCache::new(Duration::from_millis(0));
        let key = CacheKey::for_source("rt_theaters");
        cache.insert(key.clone(), "stale".to_string());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_title_case_insensitive() {
        let a = CacheKey::for_title("radarr", "Weapons", Some(2025));
        let b = CacheKey::for_title("radarr", "WEAPONS", Some(2025));
        assert_eq!(a, b);
    }
}
