//! Chat reply cache with TTL expiry and LRU eviction.
//!
//! Cache key is the normalized query text (trimmed, lowercased). Entries
//! expire a fixed TTL after they were written. Expired entries are treated
//! as absent on lookup; on insert they are swept, and if the store is still
//! at capacity the least recently accessed entry is evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use super::clock::{Clock, SystemClock};
use crate::utils::sanitize::truncate_chars;

/// A single cached reply.
#[derive(Debug, Clone)]
struct CacheEntry {
    reply: String,
    expires_at: Instant,
    accessed_at: Instant,
    hit_count: u32,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Thread-safe reply cache, shared between concurrent requests.
///
/// The lock is only held for map operations, never across an `.await`.
/// Two requests resolving the same key concurrently both write; the last
/// write wins.
pub struct ResponseCache {
    store: Mutex<CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_entries: usize,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .field("len", &self.len())
            .finish()
    }
}

impl ResponseCache {
    /// Create a cache on the system clock.
    ///
    /// `max_entries` is clamped to a minimum of 1.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self::with_clock(ttl, max_entries, Arc::new(SystemClock))
    }

    /// Create a cache driven by an explicit clock.
    pub fn with_clock(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(CacheStore::default()),
            clock,
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Normalize a user query into a cache key: trimmed and case-folded.
    pub fn normalize_key(query: &str) -> String {
        query.trim().to_lowercase()
    }

    /// Look up a live reply. Returns `None` if the key is absent or expired.
    ///
    /// An expired entry is removed on the way out.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let mut store = self.lock();
        let live = store.entries.get(key).map(|e| e.is_live(now));
        match live {
            Some(true) => {
                store.hits += 1;
                let entry = store.entries.get_mut(key)?;
                entry.accessed_at = now;
                entry.hit_count = entry.hit_count.saturating_add(1);
                Some(entry.reply.clone())
            }
            Some(false) => {
                debug!(key = %truncate_chars(key, 32), "Cache entry expired, removing");
                store.entries.remove(key);
                store.misses += 1;
                None
            }
            None => {
                store.misses += 1;
                None
            }
        }
    }

    /// Store a reply that stays live for the configured TTL.
    ///
    /// Overwrites any existing entry for `key`. When inserting a new key into
    /// a full store, expired entries are swept first, then LRU entries.
    pub fn put(&self, key: String, reply: String) {
        let now = self.clock.now();
        let ttl = self.ttl;
        let max_entries = self.max_entries;
        let mut store = self.lock();

        if !store.entries.contains_key(&key) && store.entries.len() >= max_entries {
            store.entries.retain(|_, e| e.is_live(now));
            while store.entries.len() >= max_entries {
                if !Self::evict_lru(&mut store) {
                    break;
                }
            }
        }

        store.entries.insert(
            key,
            CacheEntry {
                reply,
                expires_at: now + ttl,
                accessed_at: now,
                hit_count: 0,
            },
        );
    }

    /// Return aggregate statistics about the cache.
    pub fn stats(&self) -> CacheStats {
        let store = self.lock();
        CacheStats {
            total_entries: store.entries.len(),
            hits: store.hits,
            misses: store.misses,
        }
    }

    /// Remove all entries from the cache. Counters are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Return the number of entries currently stored, live or expired.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Return `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Configured time-to-live for new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // -- private helpers ---------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, CacheStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict_lru(store: &mut CacheStore) -> bool {
        let lru_key = store
            .entries
            .iter()
            .min_by_key(|(_, e)| e.accessed_at)
            .map(|(k, _)| k.clone());
        match lru_key {
            Some(key) => {
                debug!(key = %truncate_chars(&key, 32), "Evicting LRU cache entry");
                store.entries.remove(&key);
                true
            }
            None => false,
        }
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Number of entries currently stored.
    pub total_entries: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing live.
    pub misses: u64,
}
