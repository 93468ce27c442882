//! Generic TTL cache, shared by the alias overlay (C1), the cross-encoder score
//! cache (C4), the live-state cache (C2) and the enriched-context cache (C10).
//!
//! Keeps per-entry expiry and a bounded size with simple eviction of the oldest
//! entry once `max_entries` is exceeded, the same shape as a read-mostly cache
//! that "must tolerate concurrent reads and writes with per-entry atomicity"
//! (`spec.md §5`).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::hash::Hash;
use std::time::Duration;

struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
    inserted_at: DateTime<Utc>,
}

/// A bounded, per-entry-expiring cache keyed by `K`.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache with a default per-entry TTL and a maximum entry count.
    #[must_use]
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self { entries: DashMap::new(), default_ttl, max_entries }
    }

    /// Insert or overwrite `key` with `value`, expiring after the default TTL.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Insert or overwrite `key` with `value`, expiring after `ttl`.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_oldest();
        }
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(300));
        self.entries.insert(key, Entry { value, expires_at, inserted_at: now });
    }

    /// Fetch `key`'s value if present and not expired.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.expires_at < Utc::now() {
            drop(entry);
            self.entries.remove(key);
            None
        } else {
            Some(entry.value.clone())
        }
    }

    /// Remove every expired entry, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let expired_keys: Vec<K> = self
            .entries
            .iter()
            .filter(|entry| entry.value().expires_at < now)
            .map(|entry| entry.key().clone())
            .collect();
        let count = expired_keys.len();
        for key in expired_keys {
            self.entries.remove(&key);
        }
        count
    }

    /// Current entry count (including any not-yet-cleaned-up expired entries).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn insert_and_get_roundtrip() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_secs(60), 10);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_millis(10), 10);
        cache.insert("a".to_string(), 1);
        sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn cleanup_expired_removes_stale_entries_only() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_millis(10), 10);
        cache.insert("a".to_string(), 1);
        sleep(Duration::from_millis(30));
        cache.insert_with_ttl("b".to_string(), 2, Duration::from_secs(60));
        let removed = cache.cleanup_expired();
        assert_eq!(removed, 1);
        assert_eq!(cache.get(&"b".to_string()), Some(2));
    }

    #[test]
    fn eviction_bounds_size() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a".to_string(), 1);
        sleep(Duration::from_millis(5));
        cache.insert("b".to_string(), 2);
        sleep(Duration::from_millis(5));
        cache.insert("c".to_string(), 3);
        assert!(cache.len() <= 2);
        assert_eq!(cache.get(&"a".to_string()), None);
    }
}
