//! Bounded in-process TTL cache with explicit invalidation hooks.
//!
//! Every mutating rule operation invalidates the entries it could have made stale
//! before it returns. Loads that raced such an invalidation are never stored: a reader
//! takes a [`Generation`] before touching the backing store and hands it back on
//! insert, and any invalidation in between turns that insert into a no-op.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> Entry<V> {
    fn is_live(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, Entry<V>>,
    generation: u64,
}

/// Invalidation epoch observed by a reader before it loaded from the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

pub struct TtlCache<K: Hash + Eq, V> {
    name: &'static str,
    ttl: Duration,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    /// `capacity` bounds the number of keys; the least recently used entry goes first.
    pub fn new(name: &'static str, ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            ttl,
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                generation: 0,
            }),
        }
    }

    /// Returns a live entry. Expired entries read as misses and are evicted.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().await;
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.is_live(self.ttl) => {
                debug!(cache = self.name, ?key, "cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.pop(key);
        }
        None
    }

    /// Take this before loading a value that will be passed to [`TtlCache::insert`].
    pub async fn generation(&self) -> Generation {
        Generation(self.inner.lock().await.generation)
    }

    /// Stores `value` unless the cache was invalidated after `loaded_at` was taken.
    /// Returns whether the value was stored.
    pub async fn insert(&self, key: K, value: V, loaded_at: Generation) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.generation != loaded_at.0 {
            debug!(cache = self.name, ?key, "discarding load that raced an invalidation");
            return false;
        }
        inner.entries.put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    pub async fn invalidate(&self, key: &K) {
        let mut inner = self.inner.lock().await;
        inner.generation = inner.generation.wrapping_add(1);
        if inner.entries.pop(key).is_some() {
            debug!(cache = self.name, ?key, "cache entry invalidated");
        }
    }

    pub async fn invalidate_all(&self) {
        let mut inner = self.inner.lock().await;
        inner.generation = inner.generation.wrapping_add(1);
        if !inner.entries.is_empty() {
            debug!(cache = self.name, count = inner.entries.len(), "cache cleared");
            inner.entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_cache<K, V>(ttl: Duration) -> TtlCache<K, V>
    where
        K: Eq + Hash + Clone + std::fmt::Debug,
        V: Clone,
    {
        TtlCache::new("test", ttl, 16)
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let cache: TtlCache<String, i32> = new_cache(Duration::from_secs(60));
        let generation = cache.generation().await;
        assert!(cache.insert("a".to_string(), 1, generation).await);
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        assert_eq!(cache.get(&"b".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_invalidate_removes_single_key() {
        let cache: TtlCache<&'static str, i32> = new_cache(Duration::from_secs(60));
        cache.insert("a", 1, cache.generation().await).await;
        cache.insert("b", 2, cache.generation().await).await;
        cache.invalidate(&"a").await;
        assert_eq!(cache.get(&"a").await, None);
        assert_eq!(cache.get(&"b").await, Some(2));
    }

    #[tokio::test]
    async fn test_invalidate_all_clears_everything() {
        let cache: TtlCache<u8, u8> = new_cache(Duration::from_secs(60));
        cache.insert(1, 1, cache.generation().await).await;
        cache.insert(2, 2, cache.generation().await).await;
        cache.invalidate_all().await;
        assert_eq!(cache.get(&1).await, None);
        assert_eq!(cache.get(&2).await, None);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache: TtlCache<u8, u8> = new_cache(Duration::from_millis(10));
        cache.insert(1, 1, cache.generation().await).await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get(&1).await, None);
    }

    #[tokio::test]
    async fn test_load_started_before_invalidation_is_not_cached() {
        let cache: TtlCache<u8, &'static str> = new_cache(Duration::from_secs(60));

        let loaded_at = cache.generation().await;
        // A write lands between the reader's load and its insert.
        cache.invalidate(&1).await;
        assert!(!cache.insert(1, "stale", loaded_at).await);
        assert_eq!(cache.get(&1).await, None);

        let fresh = cache.generation().await;
        assert!(cache.insert(1, "fresh", fresh).await);
        assert_eq!(cache.get(&1).await, Some("fresh"));
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let cache: TtlCache<u8, u8> = TtlCache::new("test", Duration::from_secs(60), 2);
        cache.insert(1, 1, cache.generation().await).await;
        cache.insert(2, 2, cache.generation().await).await;
        assert_eq!(cache.get(&1).await, Some(1));
        cache.insert(3, 3, cache.generation().await).await;

        assert_eq!(cache.get(&2).await, None);
        assert_eq!(cache.get(&1).await, Some(1));
        assert_eq!(cache.get(&3).await, Some(3));
    }
}
