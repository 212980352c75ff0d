use std::{
    any::Any,
    sync::Arc,
    time::{Duration, Instant},
};

use moka::{sync::Cache, Expiry};

/// Anything the resolver memoizes
pub type CachedValue = Arc<dyn Any + Send + Sync + 'static>;

/// Key-value store with optional expiry
///
/// Only used to memoize derived metadata. A backend that forgets
/// everything changes the cost of resolution, never its result.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<CachedValue>;

    /// Stores `value`, `ttl` of `None` keeps it until replaced
    fn set(&self, key: &str, value: CachedValue, ttl: Option<Duration>);
}

impl dyn CacheBackend + '_ {
    /// Returns the cached `T` under `key`, or computes and stores it
    ///
    /// Errors of `compute` are returned as is and nothing is stored.
    pub fn get_or_compute<T, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
    {
        if let Some(cached) = self.get(key) {
            match cached.downcast::<T>() {
                Ok(value) => {
                    tracing::trace!("Cache hit for '{key}'");
                    return Ok(T::clone(&value));
                }
                Err(_) => tracing::debug!("Cache entry '{key}' holds another type, recomputing"),
            }
        }

        let value = compute()?;
        self.set(key, Arc::new(value.clone()), ttl);
        Ok(value)
    }
}

#[derive(Clone)]
struct Entry {
    value: CachedValue,
    ttl: Option<Duration>,
}

/// Expires every entry after the ttl it was stored with
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// In process cache backed by moka
pub struct MemoryCache {
    entries: Cache<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache {
            entries: Cache::builder().expire_after(EntryExpiry).build(),
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Option<CachedValue> {
        self.entries.get(key).map(|entry| entry.value)
    }

    fn set(&self, key: &str, value: CachedValue, ttl: Option<Duration>) {
        self.entries.insert(key.to_string(), Entry { value, ttl });
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

/// Cache which never stores anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl CacheBackend for NoCache {
    fn get(&self, _key: &str) -> Option<CachedValue> {
        None
    }

    fn set(&self, _key: &str, _value: CachedValue, _ttl: Option<Duration>) {}
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, convert::Infallible};

    use super::*;

    fn computed(cache: &dyn CacheBackend, calls: &Cell<u32>) -> String {
        cache
            .get_or_compute("key", None, || {
                calls.set(calls.get() + 1);
                Ok::<_, Infallible>("value".to_string())
            })
            .unwrap()
    }

    #[test]
    fn memory_cache_computes_once() {
        let cache = MemoryCache::new();
        let calls = Cell::new(0);
        assert_eq!(computed(&cache, &calls), "value");
        assert_eq!(computed(&cache, &calls), "value");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn no_cache_always_computes() {
        let calls = Cell::new(0);
        computed(&NoCache, &calls);
        computed(&NoCache, &calls);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn failures_are_not_stored() {
        let cache: &dyn CacheBackend = &MemoryCache::new();
        let result = cache.get_or_compute::<u32, _>("key", None, || Err("nope"));
        assert_eq!(result, Err("nope"));
        assert!(cache.get("key").is_none());
    }

    #[test]
    fn entries_expire() {
        let cache = MemoryCache::new();
        cache.set("gone", Arc::new(1u8), Some(Duration::ZERO));
        cache.set("kept", Arc::new(2u8), Some(Duration::from_secs(60)));
        assert!(cache.get("gone").is_none());
        assert!(cache.get("kept").is_some());
    }

    #[test]
    fn replacing_an_entry_resets_its_ttl() {
        let cache = MemoryCache::new();
        cache.set("key", Arc::new(1u8), Some(Duration::ZERO));
        cache.set("key", Arc::new(2u8), None);
        assert_eq!(*cache.get("key").unwrap().downcast::<u8>().unwrap(), 2);

        cache.clear();
        assert!(cache.get("key").is_none());
    }

    #[test]
    fn type_mismatch_recomputes() {
        let cache: &dyn CacheBackend = &MemoryCache::new();
        cache.set("key", Arc::new(5u8), None);
        let value = cache
            .get_or_compute("key", None, || Ok::<_, Infallible>(7u32))
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(*cache.get("key").unwrap().downcast::<u32>().unwrap(), 7);
    }
}
