//! Bounded in-process cache (local tier).
//!
//! A mutex-guarded `HashMap` with a capacity ceiling and strict LRU eviction.
//! Lookup, victim selection and insert all happen under the same lock, so
//! concurrent callers can never interleave an eviction with an insert.
//!
//! Capacity handling is asymmetric:
//! - [`LocalCache::set_capacity`] (and construction) rejects values outside
//!   `3..=100` with [`StorageError::InvalidCapacity`].
//! - [`LocalCache::capacity`] silently resets an out-of-range stored value to
//!   the default of 10 when reading it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::data_entity::DataEntity;
use crate::eviction::lru::{CacheEntry, LruPolicy};
use super::traits::{CacheStore, StorageError};

pub const MIN_CAPACITY: usize = 3;
pub const MAX_CAPACITY: usize = 100;
pub const DEFAULT_CAPACITY: usize = 10;

const TIER: &str = "local";

#[derive(Default)]
struct Inner {
    entries: HashMap<i64, CacheEntry>,
    /// Monotonic access clock; bumped on every touch
    clock: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

pub struct LocalCache {
    inner: Mutex<Inner>,
    capacity: AtomicUsize,
    policy: LruPolicy,
}

impl LocalCache {
    /// Create a cache with the given capacity.
    ///
    /// # Errors
    ///
    /// [`StorageError::InvalidCapacity`] if `capacity` is outside `3..=100`.
    pub fn new(capacity: usize) -> Result<Self, StorageError> {
        let cache = Self {
            inner: Mutex::new(Inner::default()),
            capacity: AtomicUsize::new(DEFAULT_CAPACITY),
            policy: LruPolicy,
        };
        cache.set_capacity(capacity)?;
        Ok(cache)
    }

    /// Current capacity. An out-of-range stored value is reset to the default.
    #[must_use]
    pub fn capacity(&self) -> usize {
        let current = self.capacity.load(Ordering::Acquire);
        if (MIN_CAPACITY..=MAX_CAPACITY).contains(&current) {
            current
        } else {
            self.capacity.store(DEFAULT_CAPACITY, Ordering::Release);
            DEFAULT_CAPACITY
        }
    }

    /// Change the capacity. Existing entries are not evicted until the next
    /// insert of a new key.
    pub fn set_capacity(&self, capacity: usize) -> Result<(), StorageError> {
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
            return Err(StorageError::InvalidCapacity {
                value: capacity,
                min: MIN_CAPACITY,
                max: MAX_CAPACITY,
            });
        }
        self.capacity.store(capacity, Ordering::Release);
        Ok(())
    }

    /// Get current item count
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Membership test that does not count as an access.
    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        self.inner.lock().entries.contains_key(&id)
    }

    /// Clear all items
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
        crate::metrics::set_local_cache_items(0);
    }

    /// Look up an entry and refresh its recency.
    pub fn lookup(&self, id: i64) -> Option<DataEntity> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let stamp = inner.tick();
        let entry = inner.entries.get_mut(&id)?;
        entry.record_access(stamp);
        Some(DataEntity::cached(id, entry.value.clone()))
    }

    /// Insert or overwrite an entry, evicting the least recently used one
    /// first if a new key would exceed capacity.
    ///
    /// Returns the id of the evicted entry, if any.
    pub fn insert(&self, entity: &DataEntity) -> Option<i64> {
        let capacity = self.capacity();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let mut evicted = None;
        if !inner.entries.contains_key(&entity.id) {
            // Loop only matters after a capacity shrink; normally one pass.
            while inner.entries.len() >= capacity {
                let Some(victim) = self.policy.select_victim(inner.entries.values()) else {
                    break;
                };
                inner.entries.remove(&victim);
                debug!(victim, "Evicted least recently used entry");
                crate::metrics::record_eviction(1);
                evicted = Some(victim);
            }
        }

        let stamp = inner.tick();
        match inner.entries.get_mut(&entity.id) {
            Some(entry) => {
                entry.value.clone_from(&entity.value);
                entry.record_access(stamp);
            }
            None => {
                inner
                    .entries
                    .insert(entity.id, CacheEntry::new(entity.id, entity.value.clone(), stamp));
            }
        }
        crate::metrics::set_local_cache_items(inner.entries.len());
        evicted
    }

    /// Snapshot of all entries (no recency refresh).
    pub fn snapshot(&self) -> Vec<DataEntity> {
        self.inner
            .lock()
            .entries
            .values()
            .map(|e| DataEntity::cached(e.id, e.value.clone()))
            .collect()
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: AtomicUsize::new(DEFAULT_CAPACITY),
            policy: LruPolicy,
        }
    }
}

#[async_trait]
impl CacheStore for LocalCache {
    async fn get(&self, id: i64) -> Option<DataEntity> {
        let found = self.lookup(id);
        let status = if found.is_some() { "hit" } else { "miss" };
        crate::metrics::record_operation(TIER, "get", status);
        found
    }

    async fn put(&self, entity: &DataEntity) -> bool {
        self.insert(entity);
        crate::metrics::record_operation(TIER, "set", "success");
        true
    }

    async fn list_all(&self) -> Vec<DataEntity> {
        self.snapshot()
    }

    async fn flush_all(&self) -> bool {
        self.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entity(id: i64) -> DataEntity {
        DataEntity::cached(id, format!("{{\"n\":{}}}", id))
    }

    #[test]
    fn test_default_capacity_is_ten() {
        let cache = LocalCache::default();
        assert_eq!(cache.capacity(), 10);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(matches!(
            LocalCache::new(2),
            Err(StorageError::InvalidCapacity { value: 2, .. })
        ));
        assert!(matches!(
            LocalCache::new(101),
            Err(StorageError::InvalidCapacity { value: 101, .. })
        ));
        assert_eq!(LocalCache::new(3).unwrap().capacity(), 3);
        assert_eq!(LocalCache::new(100).unwrap().capacity(), 100);
    }

    #[test]
    fn test_set_capacity_rejects_and_keeps_previous() {
        let cache = LocalCache::new(5).unwrap();

        assert!(cache.set_capacity(2).is_err());
        assert!(cache.set_capacity(101).is_err());
        assert_eq!(cache.capacity(), 5);

        cache.set_capacity(50).unwrap();
        assert_eq!(cache.capacity(), 50);
    }

    #[test]
    fn test_corrupted_capacity_reads_as_default() {
        let cache = LocalCache::new(20).unwrap();
        cache.capacity.store(0, Ordering::SeqCst);

        assert_eq!(cache.capacity(), 10);
        // The reset sticks
        assert_eq!(cache.capacity.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = LocalCache::default();
        assert!(cache.put(&entity(1)).await);

        let found = cache.get(1).await.unwrap();
        assert_eq!(found.id, 1);
        assert_eq!(found.value, "{\"n\":1}");
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let cache = LocalCache::default();
        assert!(cache.get(99).await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = LocalCache::default();
        cache.put(&DataEntity::cached(1, "a")).await;
        cache.put(&DataEntity::cached(1, "b")).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1).await.unwrap().value, "b");
    }

    #[test]
    fn test_evicts_exactly_one_oldest_per_insert() {
        let cache = LocalCache::new(3).unwrap();
        for id in 1..=3 {
            assert_eq!(cache.insert(&entity(id)), None);
        }

        assert_eq!(cache.insert(&entity(4)), Some(1));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.insert(&entity(5)), Some(2));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(1));
        assert!(!cache.contains(2));
    }

    #[test]
    fn test_read_protects_entry_from_eviction() {
        let cache = LocalCache::new(3).unwrap();
        for id in 1..=3 {
            cache.insert(&entity(id));
        }

        // 1 is oldest by insertion, but reading it makes 2 the victim
        assert!(cache.lookup(1).is_some());
        assert_eq!(cache.insert(&entity(4)), Some(2));
        assert!(cache.contains(1));
    }

    #[test]
    fn test_freshly_read_entry_outlives_untouched_ones() {
        let capacity = 5;
        let cache = LocalCache::new(capacity).unwrap();
        for id in 1..=capacity as i64 {
            cache.insert(&entity(id));
        }

        cache.lookup(1);
        let mut evicted = Vec::new();
        for id in 100..100 + capacity as i64 {
            evicted.extend(cache.insert(&entity(id)));
        }

        // Every untouched entry went before the freshly read one
        assert_eq!(evicted, vec![2, 3, 4, 5, 1]);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let cache = LocalCache::new(3).unwrap();
        for id in 1..=3 {
            cache.insert(&entity(id));
        }

        assert_eq!(cache.insert(&DataEntity::cached(2, "new")), None);
        assert_eq!(cache.len(), 3);
        assert!(cache.contains(1));
    }

    #[test]
    fn test_capacity_shrink_applies_on_next_insert() {
        let cache = LocalCache::new(5).unwrap();
        for id in 1..=5 {
            cache.insert(&entity(id));
        }

        cache.set_capacity(3).unwrap();
        assert_eq!(cache.len(), 5);

        cache.insert(&entity(6));
        assert_eq!(cache.len(), 3);
        assert!(cache.contains(4));
        assert!(cache.contains(5));
        assert!(cache.contains(6));
    }

    #[tokio::test]
    async fn test_list_all_and_flush() {
        let cache = LocalCache::default();
        for id in 1..=4 {
            cache.put(&entity(id)).await;
        }

        let mut ids: Vec<i64> = cache.list_all().await.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        assert!(cache.flush_all().await);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_access_respects_capacity() {
        let cache = Arc::new(LocalCache::new(50).unwrap());
        let mut handles = vec![];

        for batch in 0..10i64 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..20i64 {
                    let id = batch * 100 + i;
                    cache.put(&entity(id)).await;
                    cache.get(id).await;
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 50);
    }
}
