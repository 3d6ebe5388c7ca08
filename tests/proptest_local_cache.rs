//! Property-based tests for the local cache tier.
//!
//! Random operation sequences are replayed against [`LocalCache`] and a
//! reference LRU (a recency-ordered `Vec`), and the two must agree after every
//! step.
//!
//! Run with: `cargo test --test proptest_local_cache`

use proptest::prelude::*;

use tiered_cache::{DataEntity, LocalCache, StorageError};

#[derive(Debug, Clone)]
enum Op {
    Insert(i64),
    Lookup(i64),
    SetCapacity(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0i64..25).prop_map(Op::Insert),
        3 => (0i64..25).prop_map(Op::Lookup),
        1 => (0usize..120).prop_map(Op::SetCapacity),
    ]
}

/// Reference LRU: front is least recently used.
struct Model {
    order: Vec<i64>,
    capacity: usize,
}

impl Model {
    fn touch(&mut self, id: i64) -> bool {
        match self.order.iter().position(|&k| k == id) {
            Some(pos) => {
                let key = self.order.remove(pos);
                self.order.push(key);
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, id: i64) -> Option<i64> {
        if self.touch(id) {
            return None;
        }
        let mut evicted = None;
        while self.order.len() >= self.capacity {
            evicted = Some(self.order.remove(0));
        }
        self.order.push(id);
        evicted
    }

    fn sorted(&self) -> Vec<i64> {
        let mut keys = self.order.clone();
        keys.sort_unstable();
        keys
    }
}

fn cached_ids(cache: &LocalCache) -> Vec<i64> {
    let mut ids: Vec<i64> = cache.snapshot().iter().map(|e| e.id).collect();
    ids.sort_unstable();
    ids
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// The cache behaves exactly like a reference LRU
    #[test]
    fn matches_reference_lru(
        capacity in 3usize..=10,
        ops in prop::collection::vec(op_strategy(), 1..200),
    ) {
        let cache = LocalCache::new(capacity).unwrap();
        let mut model = Model { order: Vec::new(), capacity };

        for op in ops {
            match op {
                Op::Insert(id) => {
                    let evicted = cache.insert(&DataEntity::cached(id, format!("v{}", id)));
                    prop_assert_eq!(evicted, model.insert(id));
                }
                Op::Lookup(id) => {
                    let found = cache.lookup(id);
                    let expected = model.touch(id);
                    prop_assert_eq!(found.is_some(), expected);
                    if let Some(entity) = found {
                        prop_assert_eq!(entity.value, format!("v{}", id));
                    }
                }
                Op::SetCapacity(value) => {
                    let result = cache.set_capacity(value);
                    if (3..=100).contains(&value) {
                        prop_assert!(result.is_ok());
                        model.capacity = value;
                    } else {
                        let is_invalid = matches!(result, Err(StorageError::InvalidCapacity { .. }));
                        prop_assert!(is_invalid);
                    }
                }
            }

            prop_assert_eq!(cached_ids(&cache), model.sorted());
            prop_assert_eq!(cache.capacity(), model.capacity);
        }
    }

    /// Filling past capacity never exceeds it and evicts one entry per new key
    #[test]
    fn never_exceeds_capacity(
        capacity in 3usize..=100,
        ids in prop::collection::vec(any::<i64>(), 0..300),
    ) {
        let cache = LocalCache::new(capacity).unwrap();
        for id in ids {
            let was_full = cache.len() >= capacity;
            let is_new = !cache.contains(id);
            let evicted = cache.insert(&DataEntity::cached(id, "x"));

            prop_assert!(cache.len() <= capacity);
            prop_assert_eq!(evicted.is_some(), was_full && is_new);
        }
    }

    /// Out-of-range capacities are always rejected at construction
    #[test]
    fn rejects_out_of_range_construction(capacity in prop_oneof![0usize..3, 101usize..10_000]) {
        let is_invalid = matches!(
            LocalCache::new(capacity),
            Err(StorageError::InvalidCapacity { .. })
        );
        prop_assert!(is_invalid);
    }
}
