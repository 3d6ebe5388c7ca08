// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

/// Cache entry metadata for the local tier.
///
/// `last_access` is a stamp from the owning cache's monotonic access clock,
/// not wall time, so two accesses never compare equal.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub id: i64,
    pub value: String,
    pub last_access: u64,
}

impl CacheEntry {
    pub fn new(id: i64, value: String, stamp: u64) -> Self {
        Self {
            id,
            value,
            last_access: stamp,
        }
    }

    pub fn record_access(&mut self, stamp: u64) {
        self.last_access = stamp;
    }
}

/// Strict least-recently-used selection by full scan.
///
/// O(n) per call. Only used under the local cache's hard ceiling of 100
/// entries; an ordered recency index would be needed above that.
#[derive(Debug, Default, Clone, Copy)]
pub struct LruPolicy;

impl LruPolicy {
    /// Id of the entry with the oldest access stamp, if any.
    pub fn select_victim<'a, I>(&self, entries: I) -> Option<i64>
    where
        I: IntoIterator<Item = &'a CacheEntry>,
    {
        entries
            .into_iter()
            .min_by_key(|e| e.last_access)
            .map(|e| e.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(id: i64, stamp: u64) -> CacheEntry {
        CacheEntry::new(id, format!("v{}", id), stamp)
    }

    #[test]
    fn test_select_victim_empty() {
        let entries: Vec<CacheEntry> = vec![];
        assert_eq!(LruPolicy.select_victim(&entries), None);
    }

    #[test]
    fn test_select_victim_picks_oldest_stamp() {
        let entries = vec![
            make_entry(1, 30),
            make_entry(2, 10),
            make_entry(3, 20),
        ];

        assert_eq!(LruPolicy.select_victim(&entries), Some(2));
    }

    #[test]
    fn test_record_access_moves_entry_forward() {
        let mut entries = vec![make_entry(1, 1), make_entry(2, 2), make_entry(3, 3)];

        entries[0].record_access(4);
        assert_eq!(entries[0].last_access, 4);
        assert_eq!(LruPolicy.select_victim(&entries), Some(2));
    }

    #[test]
    fn test_select_victim_ignores_insertion_order() {
        let entries = vec![make_entry(9, 100), make_entry(4, 5), make_entry(7, 50)];
        assert_eq!(LruPolicy.select_victim(entries.iter()), Some(4));
    }
}
