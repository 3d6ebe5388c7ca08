//! Eviction policy for the local cache tier.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Eviction Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  lru.rs        - Strict LRU victim selection                 │
//! │  └─ CacheEntry: payload + access stamp                       │
//! │  └─ LruPolicy: oldest access stamp → victim                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The local cache (`storage/memory.rs`) holds `CacheEntry` values and asks
//! `LruPolicy` for a victim when an insert of a new key would exceed capacity.
//! Redis entries are never evicted by us; they expire by TTL.

pub mod lru;
