//! Tier adapters.
//!
//! - [`memory`]: bounded in-process LRU (local tier)
//! - [`redis`]: namespaced Redis strings with a fixed expiry (distributed tier)
//! - [`sql`]: upsert-by-identity table (durable tier)

pub mod traits;
pub mod memory;
pub mod redis;
pub mod sql;
