use async_trait::async_trait;
use crate::data_entity::DataEntity;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Entity not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Capacity must be between {min} and {max}, got {value}")]
    InvalidCapacity {
        value: usize,
        min: usize,
        max: usize,
    },
    #[error("Write-through failed for entity {id}")]
    WriteFailed { id: i64 },
}

/// A fast tier (local LRU or Redis).
///
/// Implementations swallow their own transport faults: `get` reports them as a
/// miss and `put` as `false`, so a dead cache tier looks like a cold one.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, id: i64) -> Option<DataEntity>;
    async fn put(&self, entity: &DataEntity) -> bool;

    /// Snapshot of cached entries (diagnostics only).
    async fn list_all(&self) -> Vec<DataEntity>;

    /// Drop every entry this tier owns. Default: unsupported.
    async fn flush_all(&self) -> bool {
        false
    }
}

/// The durable tier (system of record).
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn get(&self, id: i64) -> Option<DataEntity>;

    /// Upsert by identity. On insert the generated id is written back into
    /// `entity`.
    async fn put(&self, entity: &mut DataEntity) -> bool;

    /// Full enumeration, no paging. Not for hot paths.
    async fn list_all(&self) -> Vec<DataEntity>;
}
