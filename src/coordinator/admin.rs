//! Administrative operations: per-tier inspection, namespace flush, and
//! soft delete/restore.

use tracing::{info, warn};

use super::{Tier, TierCoordinator, WriteOutcome};
use crate::data_entity::DataEntity;
use crate::storage::traits::StorageError;

impl TierCoordinator {
    /// Read one tier directly, without promotion or recency refresh side
    /// effects on other tiers.
    #[tracing::instrument(skip(self))]
    pub async fn get_from(&self, tier: Tier, id: i64) -> Option<DataEntity> {
        match self.fast_tier(tier) {
            Some(fast) => fast.store.get(id).await,
            None => self.durable.get(id).await,
        }
    }

    /// Snapshot of one tier's contents.
    ///
    /// Distributed results are capped at the first 1000 keys; durable results
    /// are a full table scan.
    pub async fn list_all(&self, tier: Tier) -> Vec<DataEntity> {
        match self.fast_tier(tier) {
            Some(fast) => fast.store.list_all().await,
            None => self.durable.list_all().await,
        }
    }

    /// Delete this deployment's keys from the distributed tier.
    pub async fn flush_distributed(&self) -> bool {
        let flushed = self.distributed.flush_all().await;
        if flushed {
            info!("Distributed tier flushed");
        } else {
            warn!("Distributed tier flush failed");
        }
        flushed
    }

    /// Mark a record deleted and write it through every tier.
    pub async fn soft_delete(&self, id: i64) -> Result<DataEntity, StorageError> {
        self.set_deleted(id, true).await
    }

    /// Clear the deleted marker and write the record through every tier.
    pub async fn restore(&self, id: i64) -> Result<DataEntity, StorageError> {
        self.set_deleted(id, false).await
    }

    /// The durable store is read directly so the full record (external key
    /// included) is what gets written back.
    #[tracing::instrument(skip(self))]
    async fn set_deleted(&self, id: i64, deleted: bool) -> Result<DataEntity, StorageError> {
        let mut entity = self.durable.get(id).await.ok_or(StorageError::NotFound)?;
        entity.is_deleted = deleted;

        match self.set_with_outcome(&mut entity).await {
            WriteOutcome::Complete => Ok(entity),
            WriteOutcome::DurableOnly | WriteOutcome::Failed => Err(StorageError::WriteFailed { id }),
        }
    }
}
