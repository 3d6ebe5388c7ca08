// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tier coordinator.
//!
//! The [`TierCoordinator`] puts the three tiers behind one read/write
//! contract:
//! - local in-process LRU ([`crate::storage::memory::LocalCache`])
//! - distributed Redis cache ([`crate::storage::redis::RedisStore`])
//! - durable SQL store ([`crate::storage::sql::SqlStore`])
//!
//! # Read path
//!
//! ```text
//! first fast tier ──hit──► re-put into first tier ─────────────► return
//!      │ miss
//! second fast tier ─hit──► put into first tier ────────────────► return
//!      │ miss
//! durable store ────hit──► put into second, then first tier ───► return
//!      │ miss
//!    None
//! ```
//!
//! # Write path
//!
//! ```text
//! durable ──ok──► second fast tier ──ok──► first fast tier ──► result
//!    │ fail            │ fail
//!  Failed          DurableOnly
//! ```
//!
//! Which fast tier is "first" is chosen by [`TierOrder`].
//!
//! # Example
//!
//! ```rust,no_run
//! use tiered_cache::{DataEntity, TierConfig, TierCoordinator};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = TierConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     sql_url: Some("sqlite:cache.db?mode=rwc".into()),
//!     ..Default::default()
//! };
//! let cache = TierCoordinator::connect(&config).await.expect("connect failed");
//!
//! let mut entity = DataEntity::new(r#"{"x":1}"#);
//! assert!(cache.set(&mut entity).await);
//! assert_eq!(cache.get(entity.id).await.unwrap().value, r#"{"x":1}"#);
//! # }
//! ```

mod types;
mod admin;

pub use types::{Tier, TierOrder, WriteOutcome, ParseTierError};

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::TierConfig;
use crate::data_entity::DataEntity;
use crate::storage::memory::LocalCache;
use crate::storage::redis::RedisStore;
use crate::storage::sql::SqlStore;
use crate::storage::traits::{ArchiveStore, CacheStore, StorageError};

/// A fast tier tagged with its identity, for logs and metrics.
#[derive(Clone, Copy)]
struct FastTier<'a> {
    tier: Tier,
    store: &'a dyn CacheStore,
}

/// Orchestrates reads and writes across the local, distributed and durable
/// tiers.
///
/// Holds no state of its own; cloning the `Arc`s and building a second
/// coordinator over the same tiers is equivalent.
pub struct TierCoordinator {
    local: Arc<dyn CacheStore>,
    distributed: Arc<dyn CacheStore>,
    durable: Arc<dyn ArchiveStore>,
    order: TierOrder,
}

impl TierCoordinator {
    /// Assemble a coordinator over already-built tiers.
    pub fn new(
        local: Arc<dyn CacheStore>,
        distributed: Arc<dyn CacheStore>,
        durable: Arc<dyn ArchiveStore>,
        order: TierOrder,
    ) -> Self {
        Self {
            local,
            distributed,
            durable,
            order,
        }
    }

    /// Validate the config, connect SQL and Redis (with startup retry) and
    /// build the local cache.
    pub async fn connect(config: &TierConfig) -> Result<Self, StorageError> {
        config.validate()?;

        let sql_url = config
            .sql_url
            .as_deref()
            .ok_or_else(|| StorageError::Config("sql_url is required".into()))?;
        let redis_url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| StorageError::Config("redis_url is required".into()))?;

        let durable = SqlStore::new(sql_url).await?;
        let distributed = RedisStore::connect(
            redis_url,
            &config.redis_extra_endpoints,
            config.redis_instance_name.as_deref(),
        )
        .await?;
        let local = LocalCache::new(config.local_capacity)?;

        info!(
            capacity = config.local_capacity,
            order = ?config.tier_order,
            "Tier coordinator ready"
        );

        Ok(Self::new(
            Arc::new(local),
            Arc::new(distributed),
            Arc::new(durable),
            config.tier_order,
        ))
    }

    #[must_use]
    pub fn order(&self) -> TierOrder {
        self.order
    }

    fn fast_tier(&self, tier: Tier) -> Option<FastTier<'_>> {
        let store: &dyn CacheStore = match tier {
            Tier::Local => self.local.as_ref(),
            Tier::Distributed => self.distributed.as_ref(),
            Tier::Durable => return None,
        };
        Some(FastTier { tier, store })
    }

    /// `(first, second)` fast tiers for the configured order.
    fn fast_pair(&self) -> (FastTier<'_>, FastTier<'_>) {
        let local = FastTier { tier: Tier::Local, store: self.local.as_ref() };
        let distributed = FastTier { tier: Tier::Distributed, store: self.distributed.as_ref() };
        let pick = |tier: Tier| if tier == Tier::Local { local } else { distributed };
        let (first, second) = self.order.fast_tiers();
        (pick(first), pick(second))
    }

    async fn promote(&self, entity: &DataEntity, from: Tier, into: FastTier<'_>) {
        if into.store.put(entity).await {
            crate::metrics::record_promotion(from.as_str(), into.tier.as_str());
        } else {
            debug!(id = entity.id, tier = %into.tier, "Promotion write rejected");
        }
    }

    /// Get an entity by id.
    ///
    /// Checks the first fast tier, the second fast tier, then the durable
    /// store, copying a hit into every faster tier that missed. Per-tier
    /// hit/miss counters are recorded by the tiers; this records `all`.
    #[tracing::instrument(skip(self), fields(tier))]
    pub async fn get(&self, id: i64) -> Option<DataEntity> {
        let start = Instant::now();
        let (first, second) = self.fast_pair();

        // 1. First fast tier: re-put refreshes recency (local) or TTL (Redis)
        if let Some(entity) = first.store.get(id).await {
            first.store.put(&entity).await;
            tracing::Span::current().record("tier", first.tier.as_str());
            debug!("First tier hit");
            crate::metrics::record_operation("all", "get", "hit");
            crate::metrics::record_latency("all", "get", start.elapsed());
            return Some(entity);
        }

        // 2. Second fast tier: promote into the first only
        if let Some(entity) = second.store.get(id).await {
            self.promote(&entity, second.tier, first).await;
            tracing::Span::current().record("tier", second.tier.as_str());
            debug!("Second tier hit, promoted to {}", first.tier);
            crate::metrics::record_operation("all", "get", "hit");
            crate::metrics::record_latency("all", "get", start.elapsed());
            return Some(entity);
        }

        // 3. Durable store: warm both fast tiers, slowest first
        if let Some(entity) = self.durable.get(id).await {
            self.promote(&entity, Tier::Durable, second).await;
            self.promote(&entity, Tier::Durable, first).await;
            tracing::Span::current().record("tier", Tier::Durable.as_str());
            debug!("Durable hit, promoted to both fast tiers");
            crate::metrics::record_operation("all", "get", "hit");
            crate::metrics::record_latency("all", "get", start.elapsed());
            return Some(entity);
        }

        tracing::Span::current().record("tier", "miss");
        debug!("Miss in every tier");
        crate::metrics::record_operation("all", "get", "miss");
        crate::metrics::record_latency("all", "get", start.elapsed());
        None
    }

    /// Write-through: durable store, then second fast tier, then first.
    ///
    /// Returns `true` only if every tier accepted the write. A new entity
    /// (`id == 0`) receives its generated id even when a cache tier later
    /// fails; use [`Self::set_with_outcome`] to tell those cases apart.
    pub async fn set(&self, entity: &mut DataEntity) -> bool {
        self.set_with_outcome(entity).await.is_success()
    }

    /// Write-through with a detailed outcome.
    ///
    /// A durable failure touches no fast tier. A second-tier failure stops
    /// propagation before the first tier.
    #[tracing::instrument(skip(self, entity), fields(id = entity.id, outcome))]
    pub async fn set_with_outcome(&self, entity: &mut DataEntity) -> WriteOutcome {
        let start = Instant::now();
        let outcome = self.write_through(entity).await;

        tracing::Span::current().record("outcome", tracing::field::display(outcome));
        let status = if outcome.is_success() { "success" } else { "error" };
        crate::metrics::record_operation("all", "set", status);
        crate::metrics::record_latency("all", "set", start.elapsed());
        outcome
    }

    async fn write_through(&self, entity: &mut DataEntity) -> WriteOutcome {
        if !self.durable.put(entity).await {
            warn!(id = entity.id, "Durable write failed, caches untouched");
            return WriteOutcome::Failed;
        }

        let (first, second) = self.fast_pair();

        if !second.store.put(entity).await {
            warn!(id = entity.id, tier = %second.tier, "Cache write failed after durable commit");
            return WriteOutcome::DurableOnly;
        }

        if !first.store.put(entity).await {
            warn!(id = entity.id, tier = %first.tier, "Cache write failed after durable commit");
            return WriteOutcome::DurableOnly;
        }

        debug!(id = entity.id, "Write-through complete");
        WriteOutcome::Complete
    }
}
