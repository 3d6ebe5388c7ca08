// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL storage backend for the durable tier.
//!
//! One row per entity, identity generated by the database:
//! ```sql
//! CREATE TABLE data_entries (
//!   id BIGINT AUTO_INCREMENT PRIMARY KEY,
//!   guid_id VARCHAR(64) NOT NULL UNIQUE,
//!   value LONGTEXT,
//!   is_deleted BIGINT NOT NULL DEFAULT 0
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver has no bool mapping, so `is_deleted` is stored as an
//! integer 0/1. MySQL LONGTEXT/VARCHAR columns may come back as BLOB, so text
//! columns are read as `String` first and fall back to `Vec<u8>`.

use async_trait::async_trait;
use sqlx::{AnyPool, Row, any::{AnyPoolOptions, AnyRow}};
use tracing::{debug, info, warn};
use crate::data_entity::{DataEntity, EMPTY_PAYLOAD};
use crate::metrics::LatencyTimer;
use super::traits::{ArchiveStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};
use std::sync::Once;
use std::time::Duration;

const TIER: &str = "durable";

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

pub struct SqlStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlStore {
    /// Create a new SQL store with startup-mode retry (fails fast if config is wrong).
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await
        .inspect_err(|_| crate::metrics::record_connection_error("sql"))?;

        let store = Self { pool, is_sqlite };

        if is_sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        info!(sqlite = is_sqlite, "SQL store connected");
        Ok(store)
    }

    /// Get a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    /// Enable WAL mode for SQLite so readers don't block the writer.
    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let sql = if self.is_sqlite {
            r#"
            CREATE TABLE IF NOT EXISTS data_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guid_id TEXT NOT NULL UNIQUE,
                value TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0
            )
            "#
        } else {
            r#"
            CREATE TABLE IF NOT EXISTS data_entries (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                guid_id VARCHAR(64) NOT NULL,
                value LONGTEXT,
                is_deleted BIGINT NOT NULL DEFAULT 0,
                UNIQUE INDEX idx_guid_id (guid_id)
            )
            "#
        };

        retry("sql_init_schema", &RetryConfig::startup(), || async {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        Ok(())
    }

    /// Read a text column, tolerating drivers that hand back bytes.
    fn text_column(row: &AnyRow, column: &str) -> Option<String> {
        row.try_get::<String, _>(column).ok().or_else(|| {
            row.try_get::<Vec<u8>, _>(column)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
    }

    fn row_to_entity(row: &AnyRow) -> Result<DataEntity, StorageError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let is_deleted: i64 = row.try_get("is_deleted").unwrap_or(0);

        Ok(DataEntity {
            id,
            guid_id: Self::text_column(row, "guid_id").unwrap_or_default(),
            value: Self::text_column(row, "value").unwrap_or_else(|| EMPTY_PAYLOAD.to_string()),
            is_deleted: is_deleted != 0,
        })
    }

    /// Fetch a row by identity.
    pub async fn find(&self, id: i64) -> Result<Option<DataEntity>, StorageError> {
        let row = sqlx::query("SELECT id, guid_id, value, is_deleted FROM data_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.as_ref().map(Self::row_to_entity).transpose()
    }

    /// Insert or update by identity. On insert, `entity.id` receives the
    /// generated identity.
    pub async fn upsert(&self, entity: &mut DataEntity) -> Result<(), StorageError> {
        let existing = if entity.id == 0 {
            None
        } else {
            sqlx::query("SELECT guid_id FROM data_entries WHERE id = ?")
                .bind(entity.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        // The entity is only mutated once the statement has succeeded
        match existing {
            Some(row) => {
                // A record without an external key keeps the stored one
                let guid_id = if entity.guid_id.is_empty() {
                    Self::text_column(&row, "guid_id").unwrap_or_default()
                } else {
                    entity.guid_id.clone()
                };
                sqlx::query("UPDATE data_entries SET guid_id = ?, value = ?, is_deleted = ? WHERE id = ?")
                    .bind(guid_id.clone())
                    .bind(entity.value.clone())
                    .bind(i64::from(entity.is_deleted))
                    .bind(entity.id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                entity.guid_id = guid_id;
                debug!(id = entity.id, "Updated durable record");
            }
            None => {
                let guid_id = if entity.guid_id.is_empty() {
                    uuid::Uuid::new_v4().to_string()
                } else {
                    entity.guid_id.clone()
                };
                let generated = self.insert_row(&guid_id, entity).await?;
                entity.guid_id = guid_id;
                entity.id = generated;
                debug!(id = generated, "Inserted durable record");
            }
        }
        Ok(())
    }

    /// Insert a new row and return its generated identity.
    ///
    /// The `Any` driver reports no last-insert id for SQLite, so SQLite uses
    /// `RETURNING`. MySQL reads `LAST_INSERT_ID()` and falls back to a lookup
    /// by external key.
    async fn insert_row(&self, guid_id: &str, entity: &DataEntity) -> Result<i64, StorageError> {
        if self.is_sqlite {
            let row = sqlx::query(
                "INSERT INTO data_entries (guid_id, value, is_deleted) VALUES (?, ?, ?) RETURNING id",
            )
            .bind(guid_id.to_string())
            .bind(entity.value.clone())
            .bind(i64::from(entity.is_deleted))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
            return row
                .try_get::<i64, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()));
        }

        let result = sqlx::query("INSERT INTO data_entries (guid_id, value, is_deleted) VALUES (?, ?, ?)")
            .bind(guid_id.to_string())
            .bind(entity.value.clone())
            .bind(i64::from(entity.is_deleted))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if let Some(id) = result.last_insert_id() {
            return Ok(id);
        }

        let row = sqlx::query("SELECT id FROM data_entries WHERE guid_id = ?")
            .bind(guid_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.try_get::<i64, _>("id")
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    /// Every row, ordered by identity.
    pub async fn fetch_all(&self) -> Result<Vec<DataEntity>, StorageError> {
        let rows = sqlx::query("SELECT id, guid_id, value, is_deleted FROM data_entries ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.iter().map(Self::row_to_entity).collect()
    }

    /// Row count.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM data_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let count: i64 = row.try_get("cnt").map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl ArchiveStore for SqlStore {
    async fn get(&self, id: i64) -> Option<DataEntity> {
        let _timer = LatencyTimer::new(TIER, "get");
        match self.find(id).await {
            Ok(Some(entity)) => {
                crate::metrics::record_operation(TIER, "get", "hit");
                Some(entity)
            }
            Ok(None) => {
                crate::metrics::record_operation(TIER, "get", "miss");
                None
            }
            Err(e) => {
                warn!(id, error = %e, "SQL get failed, treating as miss");
                crate::metrics::record_error(TIER, "get", "backend");
                None
            }
        }
    }

    async fn put(&self, entity: &mut DataEntity) -> bool {
        let _timer = LatencyTimer::new(TIER, "set");
        match self.upsert(entity).await {
            Ok(()) => {
                crate::metrics::record_operation(TIER, "set", "success");
                true
            }
            Err(e) => {
                warn!(id = entity.id, error = %e, "SQL upsert failed");
                crate::metrics::record_error(TIER, "set", "backend");
                false
            }
        }
    }

    async fn list_all(&self) -> Vec<DataEntity> {
        self.fetch_all().await.unwrap_or_else(|e| {
            warn!(error = %e, "SQL enumeration failed");
            crate::metrics::record_error(TIER, "list", "backend");
            Vec::new()
        })
    }
}
