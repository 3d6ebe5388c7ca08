//! Redis storage backend for the distributed tier.
//!
//! Each entity's payload is stored as a plain Redis STRING with a fixed
//! 5-minute expiry. Keys are namespaced so several deployments can share one
//! Redis instance:
//!
//! ```text
//! DataEntity:42            (no namespace)
//! movement:DataEntity:42   (namespace "movement")
//! ```
//!
//! Enumeration and flushing use `SCAN MATCH` against the namespace pattern and
//! batched `DEL`. FLUSHALL/FLUSHDB are never issued: managed Redis often
//! disables them, and they would wipe other tenants' keys.

use async_trait::async_trait;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::{AsyncCommands, Client, ErrorKind, RedisError, cmd};
use tracing::{debug, info, warn};

use crate::data_entity::DataEntity;
use crate::metrics::LatencyTimer;
use crate::resilience::retry::{retry, RetryConfig};
use super::traits::{CacheStore, StorageError};

/// Entity segment of every key
pub const ENTITY_PREFIX: &str = "DataEntity:";
/// Expiry applied on every write
pub const ENTRY_TTL_SECS: u64 = 5 * 60;
/// Upper bound on keys returned by `list_all`
pub const LIST_LIMIT: usize = 1000;
/// Keys per DEL call during a flush
pub const FLUSH_BATCH_SIZE: usize = 500;
/// SCAN page size hint
const SCAN_COUNT: usize = 500;

const TIER: &str = "distributed";

/// Key layout: `[namespace:]DataEntity:<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    prefix: String,
}

impl KeyScheme {
    /// Build the scheme. A trailing `:` on the namespace is tolerated.
    pub fn new(namespace: Option<&str>) -> Self {
        let namespace = namespace.map(|ns| ns.trim_end_matches(':')).unwrap_or("");
        let prefix = if namespace.is_empty() {
            ENTITY_PREFIX.to_string()
        } else {
            format!("{}:{}", namespace, ENTITY_PREFIX)
        };
        Self { prefix }
    }

    #[inline]
    pub fn entity_key(&self, id: i64) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Glob matching every entity key of this deployment.
    pub fn pattern(&self) -> String {
        format!("{}*", self.prefix)
    }

    /// Parse the numeric id out of a key's last segment.
    pub fn parse_id(key: &str) -> Option<i64> {
        key.rsplit(':').next()?.parse().ok()
    }
}

pub struct RedisStore {
    /// Primary connection: reads, writes and deletes go here
    connection: ConnectionManager,
    /// Every known server, primary first; scanned during flush
    endpoints: Vec<Client>,
    keys: KeyScheme,
}

impl RedisStore {
    /// Connect to a single Redis server without a namespace.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::connect(connection_string, &[], None).await
    }

    /// Connect to the primary server and register additional endpoints.
    ///
    /// Only the primary must be reachable now. Extra endpoints are contacted
    /// lazily when flushing and skipped if they are down.
    pub async fn connect(
        primary: &str,
        extra_endpoints: &[String],
        namespace: Option<&str>,
    ) -> Result<Self, StorageError> {
        let client = Client::open(primary)
            .map_err(|e| StorageError::Config(format!("Invalid Redis URL: {}", e)))?;

        let mut endpoints = vec![client.clone()];
        for url in extra_endpoints {
            let extra = Client::open(url.as_str())
                .map_err(|e| StorageError::Config(format!("Invalid Redis endpoint {}: {}", url, e)))?;
            endpoints.push(extra);
        }

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: RedisError| {
            crate::metrics::record_connection_error("redis");
            StorageError::Backend(e.to_string())
        })?;

        let keys = KeyScheme::new(namespace);
        info!(pattern = %keys.pattern(), endpoints = endpoints.len(), "Redis store connected");

        Ok(Self {
            connection,
            endpoints,
            keys,
        })
    }

    /// Get a clone of the connection manager
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    pub fn keys(&self) -> &KeyScheme {
        &self.keys
    }

    async fn fetch(&self, id: i64) -> Result<Option<String>, StorageError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn
            .get(self.keys.entity_key(id))
            .await
            .map_err(backend)?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    async fn store(&self, entity: &DataEntity) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .set_ex(self.keys.entity_key(entity.id), &entity.value, ENTRY_TTL_SECS)
            .await
            .map_err(backend)?;
        Ok(())
    }

    /// Enumerate up to [`LIST_LIMIT`] entities in this namespace.
    pub async fn scan_entities(&self) -> Result<Vec<DataEntity>, StorageError> {
        let mut conn = self.connection.clone();
        let keys = scan_keys(&mut conn, &self.keys.pattern(), Some(LIST_LIMIT))
            .await
            .map_err(backend)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        let entities = keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| {
                let value = value.filter(|v| !v.is_empty())?;
                match KeyScheme::parse_id(key) {
                    Some(id) => Some(DataEntity::cached(id, value)),
                    None => {
                        debug!(key = %key, "Skipping key with non-numeric id");
                        None
                    }
                }
            })
            .collect();
        Ok(entities)
    }

    /// Delete every key of this namespace on every reachable endpoint.
    ///
    /// Keys found on any endpoint are deleted through the primary, which
    /// assumes the extra endpoints are replicas rather than shards.
    ///
    /// Returns the number of keys deleted. Fails if a command is rejected or
    /// no endpoint could be reached.
    pub async fn flush_namespace(&self) -> Result<usize, StorageError> {
        if self.endpoints.is_empty() {
            return Err(StorageError::Backend("No Redis endpoints configured".into()));
        }

        let pattern = self.keys.pattern();
        let mut reachable = 0usize;
        let mut deleted = 0usize;

        for (index, client) in self.endpoints.iter().enumerate() {
            let mut scan_conn = match client.get_multiplexed_async_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(endpoint = index, error = %e, "Redis endpoint unreachable, skipping");
                    continue;
                }
            };
            reachable += 1;

            deleted += self
                .flush_endpoint(&mut scan_conn, &pattern)
                .await
                .map_err(|e| {
                    if e.kind() == ErrorKind::ResponseError {
                        warn!(endpoint = index, error = %e, "Redis rejected flush command");
                    }
                    backend(e)
                })?;
        }

        if reachable == 0 {
            return Err(StorageError::Backend("No Redis endpoint reachable".into()));
        }

        info!(deleted, pattern = %pattern, "Flushed namespace keys");
        crate::metrics::record_flushed_keys(deleted);
        Ok(deleted)
    }

    /// Scan one endpoint and delete matches on the primary in fixed batches.
    async fn flush_endpoint<C>(&self, scan_conn: &mut C, pattern: &str) -> Result<usize, RedisError>
    where
        C: ConnectionLike + Send,
    {
        let mut del_conn = self.connection.clone();
        let mut pending: Vec<String> = Vec::with_capacity(FLUSH_BATCH_SIZE);
        let mut deleted = 0usize;
        let mut cursor: u64 = 0;

        loop {
            let (next, page) = scan_page(scan_conn, cursor, pattern).await?;
            for key in page {
                pending.push(key);
                if pending.len() >= FLUSH_BATCH_SIZE {
                    deleted += delete_keys(&mut del_conn, &pending).await?;
                    pending.clear();
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        if !pending.is_empty() {
            deleted += delete_keys(&mut del_conn, &pending).await?;
        }
        Ok(deleted)
    }
}

fn backend(e: RedisError) -> StorageError {
    StorageError::Backend(e.to_string())
}

async fn scan_page<C>(conn: &mut C, cursor: u64, pattern: &str) -> Result<(u64, Vec<String>), RedisError>
where
    C: ConnectionLike + Send,
{
    cmd("SCAN")
        .arg(cursor)
        .arg("MATCH")
        .arg(pattern)
        .arg("COUNT")
        .arg(SCAN_COUNT)
        .query_async(conn)
        .await
}

async fn scan_keys<C>(conn: &mut C, pattern: &str, limit: Option<usize>) -> Result<Vec<String>, RedisError>
where
    C: ConnectionLike + Send,
{
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, page) = scan_page(conn, cursor, pattern).await?;
        keys.extend(page);
        if let Some(limit) = limit {
            if keys.len() >= limit {
                keys.truncate(limit);
                break;
            }
        }
        if next == 0 {
            break;
        }
        cursor = next;
    }
    Ok(keys)
}

async fn delete_keys(conn: &mut ConnectionManager, keys: &[String]) -> Result<usize, RedisError> {
    let removed: usize = cmd("DEL").arg(keys).query_async(conn).await?;
    Ok(removed)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, id: i64) -> Option<DataEntity> {
        let _timer = LatencyTimer::new(TIER, "get");
        match self.fetch(id).await {
            Ok(Some(value)) => {
                crate::metrics::record_operation(TIER, "get", "hit");
                Some(DataEntity::cached(id, value))
            }
            Ok(None) => {
                crate::metrics::record_operation(TIER, "get", "miss");
                None
            }
            Err(e) => {
                warn!(id, error = %e, "Redis get failed, treating as miss");
                crate::metrics::record_error(TIER, "get", "backend");
                None
            }
        }
    }

    async fn put(&self, entity: &DataEntity) -> bool {
        let _timer = LatencyTimer::new(TIER, "set");
        match self.store(entity).await {
            Ok(()) => {
                crate::metrics::record_operation(TIER, "set", "success");
                true
            }
            Err(e) => {
                warn!(id = entity.id, error = %e, "Redis set failed");
                crate::metrics::record_error(TIER, "set", "backend");
                false
            }
        }
    }

    async fn list_all(&self) -> Vec<DataEntity> {
        self.scan_entities().await.unwrap_or_else(|e| {
            warn!(error = %e, "Redis key enumeration failed");
            crate::metrics::record_error(TIER, "list", "backend");
            Vec::new()
        })
    }

    async fn flush_all(&self) -> bool {
        match self.flush_namespace().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Redis namespace flush failed");
                crate::metrics::record_error(TIER, "flush", "backend");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_without_namespace() {
        let keys = KeyScheme::new(None);
        assert_eq!(keys.entity_key(42), "DataEntity:42");
        assert_eq!(keys.pattern(), "DataEntity:*");
    }

    #[test]
    fn test_key_with_namespace() {
        let keys = KeyScheme::new(Some("movement"));
        assert_eq!(keys.entity_key(7), "movement:DataEntity:7");
        assert_eq!(keys.pattern(), "movement:DataEntity:*");
    }

    #[test]
    fn test_namespace_trailing_colon_and_empty() {
        assert_eq!(KeyScheme::new(Some("movement:")), KeyScheme::new(Some("movement")));
        assert_eq!(KeyScheme::new(Some("")), KeyScheme::new(None));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(KeyScheme::parse_id("DataEntity:42"), Some(42));
        assert_eq!(KeyScheme::parse_id("ns:DataEntity:-3"), Some(-3));
        assert_eq!(KeyScheme::parse_id("ns:DataEntity:abc"), None);
        assert_eq!(KeyScheme::parse_id("ns:DataEntity:"), None);
    }

    #[test]
    fn test_parse_id_roundtrips_entity_key() {
        let keys = KeyScheme::new(Some("a:b"));
        assert_eq!(KeyScheme::parse_id(&keys.entity_key(123456)), Some(123456));
    }

    #[test]
    fn test_ttl_is_five_minutes() {
        assert_eq!(ENTRY_TTL_SECS, 300);
    }
}
