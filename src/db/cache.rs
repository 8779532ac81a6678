use redis::{AsyncCommands, Client};
use std::fmt::Display;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::models::{MediaType, PoolSnapshot};

/// Snapshots older than this are refetched by the scheduled refresh job
const SNAPSHOT_TTL_SECS: u64 = 60 * 60 * 24;

/// Creates a Redis client for the shared pool cache
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolCacheKey {
    GlobalPool(MediaType),
}

impl Display for PoolCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolCacheKey::GlobalPool(media_type) => write!(f, "pool:{}", media_type),
        }
    }
}

/// Redis-backed store for the shared GLOBAL candidate pool
///
/// The scheduled refresh writer upserts one snapshot per media type with a
/// single `SET`, which is atomic per key; per-user readers therefore see
/// either the previous or the new snapshot, never a partial one. A missing
/// or stale snapshot is reported as `None` and the caller degrades to an
/// empty pool.
#[derive(Clone)]
pub struct PoolCache {
    redis_client: Client,
}

impl PoolCache {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }

    /// Reads the current snapshot for a media type
    pub async fn get_snapshot(
        &self,
        media_type: MediaType,
    ) -> DiscoveryResult<Option<PoolSnapshot>> {
        let key = PoolCacheKey::GlobalPool(media_type);
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let snapshot: PoolSnapshot = serde_json::from_str(&json).map_err(|e| {
                    DiscoveryError::Internal(format!("Pool snapshot deserialization error: {}", e))
                })?;
                tracing::debug!(
                    media_type = %media_type,
                    candidates = snapshot.candidates.len(),
                    fetched_at = %snapshot.fetched_at,
                    "Pool snapshot hit"
                );
                Ok(Some(snapshot))
            }
            None => {
                tracing::debug!(media_type = %media_type, "Pool snapshot miss");
                Ok(None)
            }
        }
    }

    /// Upserts the snapshot for its media type
    pub async fn store_snapshot(&self, snapshot: &PoolSnapshot) -> DiscoveryResult<()> {
        let key = PoolCacheKey::GlobalPool(snapshot.media_type);
        let json = serde_json::to_string(snapshot).map_err(|e| {
            DiscoveryError::Internal(format!("Pool snapshot serialization error: {}", e))
        })?;

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key.to_string(), json, SNAPSHOT_TTL_SECS).await?;

        tracing::info!(
            media_type = %snapshot.media_type,
            candidates = snapshot.candidates.len(),
            "Stored pool snapshot"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_cache_key_display_movie() {
        let key = PoolCacheKey::GlobalPool(MediaType::Movie);
        assert_eq!(key.to_string(), "pool:movie");
    }

    #[test]
    fn test_pool_cache_key_display_series() {
        let key = PoolCacheKey::GlobalPool(MediaType::Series);
        assert_eq!(key.to_string(), "pool:series");
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_through_redis() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let Ok(client) = create_redis_client(&redis_url) else {
            return;
        };
        let cache = PoolCache::new(client.clone());

        // Skip when no Redis is reachable (CI without services)
        if client.get_multiplexed_async_connection().await.is_err() {
            return;
        }

        let snapshot = PoolSnapshot::empty(MediaType::Movie);
        cache.store_snapshot(&snapshot).await.unwrap();

        let restored = cache.get_snapshot(MediaType::Movie).await.unwrap().unwrap();
        assert_eq!(restored.media_type, MediaType::Movie);
        assert!(restored.candidates.is_empty());

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = redis::AsyncCommands::del(&mut conn, "pool:movie").await.unwrap();
    }
}
