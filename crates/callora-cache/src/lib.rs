//! Redis layer for Callora
//!
//! Backs the presence heartbeat with TTL-keyed entries: a heartbeat
//! refreshes the account's key, and the key lapsing is how crashed clients
//! eventually read as offline. Implements the `CacheService` trait from
//! callora-core.
//!
//! # Features
//!
//! - Connection pooling via Redis ConnectionManager
//! - Automatic serialization/deserialization using serde_json
//! - TTL support for every entry
//! - Comprehensive error handling with conversion to AppError

pub mod keys;

use callora_core::error::AppError;
use callora_core::traits::CacheService;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};

/// Redis cache implementation with connection pooling
///
/// Wraps a Redis ConnectionManager to provide efficient, multiplexed access
/// to Redis. All operations are async and return Results with AppError.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Create a new Redis cache instance
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the connection fails
    pub async fn new(url: &str) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self { manager })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis ping failed: {}", e);
                AppError::Cache(format!("Ping failed: {}", e))
            })?;
        Ok(())
    }

    /// Flush all keys from the current database
    ///
    /// Destructive; test environments only.
    #[cfg(test)]
    pub async fn flush_db(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Failed to flush database: {}", e);
                AppError::Cache(format!("Flush failed: {}", e))
            })?;
        Ok(())
    }

    /// Convert RedisError to AppError
    fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::CacheConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::Cache(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::Cache(err.to_string())
            }
        }
    }
}

#[async_trait]
impl CacheService for RedisCache {
    /// Get a value from cache and deserialize it
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        debug!("GET {}", key);
        let mut conn = self.manager.clone();

        let result: Option<String> = conn.get(key).await.map_err(Self::map_redis_error)?;

        match result {
            Some(json) => {
                let value = serde_json::from_str::<T>(&json).map_err(|e| {
                    error!("Failed to deserialize value for key {}: {}", key, e);
                    AppError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                debug!("Cache HIT: {}", key);
                Ok(Some(value))
            }
            None => {
                debug!("Cache MISS: {}", key);
                Ok(None)
            }
        }
    }

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError> {
        debug!("SET {} (TTL: {}s)", key, ttl_secs);
        let mut conn = self.manager.clone();

        let json = serde_json::to_string(value).map_err(|e| {
            error!("Failed to serialize value for key {}: {}", key, e);
            AppError::Serialization(format!("Serialization failed: {}", e))
        })?;

        let _: () = conn
            .set_ex(key, json, ttl_secs)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(())
    }

    /// Delete a key from cache
    ///
    /// Returns `Ok(true)` if the key was deleted, `Ok(false)` if it didn't
    /// exist.
    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        debug!("DEL {}", key);
        let mut conn = self.manager.clone();

        let deleted: i32 = conn.del(key).await.map_err(Self::map_redis_error)?;

        Ok(deleted > 0)
    }

    /// Check if a key exists in cache
    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        debug!("EXISTS {}", key);
        let mut conn = self.manager.clone();

        let exists: bool = conn.exists(key).await.map_err(Self::map_redis_error)?;

        Ok(exists)
    }
}
