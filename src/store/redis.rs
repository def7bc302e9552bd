use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::{AppError, Result};
use crate::fingerprint::PayloadFingerprint;
use crate::observability::get_metrics;
use crate::store::{CachedOutcome, LockAcquisition, LockStore, ResponseStore};

/// Redis-backed response store. Expiration is delegated to Redis via `EX`.
pub struct RedisResponseStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisResponseStore {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:response:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl ResponseStore for RedisResponseStore {
    async fn get(&self, key: &str) -> Result<Option<CachedOutcome>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        let raw: Result<Option<String>> = conn
            .get(self.make_key(key))
            .await
            .map_err(AppError::Redis);
        get_metrics().record_store_operation("redis", "get", raw.is_ok());

        match raw? {
            Some(json) => {
                let outcome: CachedOutcome = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("failed to deserialize cached outcome: {}", e))
                })?;
                Ok(Some(outcome))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, outcome: CachedOutcome, ttl_seconds: i64) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        let json = serde_json::to_string(&outcome).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("failed to serialize cached outcome: {}", e))
        })?;

        let result: Result<()> = conn
            .set_ex(self.make_key(key), json, ttl_seconds.max(1) as u64)
            .await
            .map_err(AppError::Redis);
        get_metrics().record_store_operation("redis", "set", result.is_ok());

        result
    }
}

/// Redis-backed lock store. Acquisition relies on `SET NX GET EX`, a single
/// atomic check-and-set on the server that reports the holder's value when
/// the key already exists. The stored value is the holder's payload
/// fingerprint.
pub struct RedisLockStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisLockStore {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:lock:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn try_acquire(
        &self,
        key: &str,
        fingerprint: &PayloadFingerprint,
        ttl_seconds: i64,
    ) -> Result<LockAcquisition> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        // With GET set, the reply is the previous value: nil when the write
        // happened, the holder's fingerprint when the key already exists.
        let result: Result<Option<String>> = conn
            .set_options(
                self.make_key(key),
                fingerprint.as_str(),
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .get(true)
                    .with_expiration(redis::SetExpiry::EX(ttl_seconds.max(1) as usize)),
            )
            .await
            .map_err(AppError::Redis);
        get_metrics().record_store_operation("redis", "try_acquire", result.is_ok());

        Ok(match result? {
            None => LockAcquisition::Acquired,
            Some(holder) => LockAcquisition::Held {
                fingerprint: Some(PayloadFingerprint::from(holder)),
            },
        })
    }

    async fn release(&self, key: &str) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        // DEL on an absent key is a no-op, which matches the contract.
        let result: Result<i64> = conn.del(self.make_key(key)).await.map_err(AppError::Redis);
        get_metrics().record_store_operation("redis", "release", result.is_ok());

        result.map(|_| ())
    }
}
