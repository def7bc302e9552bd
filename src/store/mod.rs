pub mod memory;
pub mod redis;

pub use memory::{InMemoryLockStore, InMemoryResponseStore};
pub use redis::{RedisLockStore, RedisResponseStore};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fingerprint::PayloadFingerprint;

/// Outcome captured from the first successful execution for a key.
///
/// Written at most once per idempotency key under normal operation (the
/// coordinator only writes while holding the execution lock after a cache
/// miss) and replayed verbatim until expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedOutcome {
    pub status_code: u16,
    pub body: serde_json::Value,
    pub fingerprint: PayloadFingerprint,
    pub expires_at: DateTime<Utc>,
}

impl CachedOutcome {
    pub fn new(
        status_code: u16,
        body: serde_json::Value,
        fingerprint: PayloadFingerprint,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            status_code,
            body,
            fingerprint,
            expires_at: Utc::now() + Duration::seconds(ttl_seconds),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Key/value store of cached outcomes with store-enforced expiration.
///
/// Expired entries behave as absent on `get`. `set` overwrites any prior
/// entry for the key; at-most-one-write-per-key is the coordinator's
/// responsibility, not the store's.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedOutcome>>;

    async fn set(&self, key: &str, outcome: CachedOutcome, ttl_seconds: i64) -> Result<()>;
}

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LockAcquisition {
    /// The caller now holds the lock.
    Acquired,
    /// Another execution holds the lock. Carries the holder's payload
    /// fingerprint when the backend can report it, so the caller can tell
    /// a duplicate submission apart from a divergent one.
    Held {
        fingerprint: Option<PayloadFingerprint>,
    },
}

/// Key/value store used as a mutual-exclusion primitive with a failsafe TTL.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically inserts a lock entry if none exists (or the existing one
    /// has expired), recording the requester's payload fingerprint. This is
    /// a single check-and-set, never a separate check followed by a set;
    /// two concurrent callers for the same key cannot both observe "no lock".
    async fn try_acquire(
        &self,
        key: &str,
        fingerprint: &PayloadFingerprint,
        ttl_seconds: i64,
    ) -> Result<LockAcquisition>;

    /// Removes the lock entry unconditionally. Releasing an absent lock
    /// (already released or expired) is a no-op.
    async fn release(&self, key: &str) -> Result<()>;
}
