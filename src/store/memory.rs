use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{AppError, Result};
use crate::fingerprint::PayloadFingerprint;
use crate::store::{CachedOutcome, LockAcquisition, LockStore, ResponseStore};

/// In-process response store backed by a synchronized map.
///
/// Expiration is enforced lazily: an expired entry is dropped the next time
/// it is read.
#[derive(Debug, Default)]
pub struct InMemoryResponseStore {
    entries: Mutex<HashMap<String, CachedOutcome>>,
}

impl InMemoryResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CachedOutcome>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Infrastructure("response store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl ResponseStore for InMemoryResponseStore {
    async fn get(&self, key: &str) -> Result<Option<CachedOutcome>> {
        let mut entries = self.lock_entries()?;
        match entries.get(key) {
            Some(outcome) if outcome.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(outcome) => Ok(Some(outcome.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, outcome: CachedOutcome, _ttl_seconds: i64) -> Result<()> {
        // The outcome carries its own expires_at; the TTL parameter exists
        // for backends that manage expiration externally.
        let mut entries = self.lock_entries()?;
        entries.insert(key.to_string(), outcome);
        Ok(())
    }
}

/// An in-flight execution marker. Remembers the holder's payload fingerprint
/// so a contending request can be classified as duplicate or divergent.
#[derive(Debug, Clone)]
struct LockEntry {
    fingerprint: PayloadFingerprint,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl LockEntry {
    fn new(fingerprint: PayloadFingerprint, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            fingerprint,
            acquired_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// In-process lock store. Acquisition is atomic: the check and the insert
/// happen under a single mutex guard.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    locks: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, LockEntry>>> {
        self.locks
            .lock()
            .map_err(|_| AppError::Infrastructure("lock store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(
        &self,
        key: &str,
        fingerprint: &PayloadFingerprint,
        ttl_seconds: i64,
    ) -> Result<LockAcquisition> {
        let mut locks = self.lock_map()?;
        if let Some(existing) = locks.get(key) {
            if !existing.is_expired() {
                return Ok(LockAcquisition::Held {
                    fingerprint: Some(existing.fingerprint.clone()),
                });
            }
            tracing::warn!(
                acquired_at = %existing.acquired_at,
                "replacing expired execution lock"
            );
        }
        locks.insert(
            key.to_string(),
            LockEntry::new(fingerprint.clone(), ttl_seconds),
        );
        Ok(LockAcquisition::Acquired)
    }

    async fn release(&self, key: &str) -> Result<()> {
        let mut locks = self.lock_map()?;
        locks.remove(key);
        Ok(())
    }
}
